//! Ethiopian calendar normalization
//!
//! Time values declared with the Ethiopian calendar are converted through the
//! Julian Day Number. The Ethiopian year has twelve 30-day months followed by
//! a five- or six-day thirteenth month, so month 13 is valid input.

use std::str::FromStr;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Calendar item for the Ethiopian calendar
pub const ETHIOPIAN_CALENDAR: &str = "Q215271";
/// Calendar item for the proleptic Gregorian calendar
pub const GREGORIAN_CALENDAR: &str = "Q1985727";

/// Julian Day Number of 0001-01-01 in the Ethiopian calendar
const ETHIOPIAN_EPOCH: i64 = 1_724_221;
/// Offset between a Julian Day Number and chrono's days-from-CE count
const JDN_CE_OFFSET: i64 = 1_721_425;

/// How Ethiopian-calendar time values are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CalendarPolicy {
    /// Keep the value as written
    #[default]
    Leave,
    /// Convert the value to Gregorian in place
    Replace,
    /// Keep the value and add a Gregorian qualifier beside it
    Add,
}

impl FromStr for CalendarPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leave" => Ok(Self::Leave),
            "replace" => Ok(Self::Replace),
            "add" => Ok(Self::Add),
            other => Err(format!(
                "unknown calendar policy '{}' (expected leave, replace or add)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("'{0}' is not an ISO date")]
    NotIso(String),
    #[error("{year}-{month:02}-{day:02} is not a valid Ethiopian date")]
    InvalidDate { year: i64, month: u32, day: u32 },
}

static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-?\d{1,6})-(\d{1,2})-(\d{1,2})(T.*)?$").expect("Invalid ISO date regex")
});

fn is_ethiopian_leap_year(year: i64) -> bool {
    year.rem_euclid(4) == 3
}

/// Julian Day Number of an Ethiopian date
pub fn ethiopian_to_jdn(year: i64, month: u32, day: u32) -> Result<i64, CalendarError> {
    let month_len = if month == 13 {
        if is_ethiopian_leap_year(year) {
            6
        } else {
            5
        }
    } else {
        30
    };
    if !(1..=13).contains(&month) || day < 1 || day > month_len {
        return Err(CalendarError::InvalidDate { year, month, day });
    }
    Ok(ETHIOPIAN_EPOCH + 365 * (year - 1) + year.div_euclid(4) + 30 * (month as i64 - 1) + day as i64 - 1)
}

/// Gregorian date for a Julian Day Number
pub fn jdn_to_gregorian(jdn: i64) -> Option<NaiveDate> {
    i32::try_from(jdn - JDN_CE_OFFSET)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
}

/// Convert an ISO-shaped Ethiopian timestamp to a Gregorian one
///
/// Any time-of-day suffix is carried over unchanged.
pub fn ethiopian_to_gregorian(iso: &str) -> Result<String, CalendarError> {
    let caps = ISO_DATE
        .captures(iso.trim())
        .ok_or_else(|| CalendarError::NotIso(iso.to_string()))?;
    let not_iso = || CalendarError::NotIso(iso.to_string());
    let year: i64 = caps[1].parse().map_err(|_| not_iso())?;
    let month: u32 = caps[2].parse().map_err(|_| not_iso())?;
    let day: u32 = caps[3].parse().map_err(|_| not_iso())?;
    let time = caps.get(4).map(|m| m.as_str()).unwrap_or("");

    let jdn = ethiopian_to_jdn(year, month, day)?;
    let date = jdn_to_gregorian(jdn).ok_or(CalendarError::InvalidDate { year, month, day })?;
    Ok(format!("{}{}", date.format("%Y-%m-%d"), time))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_year_2011() {
        assert_eq!(
            ethiopian_to_gregorian("2011-01-01T00:00:00").unwrap(),
            "2018-09-11T00:00:00"
        );
    }

    #[test]
    fn test_thirteenth_month() {
        // Pagume 5, 2010 is the day before Meskerem 1, 2011
        assert_eq!(ethiopian_to_gregorian("2010-13-05").unwrap(), "2018-09-10");
        assert!(ethiopian_to_gregorian("2010-13-06").is_err());
        // 2011 is a leap year in the Ethiopian calendar
        assert!(ethiopian_to_gregorian("2011-13-06").is_ok());
    }

    #[test]
    fn test_rejects_non_iso() {
        assert!(matches!(
            ethiopian_to_gregorian("Meskerem 1"),
            Err(CalendarError::NotIso(_))
        ));
        assert!(ethiopian_to_gregorian("2011-14-01").is_err());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("Replace".parse::<CalendarPolicy>().unwrap(), CalendarPolicy::Replace);
        assert!("drop".parse::<CalendarPolicy>().is_err());
    }
}
