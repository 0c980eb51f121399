//! Date parsing with user formats and ISO fallbacks
//!
//! Formats are chrono strftime patterns. A format that lacks a month or day
//! still parses: the missing parts default to 1 and the precision records
//! what the format actually carried.

use chrono::{NaiveDate, NaiveDateTime};
use dashmap::DashMap;

/// Fallback patterns tried when no user format is given
pub const ISO_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d", "%Y-%m", "%Y"];

/// Wikidata time precision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Year,
    Month,
    Day,
    Second,
}

impl Precision {
    /// Numeric code used in statements (9 year, 10 month, 11 day, 14 second)
    pub fn code(&self) -> u8 {
        match self {
            Precision::Year => 9,
            Precision::Month => 10,
            Precision::Day => 11,
            Precision::Second => 14,
        }
    }
}

/// A successfully parsed date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDate {
    pub datetime: NaiveDateTime,
    pub precision: Precision,
    /// The format that matched
    pub format: String,
}

impl ParsedDate {
    /// `YYYY-MM-DDTHH:MM:SS`
    pub fn iso(&self) -> String {
        self.datetime.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

fn has_any(format: &str, specs: &[&str]) -> bool {
    specs.iter().any(|s| format.contains(s))
}

/// Parse `value` with one strftime pattern
pub fn parse_with_format(value: &str, format: &str) -> Option<ParsedDate> {
    let value = value.trim();
    let has_time = has_any(format, &["%H", "%I", "%M", "%S", "%T", "%R"]);
    let has_day = has_any(format, &["%d", "%e", "%j"]) || has_any(format, &["%F", "%D"]);
    let has_month = has_day || has_any(format, &["%m", "%b", "%B", "%h"]);

    let mut padded_value = value.to_string();
    let mut padded_format = format.to_string();
    if !has_month {
        padded_value.push_str("|01");
        padded_format.push_str("|%m");
    }
    if !has_day && !format.contains("%j") {
        padded_value.push_str("|01");
        padded_format.push_str("|%d");
    }

    let datetime = if has_time {
        NaiveDateTime::parse_from_str(&padded_value, &padded_format).ok()?
    } else {
        NaiveDate::parse_from_str(&padded_value, &padded_format)
            .ok()?
            .and_hms_opt(0, 0, 0)?
    };

    let precision = if has_time {
        Precision::Second
    } else if has_day {
        Precision::Day
    } else if has_month {
        Precision::Month
    } else {
        Precision::Year
    };

    Some(ParsedDate {
        datetime,
        precision,
        format: format.to_string(),
    })
}

/// Try each format in order; with no formats, try the ISO fallbacks
pub fn parse_date(value: &str, formats: &[String]) -> Option<ParsedDate> {
    if formats.is_empty() {
        ISO_FORMATS
            .iter()
            .find_map(|f| parse_with_format(value, f))
    } else {
        formats.iter().find_map(|f| parse_with_format(value, f))
    }
}

/// Memoized date parsing, scoped to one generation session
#[derive(Debug, Default)]
pub struct DateCache {
    entries: DashMap<(String, Vec<String>), Option<ParsedDate>>,
}

impl DateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, value: &str, formats: &[String]) -> Option<ParsedDate> {
        let key = (value.to_string(), formats.to_vec());
        if let Some(hit) = self.entries.get(&key) {
            return hit.clone();
        }
        let parsed = parse_date(value, formats);
        self.entries.insert(key, parsed.clone());
        parsed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
