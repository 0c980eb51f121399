//! Sheet access contract and cell coordinate helpers
//!
//! Two coordinate conventions meet here. The [`Sheet`] trait is addressed with
//! 0-indexed `(row, col)` pairs. Everything user-facing (expressions, regions,
//! annotation selections, A1 labels) is 1-indexed. [`cell_at`] is the only place
//! that converts between the two.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Raised when a sheet is read outside its extent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cell (row {row}, col {col}) is outside the sheet ({row_len} rows x {col_len} columns)")]
pub struct CellOutOfBounds {
    pub row: i64,
    pub col: i64,
    pub row_len: usize,
    pub col_len: usize,
}

/// Errors from loading a sheet into memory
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to read sheet file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Read-only grid of string cells, 0-indexed
pub trait Sheet: Send + Sync {
    /// Cell text at 0-indexed `(row, col)`
    fn cell(&self, row: usize, col: usize) -> Result<&str, CellOutOfBounds>;
    fn row_len(&self) -> usize;
    fn col_len(&self) -> usize;
    fn name(&self) -> &str;
    fn source_file_name(&self) -> &str;
}

/// Read a cell by 1-indexed `(col, row)` coordinates
///
/// Coordinates below 1 are reported as out of bounds rather than wrapping.
pub fn cell_at(sheet: &dyn Sheet, col: i64, row: i64) -> Result<&str, CellOutOfBounds> {
    let oob = || CellOutOfBounds {
        row: row - 1,
        col: col - 1,
        row_len: sheet.row_len(),
        col_len: sheet.col_len(),
    };
    if col < 1 || row < 1 {
        return Err(oob());
    }
    sheet.cell((row - 1) as usize, (col - 1) as usize)
}

/// A sheet held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySheet {
    rows: Vec<Vec<String>>,
    col_len: usize,
    name: String,
    source_file_name: String,
}

impl MemorySheet {
    /// Build a sheet from row-major data; short rows are padded with empty cells
    pub fn from_rows<R, C>(name: impl Into<String>, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let mut rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|r| r.into_iter().map(Into::into).collect())
            .collect();
        let col_len = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(col_len, String::new());
        }
        Self {
            rows,
            col_len,
            name: name.into(),
            source_file_name: String::new(),
        }
    }

    /// Set the file name reported through `$filename`
    pub fn with_source_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.source_file_name = file_name.into();
        self
    }

    /// Parse headerless CSV text
    pub fn from_csv_str(name: impl Into<String>, content: &str) -> Result<Self, SheetError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }
        Ok(Self::from_rows(name, rows))
    }

    /// Load a CSV file; the sheet is named after the file stem
    pub fn from_csv_file(path: &Path) -> Result<Self, SheetError> {
        let content = std::fs::read_to_string(path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::from_csv_str(stem, &content)?.with_source_file_name(file_name))
    }
}

impl Sheet for MemorySheet {
    fn cell(&self, row: usize, col: usize) -> Result<&str, CellOutOfBounds> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .ok_or(CellOutOfBounds {
                row: row as i64,
                col: col as i64,
                row_len: self.rows.len(),
                col_len: self.col_len,
            })
    }

    fn row_len(&self) -> usize {
        self.rows.len()
    }

    fn col_len(&self) -> usize {
        self.col_len
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn source_file_name(&self) -> &str {
        &self.source_file_name
    }
}

/// A 1-indexed `(column, row)` coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    pub col: usize,
    pub row: usize,
}

impl Coordinate {
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }

    /// Parse an A1 label such as `B12`
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        let split = label.find(|c: char| c.is_ascii_digit())?;
        let (letters, digits) = label.split_at(split);
        let col = column_index(letters)?;
        let row = digits.parse::<usize>().ok().filter(|r| *r >= 1)?;
        Some(Self { col, row })
    }

    pub fn label(&self) -> String {
        format!("{}{}", column_letter(self.col), self.row)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letter(self.col), self.row)
    }
}

/// 1-indexed column number for letters like `A` or `AB`
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    letters.chars().try_fold(0usize, |acc, c| {
        if c.is_ascii_uppercase() {
            Some(acc * 26 + (c as usize - 'A' as usize + 1))
        } else {
            None
        }
    })
}

/// Column letters for a 1-indexed column number
pub fn column_letter(mut col: usize) -> String {
    let mut out = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        out.push((b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    out.iter().rev().collect()
}

/// Format an inclusive 1-indexed range as `A1:C9`
pub fn range_label(from: Coordinate, to: Coordinate) -> String {
    format!("{}:{}", from, to)
}

/// Parse `A1:C9` into its two corners; a single cell label is a 1x1 range
pub fn parse_range(range: &str) -> Option<(Coordinate, Coordinate)> {
    match range.split_once(':') {
        Some((from, to)) => Some((Coordinate::parse(from)?, Coordinate::parse(to)?)),
        None => {
            let cell = Coordinate::parse(range)?;
            Some((cell, cell))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemorySheet {
        MemorySheet::from_rows("s", vec![vec!["a", "b"], vec!["c"]])
    }

    #[test]
    fn test_column_letters_round_trip() {
        for col in [1, 2, 26, 27, 52, 702, 703] {
            assert_eq!(column_index(&column_letter(col)), Some(col));
        }
        assert_eq!(column_letter(28), "AB");
    }

    #[test]
    fn test_column_index_rejects_lowercase() {
        assert_eq!(column_index("a"), None);
        assert_eq!(column_index(""), None);
    }

    #[test]
    fn test_coordinate_parse() {
        assert_eq!(Coordinate::parse("B12"), Some(Coordinate::new(2, 12)));
        assert_eq!(Coordinate::parse("B0"), None);
        assert_eq!(Coordinate::parse("12"), None);
        assert_eq!(Coordinate::new(28, 3).label(), "AB3");
    }

    #[test]
    fn test_parse_range() {
        let (a, b) = parse_range("A1:C9").unwrap();
        assert_eq!((a, b), (Coordinate::new(1, 1), Coordinate::new(3, 9)));
        let (a, b) = parse_range("D4").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let sheet = sample();
        assert_eq!(sheet.col_len(), 2);
        assert_eq!(sheet.cell(1, 1).unwrap(), "");
    }

    #[test]
    fn test_cell_at_is_one_indexed() {
        let sheet = sample();
        assert_eq!(cell_at(&sheet, 2, 1).unwrap(), "b");
        assert!(cell_at(&sheet, 0, 1).is_err());
        assert!(cell_at(&sheet, 1, 3).is_err());
    }

    #[test]
    fn test_from_csv_str() {
        let sheet = MemorySheet::from_csv_str("csv", "x,1\ny,2\n").unwrap();
        assert_eq!(sheet.row_len(), 2);
        assert_eq!(sheet.cell(1, 0).unwrap(), "y");
    }
}
