//! Runtime values produced by expression evaluation

use std::borrow::Cow;
use std::fmt;

use crate::expr::ast::Accessor;
use crate::sheet::Coordinate;

/// A value read from one cell, remembering where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct CellValue {
    pub col: usize,
    pub row: usize,
    pub value: String,
    pub accessor: Accessor,
}

impl CellValue {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.col, self.row)
    }

    /// Same origin, different content
    pub fn with_value(&self, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..self.clone()
        }
    }
}

/// Multi-cell result of a spanned reference, in row-major order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellRange {
    pub cells: Vec<CellValue>,
}

impl CellRange {
    pub fn iter(&self) -> impl Iterator<Item = &CellValue> {
        self.cells.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
    Cell(CellValue),
    Range(CellRange),
}

impl Value {
    /// Truthiness used by `->`, `and`/`or` and the `$n` search
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Cell(c) => !c.value.is_empty(),
            Value::Range(r) => r.iter().any(|c| !c.value.is_empty()),
        }
    }

    /// Scalar text form; ranges have none
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Empty => Some(Cow::Borrowed("")),
            Value::Bool(b) => Some(Cow::Borrowed(if *b { "True" } else { "False" })),
            Value::Number(n) => Some(Cow::Owned(format_number(*n))),
            Value::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Cell(c) => Some(Cow::Borrowed(c.value.as_str())),
            Value::Range(_) => None,
        }
    }

    /// Numeric form, if the scalar parses as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => parse_finite(s),
            Value::Cell(c) => parse_finite(&c.value),
            Value::Empty | Value::Range(_) => None,
        }
    }

    /// Originating cell of a single-cell result
    pub fn origin(&self) -> Option<Coordinate> {
        match self {
            Value::Cell(c) => Some(c.coordinate()),
            _ => None,
        }
    }

    /// Scalar elements: the cells of a range, or the value itself
    pub fn elements(&self) -> Vec<Value> {
        match self {
            Value::Range(r) => r.iter().cloned().map(Value::Cell).collect(),
            other => vec![other.clone()],
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::Cell(_) => "cell",
            Value::Range(_) => "range",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Range(r) => {
                let parts: Vec<&str> = r.iter().map(|c| c.value.as_str()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            other => write!(f, "{}", other.as_text().unwrap_or_default()),
        }
    }
}

/// Parse a finite number; `NaN` and `inf` spellings are text
pub fn parse_finite(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Render a number without a trailing `.0` when it is integral
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
