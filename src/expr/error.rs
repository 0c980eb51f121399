//! Errors raised while evaluating a compiled expression

use thiserror::Error;

use crate::expr::ast::Variable;
use crate::sheet::CellOutOfBounds;

/// Failure evaluating an expression for one cell
///
/// These are scoped to a single field of a single cell; callers record them
/// and move on to sibling cells.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    OutOfBounds(#[from] CellOutOfBounds),

    /// `$qrow`/`$qcol` used outside a qualifier region
    #[error("{variable} is only bound while evaluating a qualifier region")]
    MissingQualifierContext { variable: Variable },

    #[error("{variable} is not bound in this context")]
    UnboundVariable { variable: Variable },

    #[error("no item found for cell {cell} with value '{value}'")]
    ItemNotFound { cell: String, value: String },

    #[error("{function} does not accept a range as its first argument")]
    RangeNotSupported { function: String },

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid coordinate '{value}': coordinates are positive integers")]
    InvalidIndex { value: String },

    #[error("no value of $n up to {bound} satisfied the expression")]
    NoMatch { bound: usize },

    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("could not parse '{value}' as a date")]
    InvalidDate { value: String },

    #[error("instance_of requires an entity relation source")]
    NoRelations,

    #[error("division by zero")]
    DivisionByZero,

    #[error("{function}: {reason}")]
    Function { function: String, reason: String },
}

impl EvaluationError {
    pub fn function(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Function {
            function: function.into(),
            reason: reason.into(),
        }
    }

    pub fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch { expected, found }
    }

    /// Whether this came from reading past the sheet edge
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, Self::OutOfBounds(_))
    }
}
