//! Statement templates: loading, inference and per-cell evaluation
//!
//! A template maps every cell of a region to a statement. It is either
//! written by hand or inferred from an annotation with [`generate_yaml`].
//!
//! # Example
//!
//! ```text
//! statementMapping:
//!   region:
//!     range: B2:B4
//!   template:
//!     subject: =item[A, $row]
//!     property: P1082
//!     value: =make_numeric(value[$col, $row])
//! ```

pub mod calendar;
pub mod mapping;
pub mod statement;
pub mod yaml;

pub use calendar::{CalendarPolicy, ETHIOPIAN_CALENDAR, GREGORIAN_CALENDAR};
pub use mapping::{NodeTemplate, StatementMapping};
pub use statement::{get_cell_statement, CellErrors, Node, Statement, TemplateDidNotApply};
pub use yaml::generate_yaml;

use thiserror::Error;

use crate::error::DeclarationError;

/// Errors that can occur while loading or inferring a template
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Error reading a mapping file
    #[error("failed to read mapping file: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed mapping document
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    /// The annotation has no dependentVar block to build a region from
    #[error("annotation has no dependentVar block")]
    NoDataBlock,
}
