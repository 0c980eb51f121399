//! Error types for annotation documents

use thiserror::Error;

/// Errors raised while loading an annotation document
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnnotationError {
    #[error("invalid annotation JSON: {0}")]
    Json(String),

    #[error("block {index}: missing role")]
    MissingRole { index: usize },

    #[error("block {index}: unknown role '{role}' (expected one of dependentVar, mainSubject, qualifier, property, unit, metadata)")]
    InvalidRole { index: usize, role: String },

    #[error("block {index}: role '{role}' requires a type")]
    MissingType { index: usize, role: String },

    #[error("block {index}: {reason}")]
    InvalidType { index: usize, reason: String },

    #[error("block {index}: no selection")]
    MissingSelection { index: usize },

    #[error("block {index}: invalid selection: {reason}")]
    InvalidSelection { index: usize, reason: String },

    /// Two blocks cover a common cell
    #[error("blocks '{first}' ({first_range}) and '{second}' ({second_range}) overlap")]
    Overlap {
        first: String,
        first_range: String,
        second: String,
        second_range: String,
    },
}

impl AnnotationError {
    /// Constraint violations, as opposed to malformed documents
    pub fn is_overlap(&self) -> bool {
        matches!(self, Self::Overlap { .. })
    }
}
