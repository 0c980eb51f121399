//! Error types for region resolution

use thiserror::Error;

use crate::error::DeclarationError;
use crate::expr::EvaluationError;

/// Errors that can occur while resolving a region
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionError {
    /// Self-contradictory boundaries or a boundary dependency cycle
    #[error("region constraint violation: {reason}")]
    ConstraintViolation { reason: String },

    /// Resolution produced no cells
    #[error("error in YAML file: the region resolves to no cells")]
    Empty,

    /// A boundary or membership expression failed
    #[error("failed to evaluate region key '{key}': {error}")]
    Evaluation { key: String, error: EvaluationError },

    #[error(transparent)]
    Declaration(#[from] DeclarationError),
}

impl RegionError {
    /// Create a constraint violation
    pub fn violation(reason: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            reason: reason.into(),
        }
    }

    pub fn evaluation(key: impl Into<String>, error: EvaluationError) -> Self {
        Self::Evaluation {
            key: key.into(),
            error,
        }
    }

    /// Whether the region declaration itself is unusable (as opposed to empty)
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}
