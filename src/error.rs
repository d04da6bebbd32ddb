use thiserror::Error;

use crate::records::Position;

/// Failures raised by the feature pipeline, the predictor boundary and the
/// lineup selectors. Degraded inputs (missing history, missing fixtures)
/// fall back to defaults instead of landing here.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LineupError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not enough players to fill position {position}")]
    UnderFill { position: Position },

    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("feature columns diverge from the trained manifest (expected {expected} columns, got {actual}): {detail}")]
    FeatureMismatch {
        expected: usize,
        actual: usize,
        detail: String,
    },
}

impl LineupError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::DataUnavailable(msg.into())
    }
}
