use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Everything that can reject a projection. Raised before any path is
/// simulated, except `NonFiniteResult`, which discards a finished run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("horizonYears must be between 1 and {max}, got {value}")]
    InvalidHorizon { value: u32, max: u32 },

    #[error("{field} is invalid: {reason}")]
    InvalidRate { field: &'static str, reason: String },

    #[error("{field} must be a finite amount >= 0, got {value}")]
    InvalidAmount { field: &'static str, value: f64 },

    #[error("targetDate '{value}' is not a valid date (expected YYYY-MM-DD)")]
    InvalidTargetDate { value: String },

    #[error("pathCount must be between 1 and {max}, got {value}")]
    InvalidPathCount { value: usize, max: usize },

    #[error("invalid solver configuration: {0}")]
    InvalidSolveConfig(String),

    #[error("projection overflowed while computing {0}")]
    NonFiniteResult(&'static str),
}

impl ProjectionError {
    pub fn invalid_rate(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidRate {
            field,
            reason: reason.into(),
        }
    }
}
