//! Validation error types.

use thiserror::Error;

/// Result type for request validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// A malformed generation or fan-out request.
///
/// Raised before any record is created or job enqueued; a validation
/// failure never leaves partial side effects behind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field `{field}` for {mode} generation")]
    MissingField { mode: &'static str, field: &'static str },

    #[error("{mode} generation requires at least one of {options}")]
    MissingAlternative { mode: &'static str, options: &'static str },

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("batch request has no items")]
    EmptyBatch,

    #[error("batch item {index} is invalid: {source}")]
    BatchItem {
        index: u32,
        #[source]
        source: Box<ValidationError>,
    },
}

impl ValidationError {
    pub fn missing_field(mode: &'static str, field: &'static str) -> Self {
        Self::MissingField { mode, field }
    }

    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Wrap an item-level error with its position in the batch.
    pub fn in_batch_item(self, index: u32) -> Self {
        Self::BatchItem {
            index,
            source: Box::new(self),
        }
    }
}
