//! Provider error types.

use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors crossing the provider adapter boundary.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rejected the request (non-success HTTP status on submit).
    /// Not retried; the status code and body are kept for diagnostics.
    #[error("provider rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Transport-level failure (network error, 5xx). Retryable.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider explicitly reported the task as failed. Terminal.
    #[error("provider task failed: {0}")]
    TaskFailed(String),

    /// The provider answered but the payload made no sense.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Check if the error is transient and worth retrying at the queue level.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Unavailable(_) => true,
            ProviderError::Network(e) => !e.is_builder(),
            _ => false,
        }
    }
}
