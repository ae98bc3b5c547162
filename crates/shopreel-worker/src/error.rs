//! Worker error types.

use thiserror::Error;

use shopreel_models::ValidationError;
use shopreel_providers::ProviderError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// The provider explicitly reported the task as failed. Terminal.
    #[error("Provider task failed: {0}")]
    ProviderTaskFailed(String),

    /// The local wait budget was exhausted without a terminal phase. Terminal.
    #[error("Generation timed out after {attempts} polls over {waited_secs}s")]
    GenerationTimedOut { attempts: u32, waited_secs: u64 },

    /// A pipeline stage failed; the remaining stages were aborted. Terminal.
    #[error("Pipeline stage '{stage}' failed: {message}")]
    PipelineStage { stage: &'static str, message: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] shopreel_store::StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] shopreel_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] shopreel_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] shopreel_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn provider_task_failed(msg: impl Into<String>) -> Self {
        Self::ProviderTaskFailed(msg.into())
    }

    pub fn pipeline_stage(stage: &'static str, message: impl Into<String>) -> Self {
        Self::PipelineStage {
            stage,
            message: message.into(),
        }
    }

    /// Check if the error is transient.
    ///
    /// Retryable errors are handed back to the job queue's backoff
    /// mechanism without touching the Video's user-visible status;
    /// everything else flips the record to `failed` immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Provider(e) => e.is_retryable(),
            WorkerError::Store(e) => e.is_retryable(),
            WorkerError::Storage(_) | WorkerError::Queue(_) | WorkerError::Io(_) => true,
            WorkerError::Media(e) => matches!(e, shopreel_media::MediaError::DownloadFailed { .. }),
            WorkerError::JobFailed(_)
            | WorkerError::ProviderTaskFailed(_)
            | WorkerError::GenerationTimedOut { .. }
            | WorkerError::PipelineStage { .. }
            | WorkerError::Validation(_) => false,
        }
    }

    /// The human-readable message persisted onto a failed record.
    pub fn user_message(&self) -> String {
        match self {
            WorkerError::ProviderTaskFailed(msg) => format!("Generation failed: {msg}"),
            WorkerError::GenerationTimedOut { .. } => {
                "Generation timed out. Please try again.".to_string()
            }
            WorkerError::PipelineStage { stage, .. } => {
                format!("Post-processing failed at the {stage} step")
            }
            WorkerError::Validation(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors_are_not_retryable() {
        assert!(!WorkerError::provider_task_failed("bad prompt").is_retryable());
        assert!(!WorkerError::GenerationTimedOut {
            attempts: 60,
            waited_secs: 600
        }
        .is_retryable());
        assert!(!WorkerError::pipeline_stage("optimize", "boom").is_retryable());
    }

    #[test]
    fn test_provider_unavailable_is_retryable() {
        let err = WorkerError::Provider(ProviderError::unavailable("connection reset"));
        assert!(err.is_retryable());

        let err = WorkerError::Provider(ProviderError::Rejected {
            status: 422,
            body: "bad".into(),
        });
        assert!(!err.is_retryable());
    }
}
