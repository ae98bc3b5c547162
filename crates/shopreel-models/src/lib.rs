//! Shared data models for the Shopreel backend.
//!
//! This crate provides Serde-serializable types for:
//! - Video records and their status lifecycle
//! - Batch jobs and per-item fan-out records
//! - Generation modes (one variant per provider capability)
//! - Provider task handles and normalized poll phases
//! - Progress reconciliation (provider progress -> UI progress)

pub mod batch;
pub mod error;
pub mod id;
pub mod mode;
pub mod pipeline;
pub mod progress;
pub mod video;

// Re-export common types
pub use batch::{
    validate_batch_items, BatchItemStatus, BatchJob, BatchJobItem, BatchKind, BatchStatus,
    FanoutRequest,
};
pub use error::{ValidationError, ValidationResult};
pub use id::{BatchId, JobId, VideoId};
pub use mode::{GenerationMode, ProviderKind};
pub use pipeline::{PipelineRun, StageRecord, StageStatus};
pub use progress::{map_progress, ProviderPhase};
pub use video::{GenerationConfig, ProviderTaskRef, Video, VideoMeta, VideoStatus};
