//! Batch (fan-out) records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::error::{ValidationError, ValidationResult};
use crate::id::{BatchId, VideoId};
use crate::mode::GenerationMode;

/// Kind of fan-out request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    /// Explicit list of independent generation requests
    Batch,
    /// Fixed preset producing a known number of A/B variants
    Variants,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Batch => "batch",
            BatchKind::Variants => "variants",
        }
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate status of a fan-out parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Created, children not yet enqueued
    #[default]
    Pending,
    /// Children enqueued, at least one outstanding
    Processing,
    /// All children terminated; at least one succeeded
    Completed,
    /// All children terminated; every one failed
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BatchStatus::Pending),
            "processing" => Ok(BatchStatus::Processing),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            other => Err(format!("unknown batch status: {other}")),
        }
    }
}

/// Status of one fan-out child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BatchItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchItemStatus::Pending => "pending",
            BatchItemStatus::Processing => "processing",
            BatchItemStatus::Completed => "completed",
            BatchItemStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchItemStatus::Completed | BatchItemStatus::Failed)
    }
}

impl fmt::Display for BatchItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parent record of a fan-out request.
///
/// `status` becomes terminal only once `completed_count + failed_count`
/// reaches `total_count`; the counters only ever increase, and never both
/// for the same child.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchJob {
    /// Unique batch ID
    pub id: BatchId,

    /// User ID (owner)
    pub user_id: String,

    /// Batch or variant fan-out
    pub kind: BatchKind,

    /// Number of children this batch fans out into
    pub total_count: u32,

    /// Children that reached `completed`
    #[serde(default)]
    pub completed_count: u32,

    /// Children that reached `failed`
    #[serde(default)]
    pub failed_count: u32,

    /// Aggregate status
    #[serde(default)]
    pub status: BatchStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl BatchJob {
    /// Create a new pending batch record.
    pub fn new(user_id: impl Into<String>, kind: BatchKind, total_count: u32) -> Self {
        let now = Utc::now();
        Self {
            id: BatchId::new(),
            user_id: user_id.into(),
            kind,
            total_count,
            completed_count: 0,
            failed_count: 0,
            status: BatchStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of children that have reached a terminal status.
    pub fn terminated_count(&self) -> u32 {
        self.completed_count + self.failed_count
    }

    /// Check whether every child has terminated.
    pub fn all_terminated(&self) -> bool {
        self.terminated_count() >= self.total_count
    }

    /// The terminal status this batch resolves to once all children finish.
    ///
    /// Mixed outcomes are a valid completed state; `Failed` is reserved for
    /// batches where every single child failed.
    pub fn resolved_status(&self) -> BatchStatus {
        if self.failed_count >= self.total_count {
            BatchStatus::Failed
        } else {
            BatchStatus::Completed
        }
    }
}

/// One fan-out child.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchJobItem {
    /// Parent batch ID
    pub batch_id: BatchId,

    /// Position within the batch (0-based)
    pub item_index: u32,

    /// Child status
    #[serde(default)]
    pub status: BatchItemStatus,

    /// The generation request this child executes
    pub mode: GenerationMode,

    /// Video record, set once processing starts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<VideoId>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl BatchJobItem {
    /// Create a pending item for a batch.
    pub fn new(batch_id: BatchId, item_index: u32, mode: GenerationMode) -> Self {
        Self {
            batch_id,
            item_index,
            status: BatchItemStatus::Pending,
            mode,
            video_id: None,
            error_message: None,
        }
    }
}

/// Incoming fan-out request, as received from the dashboard layer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct FanoutRequest {
    /// User ID (owner)
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,

    /// Catalog product the videos are generated for
    #[validate(length(min = 1, max = 128))]
    pub product_id: String,

    /// Batch or variant fan-out
    pub kind: BatchKind,

    /// One generation request per child
    pub items: Vec<GenerationMode>,
}

impl FanoutRequest {
    /// Validate the flat fields and every item's mode.
    ///
    /// Called before any record is created or job enqueued; a failure here
    /// aborts the whole request with no partial side effects.
    pub fn validate_all(&self) -> ValidationResult<()> {
        Validate::validate(self).map_err(|e| {
            ValidationError::invalid_value("request", e.to_string())
        })?;
        validate_batch_items(&self.items)
    }
}

/// Validate every item of a fan-out request before any side effect.
///
/// Returns the first offending item's error; an empty request is itself
/// invalid.
pub fn validate_batch_items(modes: &[GenerationMode]) -> ValidationResult<()> {
    if modes.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    for (index, mode) in modes.iter().enumerate() {
        mode.validate().map_err(|e| e.in_batch_item(index as u32))?;
    }
    Ok(())
}
