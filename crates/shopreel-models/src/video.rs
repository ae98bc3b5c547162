//! Video records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::VideoId;
use crate::mode::{GenerationMode, ProviderKind};
use crate::pipeline::StageRecord;

/// Video lifecycle status.
///
/// `Cancelled` is terminal: once written, the orchestration core performs no
/// further writes to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Created, nothing submitted yet
    #[default]
    Draft,
    /// Provider task submitted or polling
    Generating,
    /// Local post-processing pipeline running
    Processing,
    /// Finished; `remote_url` is set and progress is 100
    Ready,
    /// Published to the social platform
    Posted,
    /// Terminal failure; progress frozen, error message present
    Failed,
    /// Cancelled by the user; terminal
    Cancelled,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Draft => "draft",
            VideoStatus::Generating => "generating",
            VideoStatus::Processing => "processing",
            VideoStatus::Ready => "ready",
            VideoStatus::Posted => "posted",
            VideoStatus::Failed => "failed",
            VideoStatus::Cancelled => "cancelled",
        }
    }

    /// Check if no further orchestration writes are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VideoStatus::Ready | VideoStatus::Posted | VideoStatus::Failed | VideoStatus::Cancelled
        )
    }

    /// Check if a worker currently owns this record.
    pub fn is_active(&self) -> bool {
        matches!(self, VideoStatus::Generating | VideoStatus::Processing)
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VideoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(VideoStatus::Draft),
            "generating" => Ok(VideoStatus::Generating),
            "processing" => Ok(VideoStatus::Processing),
            "ready" => Ok(VideoStatus::Ready),
            "posted" => Ok(VideoStatus::Posted),
            "failed" => Ok(VideoStatus::Failed),
            "cancelled" => Ok(VideoStatus::Cancelled),
            other => Err(format!("unknown video status: {other}")),
        }
    }
}

/// Live handle to work submitted to an external provider.
///
/// Exclusively owned by the Video that created it; never shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderTaskRef {
    /// Opaque task identifier returned by the provider
    pub task_id: String,
    /// When the task was submitted
    pub submitted_at: DateTime<Utc>,
    /// Mode name the task was submitted under
    pub mode: String,
}

/// Per-provider generation parameters attached to a Video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationConfig {
    /// Provider that executes (or executed) this generation
    pub provider: ProviderKind,
    /// Validated generation mode and its fields
    #[serde(flatten)]
    pub mode: GenerationMode,
    /// Opaque extra parameters forwarded to the provider verbatim
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub provider_params: serde_json::Value,
    /// Handle to the provider task, set once submitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<ProviderTaskRef>,
}

impl GenerationConfig {
    /// Build a config for a validated mode.
    pub fn new(mode: GenerationMode) -> Self {
        Self {
            provider: mode.provider(),
            mode,
            provider_params: serde_json::Value::Null,
            task: None,
        }
    }

    /// Attach opaque provider parameters.
    pub fn with_provider_params(mut self, params: serde_json::Value) -> Self {
        self.provider_params = params;
        self
    }

    /// Record the submitted provider task.
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task = Some(ProviderTaskRef {
            task_id: task_id.into(),
            submitted_at: Utc::now(),
            mode: self.mode.as_str().to_string(),
        });
        self
    }
}

/// Technical metadata captured during post-processing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMeta {
    /// Stage history of the most recent pipeline run
    #[serde(default)]
    pub stage_history: Vec<StageRecord>,
    /// Output codec (e.g. "h264")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    /// Output width in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Output height in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Thumbnail URL, if one was generated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// One user-visible generation unit.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Video {
    /// Unique video ID
    pub id: VideoId,

    /// User ID (owner)
    pub user_id: String,

    /// Catalog product this video was generated for
    pub product_id: String,

    /// Lifecycle status
    #[serde(default)]
    pub status: VideoStatus,

    /// Progress percentage (0-100), monotone while generating/processing
    #[serde(default)]
    pub progress: u8,

    /// Human-readable phase label shown next to the progress bar
    #[serde(default)]
    pub progress_message: String,

    /// URL of the finished artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,

    /// Duration of the finished clip in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    /// Provider parameters and task handle
    pub generation_config: GenerationConfig,

    /// Technical metadata from post-processing
    #[serde(default)]
    pub metadata: VideoMeta,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Video {
    /// Create a new draft record for a validated generation config.
    pub fn new(
        user_id: impl Into<String>,
        product_id: impl Into<String>,
        generation_config: GenerationConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: VideoId::new(),
            user_id: user_id.into(),
            product_id: product_id.into(),
            status: VideoStatus::Draft,
            progress: 0,
            progress_message: String::new(),
            remote_url: None,
            duration_seconds: None,
            generation_config,
            metadata: VideoMeta::default(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the video as ready with its finished artifact.
    pub fn complete(mut self, remote_url: impl Into<String>) -> Self {
        self.status = VideoStatus::Ready;
        self.progress = 100;
        self.progress_message = "complete".to_string();
        self.remote_url = Some(remote_url.into());
        self.updated_at = Utc::now();
        self
    }

    /// Mark the video as failed, freezing progress at its last value.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = VideoStatus::Failed;
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GenerationConfig {
        GenerationConfig::new(GenerationMode::Standard {
            prompt: Some("sneaker on a beach".into()),
            negative_prompt: None,
            image_url: None,
            duration_seconds: 5,
        })
    }

    #[test]
    fn test_video_creation() {
        let video = Video::new("user-1", "prod-1", config());
        assert_eq!(video.status, VideoStatus::Draft);
        assert_eq!(video.progress, 0);
        assert!(video.generation_config.task.is_none());
        assert_eq!(video.generation_config.provider, ProviderKind::Vireo);
    }

    #[test]
    fn test_video_completion_invariant() {
        let video = Video::new("user-1", "prod-1", config()).complete("https://cdn/out.mp4");
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(video.progress, 100);
        assert!(video.remote_url.is_some());
    }

    #[test]
    fn test_video_failure_freezes_progress() {
        let mut video = Video::new("user-1", "prod-1", config());
        video.progress = 42;
        let failed = video.fail("provider exploded");
        assert_eq!(failed.status, VideoStatus::Failed);
        assert_eq!(failed.progress, 42);
        assert!(failed.error_message.is_some());
    }

    #[test]
    fn test_status_terminality() {
        assert!(VideoStatus::Cancelled.is_terminal());
        assert!(VideoStatus::Ready.is_terminal());
        assert!(!VideoStatus::Generating.is_terminal());
        assert!(VideoStatus::Processing.is_active());
    }

    #[test]
    fn test_task_ref_records_mode() {
        let config = config().with_task("task-77");
        let task = config.task.unwrap();
        assert_eq!(task.task_id, "task-77");
        assert_eq!(task.mode, "standard");
    }
}
