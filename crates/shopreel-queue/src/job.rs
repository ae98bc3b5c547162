//! Job payload types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use shopreel_models::{BatchId, BatchKind, GenerationMode, JobId, VideoId};

/// Which worker pool consumes a job. One Redis stream per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Generation,
    Pipeline,
    Batch,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Generation => "generation",
            JobKind::Pipeline => "pipeline",
            JobKind::Batch => "batch",
        }
    }

    /// All kinds, in executor start order.
    pub fn all() -> [JobKind; 3] {
        [JobKind::Generation, JobKind::Pipeline, JobKind::Batch]
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Link from a fan-out child back to its parent batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRef {
    pub batch_id: BatchId,
    pub item_index: u32,
}

/// Job to generate one video through an external provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateVideoJob {
    /// Unique job ID
    pub job_id: JobId,
    /// User ID
    pub user_id: String,
    /// Video record this job owns
    pub video_id: VideoId,
    /// Catalog product the video is generated for
    pub product_id: String,
    /// Validated generation mode
    pub mode: GenerationMode,
    /// Opaque vendor parameters forwarded verbatim
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub provider_params: Value,
    /// Parent batch link, when this job is a fan-out child
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_ref: Option<BatchRef>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl GenerateVideoJob {
    /// Create a new generation job.
    pub fn new(
        user_id: impl Into<String>,
        video_id: VideoId,
        product_id: impl Into<String>,
        mode: GenerationMode,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            user_id: user_id.into(),
            video_id,
            product_id: product_id.into(),
            mode,
            provider_params: Value::Null,
            batch_ref: None,
            created_at: Utc::now(),
        }
    }

    /// Set vendor parameters.
    pub fn with_provider_params(mut self, params: Value) -> Self {
        self.provider_params = params;
        self
    }

    /// Link this job to a parent batch item.
    pub fn with_batch_ref(mut self, batch_id: BatchId, item_index: u32) -> Self {
        self.batch_ref = Some(BatchRef {
            batch_id,
            item_index,
        });
        self
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("generate:{}:{}", self.user_id, self.video_id)
    }
}

/// Job to run a post-processing pipeline over a source artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPipelineJob {
    /// Unique job ID
    pub job_id: JobId,
    /// User ID
    pub user_id: String,
    /// Video record this job owns
    pub video_id: VideoId,
    /// Source media artifact URL
    pub source_url: String,
    /// Named stage preset
    pub preset_id: String,
    /// Explicit stage list overriding the preset, when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_overrides: Option<Vec<String>>,
    /// Prepared captions file for the subtitle burn-in stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_url: Option<String>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl RunPipelineJob {
    /// Create a new pipeline job.
    pub fn new(
        user_id: impl Into<String>,
        video_id: VideoId,
        source_url: impl Into<String>,
        preset_id: impl Into<String>,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            user_id: user_id.into(),
            video_id,
            source_url: source_url.into(),
            preset_id: preset_id.into(),
            stage_overrides: None,
            subtitle_url: None,
            created_at: Utc::now(),
        }
    }

    /// Override the preset's stage list.
    pub fn with_stage_overrides(mut self, stages: Vec<String>) -> Self {
        self.stage_overrides = Some(stages);
        self
    }

    /// Attach a prepared captions file.
    pub fn with_subtitles(mut self, url: impl Into<String>) -> Self {
        self.subtitle_url = Some(url.into());
        self
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!(
            "pipeline:{}:{}:{}",
            self.user_id, self.video_id, self.preset_id
        )
    }
}

/// Job to expand a validated fan-out request into child generation jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandBatchJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Parent batch ID
    pub batch_id: BatchId,
    /// User ID
    pub user_id: String,
    /// Catalog product the videos are generated for
    pub product_id: String,
    /// Batch or variant fan-out
    pub kind: BatchKind,
    /// One validated mode per child, in item order
    pub items: Vec<GenerationMode>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl ExpandBatchJob {
    /// Create a new batch expansion job.
    pub fn new(
        batch_id: BatchId,
        user_id: impl Into<String>,
        product_id: impl Into<String>,
        kind: BatchKind,
        items: Vec<GenerationMode>,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            batch_id,
            user_id: user_id.into(),
            product_id: product_id.into(),
            kind,
            items,
            created_at: Utc::now(),
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("expand:{}:{}", self.user_id, self.batch_id)
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Provider-backed generation of one video
    GenerateVideo(GenerateVideoJob),
    /// Local post-processing pipeline over one artifact
    RunPipeline(RunPipelineJob),
    /// Fan-out expansion of a batch/variant request
    ExpandBatch(ExpandBatchJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::GenerateVideo(j) => &j.job_id,
            QueueJob::RunPipeline(j) => &j.job_id,
            QueueJob::ExpandBatch(j) => &j.job_id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            QueueJob::GenerateVideo(j) => &j.user_id,
            QueueJob::RunPipeline(j) => &j.user_id,
            QueueJob::ExpandBatch(j) => &j.user_id,
        }
    }

    /// Returns the video_id if applicable (batch expansion has none).
    pub fn video_id(&self) -> Option<&VideoId> {
        match self {
            QueueJob::GenerateVideo(j) => Some(&j.video_id),
            QueueJob::RunPipeline(j) => Some(&j.video_id),
            QueueJob::ExpandBatch(_) => None,
        }
    }

    /// Which stream this job belongs to.
    pub fn kind(&self) -> JobKind {
        match self {
            QueueJob::GenerateVideo(_) => JobKind::Generation,
            QueueJob::RunPipeline(_) => JobKind::Pipeline,
            QueueJob::ExpandBatch(_) => JobKind::Batch,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::GenerateVideo(j) => j.idempotency_key(),
            QueueJob::RunPipeline(j) => j.idempotency_key(),
            QueueJob::ExpandBatch(j) => j.idempotency_key(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_mode() -> GenerationMode {
        GenerationMode::Standard {
            prompt: Some("sneaker ad".into()),
            negative_prompt: None,
            image_url: None,
            duration_seconds: 5,
        }
    }

    #[test]
    fn queue_job_generate_serde_roundtrip() {
        let job = GenerateVideoJob::new("user_1", VideoId::new(), "prod_1", standard_mode())
            .with_batch_ref(BatchId::new(), 2);

        let wrapper = QueueJob::GenerateVideo(job.clone());
        let json = serde_json::to_string(&wrapper).expect("serialize QueueJob");
        let decoded: QueueJob = serde_json::from_str(&json).expect("deserialize QueueJob");

        match decoded {
            QueueJob::GenerateVideo(j) => {
                assert_eq!(j.job_id, job.job_id);
                assert_eq!(j.video_id, job.video_id);
                assert_eq!(j.batch_ref, job.batch_ref);
                assert_eq!(j.mode, job.mode);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_job_kind_routing() {
        let generate = QueueJob::GenerateVideo(GenerateVideoJob::new(
            "u",
            VideoId::new(),
            "p",
            standard_mode(),
        ));
        assert_eq!(generate.kind(), JobKind::Generation);

        let pipeline = QueueJob::RunPipeline(RunPipelineJob::new(
            "u",
            VideoId::new(),
            "https://cdn/in.mp4",
            "short-form-social",
        ));
        assert_eq!(pipeline.kind(), JobKind::Pipeline);
    }

    #[test]
    fn test_idempotency_keys_are_stable() {
        let video_id = VideoId::from_string("v-1");
        let a = GenerateVideoJob::new("u-1", video_id.clone(), "p", standard_mode());
        let b = GenerateVideoJob::new("u-1", video_id, "p", standard_mode());
        // Distinct job ids, same dedup identity
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(a.idempotency_key(), b.idempotency_key());
    }
}
