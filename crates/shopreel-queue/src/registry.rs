//! The queue registry.
//!
//! One `JobQueue` per job type, constructed once at process startup and
//! passed by reference to every worker and job-submission call site. There
//! is deliberately no lazily-initialized module-level queue handle anywhere
//! in this codebase.

use std::sync::Arc;

use crate::error::QueueResult;
use crate::job::{JobKind, QueueJob};
use crate::queue::{JobQueue, QueueConfig};

/// All job streams, keyed by kind.
#[derive(Clone)]
pub struct QueueRegistry {
    generation: Arc<JobQueue>,
    pipeline: Arc<JobQueue>,
    batch: Arc<JobQueue>,
}

impl QueueRegistry {
    /// Build every stream from one shared config.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        Ok(Self {
            generation: Arc::new(JobQueue::new(config.clone(), JobKind::Generation)?),
            pipeline: Arc::new(JobQueue::new(config.clone(), JobKind::Pipeline)?),
            batch: Arc::new(JobQueue::new(config, JobKind::Batch)?),
        })
    }

    /// Build from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Create every consumer group.
    pub async fn init(&self) -> QueueResult<()> {
        self.generation.init().await?;
        self.pipeline.init().await?;
        self.batch.init().await?;
        Ok(())
    }

    /// The queue carrying a given job kind.
    pub fn queue(&self, kind: JobKind) -> Arc<JobQueue> {
        match kind {
            JobKind::Generation => Arc::clone(&self.generation),
            JobKind::Pipeline => Arc::clone(&self.pipeline),
            JobKind::Batch => Arc::clone(&self.batch),
        }
    }

    /// Enqueue a job on the stream its kind maps to.
    pub async fn enqueue(&self, job: &QueueJob) -> QueueResult<String> {
        self.queue(job.kind()).enqueue(job).await
    }
}
