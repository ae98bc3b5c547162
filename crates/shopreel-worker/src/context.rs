//! Shared processing context.

use std::sync::Arc;

use async_trait::async_trait;

use shopreel_providers::ProviderRouter;
use shopreel_queue::{ProgressChannel, QueueJob, QueueRegistry};
use shopreel_storage::R2Client;
use shopreel_store::{BatchStore, RedisStore, VideoStore};

use crate::clock::{Clock, TokioClock};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Where newly created jobs go.
///
/// The production sink is the queue registry; tests substitute an in-memory
/// recorder so fan-out can be exercised without Redis.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn submit(&self, job: &QueueJob) -> WorkerResult<String>;
}

#[async_trait]
impl JobSink for QueueRegistry {
    async fn submit(&self, job: &QueueJob) -> WorkerResult<String> {
        Ok(self.enqueue(job).await?)
    }
}

/// Everything a job handler needs, built once at startup and shared.
#[derive(Clone)]
pub struct ProcessingContext {
    /// Worker configuration
    pub config: WorkerConfig,
    /// Video record store
    pub videos: Arc<dyn VideoStore>,
    /// Batch record store
    pub batches: Arc<dyn BatchStore>,
    /// Provider adapters
    pub providers: ProviderRouter,
    /// Sink for jobs created during processing (fan-out children)
    pub jobs: Arc<dyn JobSink>,
    /// Live progress event channel, when configured
    pub events: Option<Arc<ProgressChannel>>,
    /// Artifact storage, when configured
    pub storage: Option<Arc<R2Client>>,
    /// Poll-loop clock
    pub clock: Arc<dyn Clock>,
}

impl ProcessingContext {
    /// Assemble a context from explicit parts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: WorkerConfig,
        videos: Arc<dyn VideoStore>,
        batches: Arc<dyn BatchStore>,
        providers: ProviderRouter,
        jobs: Arc<dyn JobSink>,
        events: Option<Arc<ProgressChannel>>,
        storage: Option<Arc<R2Client>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            videos,
            batches,
            providers,
            jobs,
            events,
            storage,
            clock,
        }
    }

    /// Build the production context from environment variables.
    pub async fn from_env(config: WorkerConfig, registry: QueueRegistry) -> WorkerResult<Self> {
        let store = Arc::new(RedisStore::from_env()?);
        let providers = ProviderRouter::from_env()?;

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let events = Some(Arc::new(ProgressChannel::new(&redis_url)?));

        // Artifact storage is optional in local development
        let storage = match R2Client::from_env().await {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!("Artifact storage not configured: {}", e);
                None
            }
        };

        Ok(Self {
            config,
            videos: store.clone(),
            batches: store,
            providers,
            jobs: Arc::new(registry),
            events,
            storage,
            clock: Arc::new(TokioClock),
        })
    }

    /// The configured artifact storage, or a config error.
    pub fn require_storage(&self) -> WorkerResult<Arc<R2Client>> {
        self.storage
            .clone()
            .ok_or_else(|| WorkerError::job_failed("artifact storage is not configured"))
    }
}
