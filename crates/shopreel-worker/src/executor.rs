//! Job executor.
//!
//! One executor per job stream, each with its own small worker pool. A
//! poller occupies a slot for its entire wait window, so the pool size
//! bounds simultaneously in-flight generations, not throughput.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shopreel_queue::{JobQueue, QueueJob};

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::handlers::{handle_expand, handle_generate, handle_pipeline};

/// Consumes one job stream with bounded concurrency.
pub struct JobExecutor {
    ctx: ProcessingContext,
    queue: Arc<JobQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new executor for one queue.
    pub fn new(ctx: ProcessingContext, queue: Arc<JobQueue>) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(ctx.config.workers_per_queue));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}-{}", queue.kind(), Uuid::new_v4());

        Self {
            ctx,
            queue,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting executor '{}' with {} worker slots",
            self.consumer_name, self.ctx.config.workers_per_queue
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically claim jobs orphaned by crashed workers
        let queue_clone = Arc::clone(&self.queue);
        let consumer_name = self.consumer_name.clone();
        let ctx_clone = self.ctx.clone();
        let semaphore_clone = Arc::clone(&self.job_semaphore);
        let claim_interval = self.ctx.config.claim_interval;
        let claim_min_idle = self.ctx.config.claim_min_idle;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue_clone
                            .claim_pending(&consumer_name, claim_min_idle.as_millis() as u64, 5)
                            .await
                        {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} pending jobs", jobs.len());
                                for (message_id, job) in jobs {
                                    let ctx = ctx_clone.clone();
                                    let queue = Arc::clone(&queue_clone);
                                    let Ok(permit) =
                                        semaphore_clone.clone().acquire_owned().await
                                    else {
                                        break;
                                    };

                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(ctx, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim pending jobs: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main job consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.ctx.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("Executor '{}' stopped", self.consumer_name);
        Ok(())
    }

    /// Consume and dispatch jobs from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available)
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from {}", jobs.len(), self.queue.kind());

        for (message_id, job) in jobs {
            let ctx = self.ctx.clone();
            let queue = Arc::clone(&self.queue);
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute a single job with retry and DLQ handling.
    ///
    /// Retryable errors leave the message pending so the queue redelivers
    /// it after the visibility timeout; terminal errors (and exhausted
    /// retries) go to the DLQ immediately.
    async fn execute_job(
        ctx: ProcessingContext,
        queue: Arc<JobQueue>,
        message_id: String,
        job: QueueJob,
    ) {
        let job_id = job.job_id().to_string();
        info!("Executing job {}", job_id);
        let started = std::time::Instant::now();

        let result = Self::process_job(&ctx, &job).await;
        metrics::histogram!("job_duration_seconds", "kind" => job.kind().as_str())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                info!("Job {} completed successfully", job_id);
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack job {}: {}", job_id, e);
                }
                // Clear dedup so the same logical job can be submitted again
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!("Failed to clear dedup key for job {}: {}", job_id, e);
                }
            }
            Err(e) if e.is_retryable() => {
                let retry_count = queue.increment_retry(&message_id).await.unwrap_or(u32::MAX);
                let max_retries = queue.max_retries();

                if retry_count >= max_retries {
                    warn!(
                        "Job {} exhausted {} retries, moving to DLQ: {}",
                        job_id, max_retries, e
                    );
                    Self::dead_letter(&ctx, &queue, &message_id, &job, &e).await;
                } else {
                    info!(
                        "Job {} will be retried (attempt {}/{}): {}",
                        job_id, retry_count, max_retries, e
                    );
                    // Left pending; redelivered after the visibility timeout
                }
            }
            Err(e) => {
                // Terminal: the handler already flipped the record; nothing
                // to gain from redelivery
                error!("Job {} failed terminally: {}", job_id, e);
                Self::dead_letter(&ctx, &queue, &message_id, &job, &e).await;
            }
        }
    }

    async fn dead_letter(
        ctx: &ProcessingContext,
        queue: &JobQueue,
        message_id: &str,
        job: &QueueJob,
        error: &WorkerError,
    ) {
        if let Err(dlq_err) = queue.dlq(message_id, job, &error.to_string()).await {
            error!("Failed to move job {} to DLQ: {}", job.job_id(), dlq_err);
        }
        if let Err(e) = queue.clear_dedup(job).await {
            warn!("Failed to clear dedup key for job {}: {}", job.job_id(), e);
        }

        // Exhausted retries surface as a record failure too; terminal errors
        // already did this in the handler, and the guard makes it idempotent
        if let Some(video_id) = job.video_id() {
            if let Err(e) = ctx
                .videos
                .mark_failed(video_id, &error.user_message())
                .await
            {
                warn!(video_id = %video_id, "Failed to mark record failed: {}", e);
            }
        }

        metrics::counter!("jobs_dead_lettered", "kind" => job.kind().as_str()).increment(1);
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.ctx.config.workers_per_queue {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Process a single job.
    async fn process_job(ctx: &ProcessingContext, job: &QueueJob) -> WorkerResult<()> {
        match job {
            QueueJob::GenerateVideo(j) => handle_generate(ctx, j).await,
            QueueJob::RunPipeline(j) => handle_pipeline(ctx, j).await,
            QueueJob::ExpandBatch(j) => handle_expand(ctx, j).await,
        }
    }
}
