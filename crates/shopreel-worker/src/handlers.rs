//! Job handlers, one per job family.

use std::sync::Arc;

use tracing::{info, warn};

use shopreel_media::RunWorkspace;
use shopreel_models::{ProviderTaskRef, VideoStatus};
use shopreel_providers::SubmitRequest;
use shopreel_queue::{ExpandBatchJob, GenerateVideoJob, RunPipelineJob};
use shopreel_store::ItemOutcome;

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::fanout::FanoutController;
use crate::logging::JobLogger;
use crate::pipeline::stages::build_stages;
use crate::pipeline::{resolve_preset, PipelineResult, PipelineRunner, StageContext};
use crate::poller::{PollOutcome, TaskPoller};
use crate::publisher::StatusPublisher;

/// Process one generation job: submit to the provider, poll to a terminal
/// phase, publish the outcome.
///
/// A queue redelivery after a crash resumes polling on the already-submitted
/// task instead of submitting twice.
pub async fn handle_generate(ctx: &ProcessingContext, job: &GenerateVideoJob) -> WorkerResult<()> {
    let logger = JobLogger::new(&job.job_id, "generate_video");
    logger.log_start(&format!(
        "Generating video {} via {}",
        job.video_id,
        job.mode.provider()
    ));

    let video = ctx
        .videos
        .get_video(&job.video_id)
        .await?
        .ok_or_else(|| WorkerError::job_failed(format!("video record {} missing", job.video_id)))?;

    // Cancellation may land before the job is even picked up
    if video.status == VideoStatus::Cancelled {
        logger.log_completion("Cancelled before start");
        report_batch_outcome(ctx, job, ItemOutcome::Failed("cancelled".into())).await;
        return Ok(());
    }

    let adapter = ctx.providers.adapter_for(&job.mode);
    let publisher = StatusPublisher::new(
        Arc::clone(&ctx.videos),
        ctx.events.clone(),
        job.video_id.clone(),
    );

    let result = generate_inner(ctx, job, &publisher).await;

    match result {
        Ok(Some(result_url)) => {
            let duration = job.mode.duration_seconds().map(f64::from);
            ctx.videos
                .mark_ready(&job.video_id, &result_url, duration)
                .await?;
            report_batch_outcome(ctx, job, ItemOutcome::Completed).await;
            metrics::counter!("generation_jobs_completed", "provider" => adapter.name()).increment(1);
            logger.log_completion("Video ready");
            Ok(())
        }
        Ok(None) => {
            // Cancelled mid-poll: the record stays exactly as the
            // cancellation actor left it
            report_batch_outcome(ctx, job, ItemOutcome::Failed("cancelled".into())).await;
            logger.log_completion("Cancelled");
            Ok(())
        }
        Err(e) if e.is_retryable() => {
            // Transparent to the user: the queue's backoff redelivers
            logger.log_warning(&format!("Transient failure, leaving for retry: {e}"));
            Err(e)
        }
        Err(e) => {
            let message = e.user_message();
            ctx.videos.mark_failed(&job.video_id, &message).await?;
            report_batch_outcome(ctx, job, ItemOutcome::Failed(message)).await;
            metrics::counter!("generation_jobs_failed", "provider" => adapter.name()).increment(1);
            logger.log_error(&format!("Terminal failure: {e}"));
            Err(e)
        }
    }
}

/// Submit (or resume) and poll. Returns the result URL, or `None` on
/// cancellation.
async fn generate_inner(
    ctx: &ProcessingContext,
    job: &GenerateVideoJob,
    publisher: &StatusPublisher,
) -> WorkerResult<Option<String>> {
    let adapter = ctx.providers.adapter_for(&job.mode);

    // Reuse the existing task handle on redelivery
    let existing_task = ctx
        .videos
        .get_video(&job.video_id)
        .await?
        .and_then(|v| v.generation_config.task);

    let task_id = match existing_task {
        Some(task) => {
            info!(video_id = %job.video_id, task_id = %task.task_id, "Resuming existing provider task");
            task.task_id
        }
        None => {
            ctx.videos.mark_generating(&job.video_id).await?;

            let request =
                SubmitRequest::new(job.mode.clone()).with_params(job.provider_params.clone());
            let task_id = adapter.submit(&request).await?;

            let task_ref = ProviderTaskRef {
                task_id: task_id.clone(),
                submitted_at: chrono::Utc::now(),
                mode: job.mode.as_str().to_string(),
            };
            ctx.videos.set_task_ref(&job.video_id, &task_ref).await?;
            info!(video_id = %job.video_id, task_id = %task_id, "Submitted provider task");
            task_id
        }
    };

    let poller = TaskPoller::new(
        adapter,
        Arc::clone(&ctx.videos),
        Arc::clone(&ctx.clock),
        ctx.config.poll_interval,
        ctx.config.max_poll_attempts,
    );

    match poller.run(&job.video_id, &task_id, publisher).await? {
        PollOutcome::Succeeded { result_url } => Ok(Some(result_url)),
        PollOutcome::Cancelled => Ok(None),
    }
}

/// Process one pipeline job: run the preset's stages over the source
/// artifact and publish the finished output.
pub async fn handle_pipeline(ctx: &ProcessingContext, job: &RunPipelineJob) -> WorkerResult<()> {
    let logger = JobLogger::new(&job.job_id, "run_pipeline");
    logger.log_start(&format!(
        "Pipeline '{}' for video {}",
        job.preset_id, job.video_id
    ));

    let video = ctx
        .videos
        .get_video(&job.video_id)
        .await?
        .ok_or_else(|| WorkerError::job_failed(format!("video record {} missing", job.video_id)))?;

    if video.status == VideoStatus::Cancelled {
        logger.log_completion("Cancelled before start");
        return Ok(());
    }

    let preset = resolve_preset(&job.preset_id)
        .ok_or_else(|| WorkerError::job_failed(format!("unknown preset: {}", job.preset_id)))?;
    let storage = ctx.require_storage()?;
    let stages = build_stages(preset, job.stage_overrides.as_deref(), storage)?;

    ctx.videos.mark_processing(&job.video_id).await?;

    let workspace = RunWorkspace::create(&ctx.config.work_dir).await?;
    let mut stage_ctx = StageContext::new(
        job.video_id.clone(),
        &job.user_id,
        &job.source_url,
        workspace,
    );
    stage_ctx.effects = preset.effects.to_vec();
    stage_ctx.subtitle_url = job.subtitle_url.clone();
    stage_ctx.stage_timeout = ctx.config.stage_timeout;

    let mut runner = PipelineRunner::new(Arc::clone(&ctx.videos));
    if let Some(weights) = preset.weights {
        if job.stage_overrides.is_none() {
            runner = runner.with_weights(weights.to_vec());
        }
    }

    let publisher = StatusPublisher::new(
        Arc::clone(&ctx.videos),
        ctx.events.clone(),
        job.video_id.clone(),
    );

    let result = runner.run(&stages, &mut stage_ctx, &publisher).await;

    match result {
        Ok(PipelineResult::Completed(outcome)) => {
            let duration = outcome.probe.as_ref().and_then(|p| p.duration_seconds);
            ctx.videos
                .mark_ready(&job.video_id, &outcome.artifact_url, duration)
                .await?;
            metrics::counter!("pipeline_jobs_completed", "preset" => preset.id).increment(1);
            logger.log_completion("Pipeline complete");
            Ok(())
        }
        Ok(PipelineResult::Cancelled) => {
            logger.log_completion("Cancelled between stages");
            Ok(())
        }
        Err(e) if e.is_retryable() => {
            logger.log_warning(&format!("Transient failure, leaving for retry: {e}"));
            Err(e)
        }
        Err(e) => {
            ctx.videos
                .mark_failed(&job.video_id, &e.user_message())
                .await?;
            metrics::counter!("pipeline_jobs_failed", "preset" => preset.id).increment(1);
            logger.log_error(&format!("Terminal failure: {e}"));
            Err(e)
        }
    }
}

/// Process one batch expansion job.
pub async fn handle_expand(ctx: &ProcessingContext, job: &ExpandBatchJob) -> WorkerResult<()> {
    let logger = JobLogger::new(&job.job_id, "expand_batch");
    logger.log_start(&format!(
        "Expanding batch {} into {} children",
        job.batch_id,
        job.items.len()
    ));

    let controller = FanoutController::new(
        Arc::clone(&ctx.videos),
        Arc::clone(&ctx.batches),
        Arc::clone(&ctx.jobs),
    );
    controller.expand(job).await?;

    logger.log_completion("Batch expanded");
    Ok(())
}

/// Fold a child's terminal outcome onto its parent batch, if any.
///
/// Best-effort: the child's own record is already terminal, and a failed
/// counter write will be repaired by the queue redelivering the child.
async fn report_batch_outcome(
    ctx: &ProcessingContext,
    job: &GenerateVideoJob,
    outcome: ItemOutcome,
) {
    let Some(batch_ref) = &job.batch_ref else {
        return;
    };

    let controller = FanoutController::new(
        Arc::clone(&ctx.videos),
        Arc::clone(&ctx.batches),
        Arc::clone(&ctx.jobs),
    );
    if let Err(e) = controller
        .record_outcome(&batch_ref.batch_id, batch_ref.item_index, outcome)
        .await
    {
        warn!(
            batch_id = %batch_ref.batch_id,
            item = batch_ref.item_index,
            "Failed to record batch outcome: {}", e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use shopreel_models::{
        BatchKind, FanoutRequest, GenerationConfig, GenerationMode, Video,
    };
    use shopreel_providers::{
        ProviderAdapter, ProviderResult, ProviderRouter, ProviderStatus,
    };
    use shopreel_queue::QueueJob;
    use shopreel_store::{BatchStore, MemoryStore, VideoStore};

    use crate::clock::test_clock::InstantClock;
    use crate::config::WorkerConfig;
    use crate::context::JobSink;

    struct ScriptedAdapter {
        script: Mutex<Vec<ProviderResult<ProviderStatus>>>,
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn submit(&self, _request: &SubmitRequest) -> ProviderResult<String> {
            Ok("task-1".to_string())
        }

        async fn poll(&self, _task_id: &str) -> ProviderResult<ProviderStatus> {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Ok(ProviderStatus::running(0));
            }
            script.remove(0)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        jobs: Mutex<Vec<QueueJob>>,
    }

    #[async_trait]
    impl JobSink for RecordingSink {
        async fn submit(&self, job: &QueueJob) -> WorkerResult<String> {
            let mut jobs = self.jobs.lock().unwrap();
            jobs.push(job.clone());
            Ok(format!("msg-{}", jobs.len()))
        }
    }

    fn standard_mode() -> GenerationMode {
        GenerationMode::Standard {
            prompt: Some("sneaker hero shot".into()),
            negative_prompt: None,
            image_url: None,
            duration_seconds: 5,
        }
    }

    fn test_context(
        script: Vec<ProviderResult<ProviderStatus>>,
    ) -> (ProcessingContext, Arc<MemoryStore>, Arc<RecordingSink>) {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let adapter = Arc::new(ScriptedAdapter {
            script: Mutex::new(script),
        });

        let ctx = ProcessingContext::new(
            WorkerConfig::default(),
            store.clone(),
            store.clone(),
            ProviderRouter::new(adapter.clone(), adapter),
            sink.clone(),
            None,
            None,
            Arc::new(InstantClock::new()),
        );
        (ctx, store, sink)
    }

    async fn seeded_video(store: &Arc<MemoryStore>) -> Video {
        let video = Video::new("user-1", "prod-1", GenerationConfig::new(standard_mode()));
        store.create_video(&video).await.unwrap();
        video
    }

    #[tokio::test]
    async fn test_generation_happy_path() {
        let (ctx, store, _sink) = test_context(vec![
            Ok(ProviderStatus::queued()),
            Ok(ProviderStatus::running(40)),
            Ok(ProviderStatus::succeeded("https://cdn/out.mp4")),
        ]);
        let video = seeded_video(&store).await;
        let job = GenerateVideoJob::new("user-1", video.id.clone(), "prod-1", standard_mode());

        handle_generate(&ctx, &job).await.unwrap();

        let stored = store.get_video(&video.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VideoStatus::Ready);
        assert_eq!(stored.progress, 100);
        assert_eq!(stored.remote_url.as_deref(), Some("https://cdn/out.mp4"));
        assert_eq!(stored.duration_seconds, Some(5.0));
        // The provider task handle was persisted
        assert!(stored.generation_config.task.is_some());
    }

    #[tokio::test]
    async fn test_generation_cancelled_before_first_poll() {
        let (ctx, store, _sink) =
            test_context(vec![Ok(ProviderStatus::succeeded("https://cdn/out.mp4"))]);
        let video = seeded_video(&store).await;
        store.mark_cancelled(&video.id).await.unwrap();

        let job = GenerateVideoJob::new("user-1", video.id.clone(), "prod-1", standard_mode());
        handle_generate(&ctx, &job).await.unwrap();

        let stored = store.get_video(&video.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VideoStatus::Cancelled);
        assert!(stored.remote_url.is_none());
    }

    #[tokio::test]
    async fn test_generation_terminal_failure_marks_record() {
        let (ctx, store, _sink) =
            test_context(vec![Ok(ProviderStatus::failed("content policy"))]);
        let video = seeded_video(&store).await;

        let job = GenerateVideoJob::new("user-1", video.id.clone(), "prod-1", standard_mode());
        let err = handle_generate(&ctx, &job).await.unwrap_err();
        assert!(!err.is_retryable());

        let stored = store.get_video(&video.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VideoStatus::Failed);
        assert!(stored.error_message.as_deref().unwrap().contains("content policy"));
        // Progress frozen at its last value (no polls published progress)
        assert_eq!(stored.progress, 0);
    }

    #[tokio::test]
    async fn test_batch_child_outcomes_roll_up() {
        let (ctx, store, sink) = test_context(vec![
            // child 1 polls
            Ok(ProviderStatus::succeeded("https://cdn/1.mp4")),
            // child 2 polls
            Ok(ProviderStatus::failed("bad item")),
        ]);

        // Create and expand a 2-item batch
        let controller = FanoutController::new(
            Arc::clone(&ctx.videos),
            Arc::clone(&ctx.batches),
            Arc::clone(&ctx.jobs),
        );
        let request = FanoutRequest {
            user_id: "user-1".into(),
            product_id: "prod-1".into(),
            kind: BatchKind::Batch,
            items: vec![standard_mode(), standard_mode()],
        };
        let (batch_id, _) = controller.create(&request).await.unwrap();
        let expand = match &sink.jobs.lock().unwrap()[0] {
            QueueJob::ExpandBatch(j) => j.clone(),
            other => panic!("unexpected job: {other:?}"),
        };
        controller.expand(&expand).await.unwrap();

        let children: Vec<GenerateVideoJob> = sink
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter_map(|j| match j {
                QueueJob::GenerateVideo(g) => Some(g.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(children.len(), 2);

        // Child 1 succeeds, child 2 fails terminally
        handle_generate(&ctx, &children[0]).await.unwrap();
        handle_generate(&ctx, &children[1]).await.unwrap_err();

        let parent = store.get_batch(&batch_id).await.unwrap().unwrap();
        assert_eq!(parent.completed_count, 1);
        assert_eq!(parent.failed_count, 1);
        assert!(parent.status.is_terminal());
        assert_eq!(parent.status, shopreel_models::BatchStatus::Completed);
    }
}
