//! Pipeline orchestrator.
//!
//! Applies an ordered, named sequence of transformation stages to one source
//! artifact. The runner is preset-agnostic: it executes whatever stage list
//! it receives, publishes stage-boundary progress, persists the stage
//! history, and guarantees the run workspace is released on every exit path.

pub mod presets;
pub mod stages;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use shopreel_media::{EffectKind, MediaProbe, RunWorkspace};
use shopreel_models::{PipelineRun, VideoId, VideoMeta, VideoStatus};
use shopreel_store::VideoStore;

use crate::error::{WorkerError, WorkerResult};
use crate::publisher::StatusPublisher;

pub use presets::{resolve_preset, PipelinePreset};

/// Mutable state threaded through the stages of one run.
pub struct StageContext {
    /// Video the run belongs to
    pub video_id: VideoId,
    /// Owner
    pub user_id: String,
    /// Source artifact URL (downloaded by the init stage)
    pub source_url: String,
    /// Run-scoped scratch directory
    pub workspace: RunWorkspace,
    /// Path of the artifact as it moves through the stages
    pub current: PathBuf,
    /// Thumbnail path, once generated
    pub thumbnail: Option<PathBuf>,
    /// Final artifact URL, set by the upload stage
    pub artifact_url: Option<String>,
    /// Thumbnail URL, set by the upload stage
    pub thumbnail_url: Option<String>,
    /// Probe of the finished artifact
    pub probe: Option<MediaProbe>,
    /// Effects applied by the effects stage
    pub effects: Vec<EffectKind>,
    /// Trim window (start, duration), when the trim stage is configured
    pub trim: Option<(f64, f64)>,
    /// Prepared captions file URL for subtitle burn-in
    pub subtitle_url: Option<String>,
    /// Per-stage FFmpeg timeout
    pub stage_timeout: Duration,
}

impl StageContext {
    /// Create a context rooted at a fresh workspace.
    pub fn new(
        video_id: VideoId,
        user_id: impl Into<String>,
        source_url: impl Into<String>,
        workspace: RunWorkspace,
    ) -> Self {
        let current = workspace.path("source.mp4");
        Self {
            video_id,
            user_id: user_id.into(),
            source_url: source_url.into(),
            workspace,
            current,
            thumbnail: None,
            artifact_url: None,
            thumbnail_url: None,
            probe: None,
            effects: Vec::new(),
            trim: None,
            subtitle_url: None,
            stage_timeout: Duration::from_secs(300),
        }
    }
}

/// One named, independently-failable transformation step.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &mut StageContext) -> WorkerResult<()>;
}

/// Output of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Stage history, in execution order
    pub run: PipelineRun,
    /// Final artifact URL
    pub artifact_url: String,
    /// Thumbnail URL, when one was produced
    pub thumbnail_url: Option<String>,
    /// Probe of the finished artifact
    pub probe: Option<MediaProbe>,
}

/// Terminal result of a run.
#[derive(Debug, Clone)]
pub enum PipelineResult {
    Completed(Box<PipelineOutcome>),
    /// The user cancelled the Video between stages.
    Cancelled,
}

/// Executes stage lists.
pub struct PipelineRunner {
    store: Arc<dyn VideoStore>,
    /// Per-stage weights; equal weighting when absent
    weights: Option<Vec<u32>>,
}

impl PipelineRunner {
    pub fn new(store: Arc<dyn VideoStore>) -> Self {
        Self {
            store,
            weights: None,
        }
    }

    /// Use custom per-stage weights (must match the stage count).
    pub fn with_weights(mut self, weights: Vec<u32>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Run the stages in order.
    ///
    /// A failing stage aborts the remainder: already-completed stage outputs
    /// are discarded with the workspace, so the contract yields either a
    /// complete output or none. Cancellation is checked before each stage.
    pub async fn run(
        &self,
        stages: &[Arc<dyn PipelineStage>],
        ctx: &mut StageContext,
        publisher: &StatusPublisher,
    ) -> WorkerResult<PipelineResult> {
        let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
        let mut run = PipelineRun::new(&names);

        if let Some(weights) = &self.weights {
            debug_assert_eq!(weights.len(), stages.len());
        }

        for stage in stages {
            if self.is_cancelled(&ctx.video_id).await? {
                info!(video_id = %ctx.video_id, "Cancellation observed, aborting pipeline");
                self.release(ctx).await;
                return Ok(PipelineResult::Cancelled);
            }

            run.start_stage();
            self.persist_history(ctx, &run).await;
            publisher
                .publish(self.overall(&run, 0), stage.name())
                .await?;

            info!(video_id = %ctx.video_id, stage = stage.name(), "Running pipeline stage");

            if let Err(e) = stage.run(ctx).await {
                let name = stage.name();
                run.fail_stage();
                self.persist_history(ctx, &run).await;
                self.release(ctx).await;
                return Err(match e {
                    err @ WorkerError::PipelineStage { .. } => err,
                    other => WorkerError::pipeline_stage(name, other.to_string()),
                });
            }

            run.complete_stage();
        }

        self.persist_history(ctx, &run).await;
        self.release(ctx).await;

        let artifact_url = ctx
            .artifact_url
            .clone()
            .ok_or_else(|| WorkerError::job_failed("pipeline finished without an artifact URL"))?;

        Ok(PipelineResult::Completed(Box::new(PipelineOutcome {
            run,
            artifact_url,
            thumbnail_url: ctx.thumbnail_url.clone(),
            probe: ctx.probe.clone(),
        })))
    }

    /// Overall progress for the current position of a run.
    fn overall(&self, run: &PipelineRun, intra: u8) -> u8 {
        match &self.weights {
            None => run.overall_progress(intra),
            Some(weights) => {
                let total: u32 = weights.iter().sum();
                if total == 0 {
                    return 100;
                }
                let done: u32 = weights
                    .iter()
                    .take(run.current_stage_index.min(weights.len()))
                    .sum();
                let current = weights
                    .get(run.current_stage_index)
                    .copied()
                    .unwrap_or(0);
                let scaled = done * 100 + current * intra.min(100) as u32;
                ((scaled / total).min(100)) as u8
            }
        }
    }

    async fn is_cancelled(&self, video_id: &VideoId) -> WorkerResult<bool> {
        Ok(self.store.get_status(video_id).await? == Some(VideoStatus::Cancelled))
    }

    /// Persist the stage history onto the record. Best-effort: a store blip
    /// here must not abort the run itself.
    async fn persist_history(&self, ctx: &StageContext, run: &PipelineRun) {
        let meta = VideoMeta {
            stage_history: run.stages.clone(),
            codec: ctx.probe.as_ref().and_then(|p| p.codec.clone()),
            width: ctx.probe.as_ref().and_then(|p| p.width),
            height: ctx.probe.as_ref().and_then(|p| p.height),
            thumbnail_url: ctx.thumbnail_url.clone(),
        };
        if let Err(e) = self.store.update_metadata(&ctx.video_id, &meta).await {
            warn!(video_id = %ctx.video_id, "Failed to persist stage history: {}", e);
        }
    }

    async fn release(&self, ctx: &mut StageContext) {
        if let Err(e) = ctx.workspace.cleanup().await {
            warn!(video_id = %ctx.video_id, "Failed to clean run workspace: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use shopreel_models::{GenerationConfig, GenerationMode, StageStatus, Video};
    use shopreel_store::MemoryStore;
    use tempfile::TempDir;

    /// Stage that records its execution and optionally fails.
    struct FakeStage {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
        set_artifact: bool,
    }

    #[async_trait]
    impl PipelineStage for FakeStage {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, ctx: &mut StageContext) -> WorkerResult<()> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(WorkerError::job_failed("stage exploded"));
            }
            if self.set_artifact {
                ctx.artifact_url = Some("https://cdn/final.mp4".to_string());
            }
            Ok(())
        }
    }

    fn fake(
        name: &'static str,
        fail: bool,
        log: &Arc<Mutex<Vec<&'static str>>>,
        set_artifact: bool,
    ) -> Arc<dyn PipelineStage> {
        Arc::new(FakeStage {
            name,
            fail,
            log: Arc::clone(log),
            set_artifact,
        })
    }

    async fn setup() -> (Arc<MemoryStore>, Video, TempDir) {
        let store = Arc::new(MemoryStore::new());
        let video = Video::new(
            "user-1",
            "prod-1",
            GenerationConfig::new(GenerationMode::Standard {
                prompt: Some("demo".into()),
                negative_prompt: None,
                image_url: None,
                duration_seconds: 5,
            }),
        );
        store.create_video(&video).await.unwrap();
        store.mark_processing(&video.id).await.unwrap();
        (store, video, TempDir::new().unwrap())
    }

    async fn context(video: &Video, base: &TempDir) -> StageContext {
        let workspace = RunWorkspace::create(base.path()).await.unwrap();
        StageContext::new(
            video.id.clone(),
            "user-1",
            "https://provider/raw.mp4",
            workspace,
        )
    }

    #[tokio::test]
    async fn test_stages_run_in_configured_order() {
        let (store, video, base) = setup().await;
        let log = Arc::new(Mutex::new(Vec::new()));
        let stages = vec![
            fake("init", false, &log, false),
            fake("effects", false, &log, false),
            fake("upload", false, &log, true),
        ];

        let runner = PipelineRunner::new(store.clone());
        let publisher = StatusPublisher::new(store.clone(), None, video.id.clone());
        let mut ctx = context(&video, &base).await;

        let result = runner.run(&stages, &mut ctx, &publisher).await.unwrap();
        let outcome = match result {
            PipelineResult::Completed(outcome) => outcome,
            other => panic!("unexpected result: {other:?}"),
        };

        assert_eq!(*log.lock().unwrap(), vec!["init", "effects", "upload"]);
        let history: Vec<_> = outcome.run.stages.iter().map(|s| s.name.clone()).collect();
        assert_eq!(history, vec!["init", "effects", "upload"]);
        assert!(outcome
            .run
            .stages
            .iter()
            .all(|s| s.status == StageStatus::Completed));
        assert_eq!(outcome.artifact_url, "https://cdn/final.mp4");
    }

    #[tokio::test]
    async fn test_failing_stage_aborts_remainder() {
        let (store, video, base) = setup().await;
        let log = Arc::new(Mutex::new(Vec::new()));
        let stages = vec![
            fake("effects", false, &log, false),
            fake("optimize", true, &log, false),
            fake("upload", false, &log, true),
        ];

        let runner = PipelineRunner::new(store.clone());
        let publisher = StatusPublisher::new(store.clone(), None, video.id.clone());
        let mut ctx = context(&video, &base).await;
        let workspace_root = ctx.workspace.root().to_path_buf();

        let err = runner.run(&stages, &mut ctx, &publisher).await.unwrap_err();
        match err {
            WorkerError::PipelineStage { stage, .. } => assert_eq!(stage, "optimize"),
            other => panic!("unexpected error: {other:?}"),
        }

        // upload never ran, workspace released, no artifact
        assert_eq!(*log.lock().unwrap(), vec!["effects", "optimize"]);
        assert!(!workspace_root.exists());
        assert!(ctx.artifact_url.is_none());

        // Stage history persisted with the failure recorded
        let stored = store.get_video(&video.id).await.unwrap().unwrap();
        let statuses: Vec<_> = stored
            .metadata
            .stage_history
            .iter()
            .map(|s| (s.name.clone(), s.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("effects".to_string(), StageStatus::Completed),
                ("optimize".to_string(), StageStatus::Failed),
                ("upload".to_string(), StageStatus::Skipped),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancellation_between_stages() {
        let (store, video, base) = setup().await;
        let log = Arc::new(Mutex::new(Vec::new()));

        // First stage cancels the video, second must never run
        struct CancellingStage {
            store: Arc<MemoryStore>,
            video_id: VideoId,
            ran: Arc<AtomicBool>,
        }

        #[async_trait]
        impl PipelineStage for CancellingStage {
            fn name(&self) -> &'static str {
                "init"
            }

            async fn run(&self, _ctx: &mut StageContext) -> WorkerResult<()> {
                self.ran.store(true, Ordering::SeqCst);
                self.store.mark_cancelled(&self.video_id).await.unwrap();
                Ok(())
            }
        }

        let ran = Arc::new(AtomicBool::new(false));
        let stages: Vec<Arc<dyn PipelineStage>> = vec![
            Arc::new(CancellingStage {
                store: store.clone(),
                video_id: video.id.clone(),
                ran: Arc::clone(&ran),
            }),
            fake("optimize", false, &log, false),
        ];

        let runner = PipelineRunner::new(store.clone());
        let publisher = StatusPublisher::new(store.clone(), None, video.id.clone());
        let mut ctx = context(&video, &base).await;

        let result = runner.run(&stages, &mut ctx, &publisher).await.unwrap();
        assert!(matches!(result, PipelineResult::Cancelled));
        assert!(ran.load(Ordering::SeqCst));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_weighted_progress() {
        let (store, _video, _base) = setup().await;
        let runner = PipelineRunner::new(store).with_weights(vec![10, 80, 10]);

        let mut run = PipelineRun::new(&["init", "optimize", "upload"]);
        assert_eq!(runner.overall(&run, 0), 0);
        run.complete_stage();
        assert_eq!(runner.overall(&run, 0), 10);
        assert_eq!(runner.overall(&run, 50), 50);
        run.complete_stage();
        assert_eq!(runner.overall(&run, 0), 90);
        run.complete_stage();
        assert_eq!(runner.overall(&run, 0), 100);
    }
}
