//! Production stage implementations.

use std::sync::Arc;

use async_trait::async_trait;

use shopreel_media::{
    burn_subtitles_filter, download_to_file, generate_thumbnail, platform_optimize_args,
    probe_media, FfmpegCommand, FfmpegRunner,
};
use shopreel_media::filters::{effect_chain, platform_scale_filter};
use shopreel_storage::R2Client;

use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::presets::{stage_names, PipelinePreset};
use crate::pipeline::{PipelineStage, StageContext};

/// Download the source artifact into the workspace.
pub struct InitStage;

#[async_trait]
impl PipelineStage for InitStage {
    fn name(&self) -> &'static str {
        stage_names::INIT
    }

    async fn run(&self, ctx: &mut StageContext) -> WorkerResult<()> {
        let dest = ctx.workspace.path("source.mp4");
        download_to_file(&ctx.source_url, &dest).await?;
        ctx.current = dest;
        Ok(())
    }
}

/// Apply the preset's effect chain.
pub struct EffectsStage;

#[async_trait]
impl PipelineStage for EffectsStage {
    fn name(&self) -> &'static str {
        stage_names::EFFECTS
    }

    async fn run(&self, ctx: &mut StageContext) -> WorkerResult<()> {
        let Some(filter) = effect_chain(&ctx.effects) else {
            // Nothing configured; the stage is a pass-through
            return Ok(());
        };

        let output = ctx.workspace.path("effects.mp4");
        let cmd = FfmpegCommand::new(&ctx.current, &output)
            .video_filter(filter)
            .audio_codec("copy");
        FfmpegRunner::new()
            .with_timeout(ctx.stage_timeout.as_secs())
            .run(&cmd)
            .await?;
        ctx.current = output;
        Ok(())
    }
}

/// Cut the artifact to the configured window.
pub struct TrimStage;

#[async_trait]
impl PipelineStage for TrimStage {
    fn name(&self) -> &'static str {
        stage_names::TRIM
    }

    async fn run(&self, ctx: &mut StageContext) -> WorkerResult<()> {
        let Some((start, duration)) = ctx.trim else {
            return Ok(());
        };

        let output = ctx.workspace.path("trimmed.mp4");
        let cmd = FfmpegCommand::new(&ctx.current, &output)
            .seek(start)
            .duration(duration)
            .video_codec("libx264")
            .audio_codec("aac");
        FfmpegRunner::new()
            .with_timeout(ctx.stage_timeout.as_secs())
            .run(&cmd)
            .await?;
        ctx.current = output;
        Ok(())
    }
}

/// Burn prepared captions into the frame.
pub struct SubtitleStage;

#[async_trait]
impl PipelineStage for SubtitleStage {
    fn name(&self) -> &'static str {
        stage_names::SUBTITLES
    }

    async fn run(&self, ctx: &mut StageContext) -> WorkerResult<()> {
        let Some(subtitle_url) = ctx.subtitle_url.clone() else {
            return Ok(());
        };

        let srt_path = ctx.workspace.path("captions.srt");
        download_to_file(&subtitle_url, &srt_path).await?;

        let output = ctx.workspace.path("subtitled.mp4");
        let cmd = FfmpegCommand::new(&ctx.current, &output)
            .video_filter(burn_subtitles_filter(&srt_path))
            .audio_codec("copy");
        FfmpegRunner::new()
            .with_timeout(ctx.stage_timeout.as_secs())
            .run(&cmd)
            .await?;
        ctx.current = output;
        Ok(())
    }
}

/// Re-encode to the platform's portrait H.264 profile.
pub struct OptimizeStage;

#[async_trait]
impl PipelineStage for OptimizeStage {
    fn name(&self) -> &'static str {
        stage_names::OPTIMIZE
    }

    async fn run(&self, ctx: &mut StageContext) -> WorkerResult<()> {
        let output = ctx.workspace.path("optimized.mp4");
        let cmd = FfmpegCommand::new(&ctx.current, &output)
            .video_filter(platform_scale_filter())
            .output_args(platform_optimize_args());
        FfmpegRunner::new()
            .with_timeout(ctx.stage_timeout.as_secs())
            .run(&cmd)
            .await?;
        ctx.current = output;
        Ok(())
    }
}

/// Sample a thumbnail frame.
pub struct ThumbnailStage;

#[async_trait]
impl PipelineStage for ThumbnailStage {
    fn name(&self) -> &'static str {
        stage_names::THUMBNAIL
    }

    async fn run(&self, ctx: &mut StageContext) -> WorkerResult<()> {
        let output = ctx.workspace.path("thumbnail.jpg");
        generate_thumbnail(&ctx.current, &output).await?;
        ctx.thumbnail = Some(output);
        Ok(())
    }
}

/// Probe the finished artifact and upload it (plus thumbnail) to storage.
pub struct UploadStage {
    storage: Arc<R2Client>,
}

impl UploadStage {
    pub fn new(storage: Arc<R2Client>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl PipelineStage for UploadStage {
    fn name(&self) -> &'static str {
        stage_names::UPLOAD
    }

    async fn run(&self, ctx: &mut StageContext) -> WorkerResult<()> {
        ctx.probe = Some(probe_media(&ctx.current).await?);

        let key = self
            .storage
            .upload_artifact(&ctx.current, &ctx.user_id, ctx.video_id.as_str(), "final.mp4")
            .await?;
        ctx.artifact_url = Some(self.storage.delivery_url(&key).await?);

        if let Some(thumbnail) = &ctx.thumbnail {
            let key = self
                .storage
                .upload_thumbnail(thumbnail, &ctx.user_id, ctx.video_id.as_str())
                .await?;
            ctx.thumbnail_url = Some(self.storage.delivery_url(&key).await?);
        }

        Ok(())
    }
}

/// Build the stage list a preset (or an explicit override list) names.
pub fn build_stages(
    preset: &PipelinePreset,
    overrides: Option<&[String]>,
    storage: Arc<R2Client>,
) -> WorkerResult<Vec<Arc<dyn PipelineStage>>> {
    let names: Vec<&str> = match overrides {
        Some(names) => names.iter().map(String::as_str).collect(),
        None => preset.stages.to_vec(),
    };

    names
        .iter()
        .map(|name| -> WorkerResult<Arc<dyn PipelineStage>> {
            Ok(match *name {
                stage_names::INIT => Arc::new(InitStage),
                stage_names::EFFECTS => Arc::new(EffectsStage),
                stage_names::TRIM => Arc::new(TrimStage),
                stage_names::SUBTITLES => Arc::new(SubtitleStage),
                stage_names::OPTIMIZE => Arc::new(OptimizeStage),
                stage_names::THUMBNAIL => Arc::new(ThumbnailStage),
                stage_names::UPLOAD => Arc::new(UploadStage::new(Arc::clone(&storage))),
                other => {
                    return Err(WorkerError::job_failed(format!(
                        "unknown pipeline stage: {other}"
                    )))
                }
            })
        })
        .collect()
}
