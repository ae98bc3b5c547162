//! FFmpeg CLI wrapper for video post-processing.
//!
//! This crate provides:
//! - FFmpeg command builder and runner with progress parsing
//! - ffprobe metadata probing
//! - Filter builders for effects, subtitle burn-in and platform re-encoding
//! - Thumbnail generation
//! - HTTP artifact download
//! - Run-scoped temporary workspaces with guaranteed cleanup

pub mod command;
pub mod download;
pub mod error;
pub mod filters;
pub mod probe;
pub mod progress;
pub mod thumbnail;
pub mod workspace;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use download::download_to_file;
pub use error::{MediaError, MediaResult};
pub use filters::{
    burn_subtitles_filter, effect_filter, platform_optimize_args, EffectKind, PLATFORM_HEIGHT,
    PLATFORM_WIDTH,
};
pub use probe::{probe_media, MediaProbe};
pub use progress::FfmpegProgress;
pub use thumbnail::generate_thumbnail;
pub use workspace::RunWorkspace;
