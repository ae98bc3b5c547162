//! ffprobe metadata probing.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Technical metadata of a media file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaProbe {
    /// Video codec name (e.g. "h264")
    pub codec: Option<String>,
    /// Width in pixels
    pub width: Option<u32>,
    /// Height in pixels
    pub height: Option<u32>,
    /// Duration in seconds
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe a media file with ffprobe.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaProbe> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(format!(
            "ffprobe exited with {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)?;
    debug!("Probed {}: {} streams", path.display(), parsed.streams.len());

    Ok(probe_from_output(parsed))
}

fn probe_from_output(parsed: ProbeOutput) -> MediaProbe {
    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    MediaProbe {
        codec: video_stream.and_then(|s| s.codec_name.clone()),
        width: video_stream.and_then(|s| s.width),
        height: video_stream.and_then(|s| s.height),
        duration_seconds: parsed
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse().ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_parsing_picks_video_stream() {
        let raw = r#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1080, "height": 1920}
            ],
            "format": {"duration": "5.04"}
        }"#;
        let parsed: ProbeOutput = serde_json::from_str(raw).unwrap();
        let probe = probe_from_output(parsed);

        assert_eq!(probe.codec.as_deref(), Some("h264"));
        assert_eq!(probe.width, Some(1080));
        assert_eq!(probe.height, Some(1920));
        assert!((probe.duration_seconds.unwrap() - 5.04).abs() < 0.001);
    }

    #[test]
    fn test_probe_parsing_handles_missing_fields() {
        let parsed: ProbeOutput = serde_json::from_str(r#"{"streams": []}"#).unwrap();
        let probe = probe_from_output(parsed);
        assert!(probe.codec.is_none());
        assert!(probe.duration_seconds.is_none());
    }
}
