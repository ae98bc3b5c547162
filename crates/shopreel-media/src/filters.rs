//! FFmpeg filter builders for product-video post-processing.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Target portrait width for short-form platforms.
pub const PLATFORM_WIDTH: u32 = 1080;

/// Target portrait height for short-form platforms.
pub const PLATFORM_HEIGHT: u32 = 1920;

/// Visual effect applied during the effects stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Slow push-in on the product
    ZoomPulse,
    /// Saturation and contrast lift
    ColorPop,
    /// Darkened corners framing the subject
    Vignette,
}

impl EffectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectKind::ZoomPulse => "zoom_pulse",
            EffectKind::ColorPop => "color_pop",
            EffectKind::Vignette => "vignette",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Slow push-in. zoompan wants a frame count; 25fps * 5s covers the
/// longest default clip, extra frames are dropped at the output trim.
const FILTER_ZOOM_PULSE: &str =
    "zoompan=z='min(zoom+0.0008,1.1)':d=125:x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':s=1080x1920";

const FILTER_COLOR_POP: &str = "eq=saturation=1.25:contrast=1.08";

const FILTER_VIGNETTE: &str = "vignette=PI/5";

/// Build the filter string for one effect.
pub fn effect_filter(effect: EffectKind) -> &'static str {
    match effect {
        EffectKind::ZoomPulse => FILTER_ZOOM_PULSE,
        EffectKind::ColorPop => FILTER_COLOR_POP,
        EffectKind::Vignette => FILTER_VIGNETTE,
    }
}

/// Chain several effects into one -vf argument.
pub fn effect_chain(effects: &[EffectKind]) -> Option<String> {
    if effects.is_empty() {
        return None;
    }
    Some(
        effects
            .iter()
            .map(|e| effect_filter(*e))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Build a subtitle burn-in filter for an .srt/.ass file.
///
/// The path goes through FFmpeg's filter-expression parser, so `:` and `'`
/// must be escaped.
pub fn burn_subtitles_filter(subtitle_path: &Path) -> String {
    let escaped = subtitle_path
        .to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'");
    format!(
        "subtitles={}:force_style='FontSize=18,Outline=1,MarginV=48'",
        escaped
    )
}

/// Scale-and-pad filter to the platform's portrait frame.
pub fn platform_scale_filter() -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = PLATFORM_WIDTH,
        h = PLATFORM_HEIGHT
    )
}

/// Output arguments for the platform re-encode (H.264 + AAC, faststart).
pub fn platform_optimize_args() -> Vec<String> {
    vec![
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "medium".into(),
        "-crf".into(),
        "23".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "128k".into(),
        "-movflags".into(),
        "+faststart".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_effect_chain_joins_in_order() {
        let chain = effect_chain(&[EffectKind::ColorPop, EffectKind::Vignette]).unwrap();
        assert_eq!(chain, format!("{},{}", FILTER_COLOR_POP, FILTER_VIGNETTE));
        assert!(effect_chain(&[]).is_none());
    }

    #[test]
    fn test_subtitle_filter_escapes_path() {
        let filter = burn_subtitles_filter(&PathBuf::from("/tmp/a:b.srt"));
        assert!(filter.contains("/tmp/a\\:b.srt"));
        assert!(filter.contains("force_style"));
    }

    #[test]
    fn test_platform_scale_filter_targets_portrait() {
        let filter = platform_scale_filter();
        assert!(filter.contains("1080:1920"));
    }

    #[test]
    fn test_platform_optimize_args_use_h264() {
        let args = platform_optimize_args();
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"+faststart".to_string()));
    }
}
