//! Named stage presets.
//!
//! A preset is a bundle of stage configuration chosen by the caller; the
//! runner itself only ever sees the resolved stage list.

use shopreel_media::EffectKind;

/// Stage names, in canonical chain order.
pub mod stage_names {
    pub const INIT: &str = "init";
    pub const EFFECTS: &str = "effects";
    pub const TRIM: &str = "trim";
    pub const SUBTITLES: &str = "subtitles";
    pub const OPTIMIZE: &str = "optimize";
    pub const THUMBNAIL: &str = "thumbnail";
    pub const UPLOAD: &str = "upload";
}

/// A named bundle of stage configuration.
#[derive(Debug, Clone)]
pub struct PipelinePreset {
    /// Preset identifier as carried in job payloads
    pub id: &'static str,
    /// Ordered stage list
    pub stages: &'static [&'static str],
    /// Per-stage weights; equal weighting when absent
    pub weights: Option<&'static [u32]>,
    /// Effects applied by the effects stage
    pub effects: &'static [EffectKind],
}

use stage_names::*;

/// Full chain for short-form social posts.
pub const SHORT_FORM_SOCIAL: PipelinePreset = PipelinePreset {
    id: "short-form-social",
    stages: &[INIT, EFFECTS, TRIM, SUBTITLES, OPTIMIZE, THUMBNAIL, UPLOAD],
    // Encoding dominates the wall clock; weight it accordingly
    weights: Some(&[10, 15, 5, 15, 35, 5, 15]),
    effects: &[EffectKind::ZoomPulse, EffectKind::ColorPop],
};

/// Captioned testimonial-style output, no synthetic effects.
pub const TESTIMONIAL: PipelinePreset = PipelinePreset {
    id: "testimonial",
    stages: &[INIT, SUBTITLES, OPTIMIZE, THUMBNAIL, UPLOAD],
    weights: None,
    effects: &[],
};

/// Re-encode and upload, nothing else.
pub const PASS_THROUGH: PipelinePreset = PipelinePreset {
    id: "pass-through",
    stages: &[INIT, OPTIMIZE, UPLOAD],
    weights: None,
    effects: &[],
};

/// Resolve a preset by its identifier.
pub fn resolve_preset(id: &str) -> Option<&'static PipelinePreset> {
    match id {
        "short-form-social" => Some(&SHORT_FORM_SOCIAL),
        "testimonial" => Some(&TESTIMONIAL),
        "pass-through" => Some(&PASS_THROUGH),
        _ => None,
    }
}
