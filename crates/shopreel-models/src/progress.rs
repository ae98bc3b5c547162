//! Progress reconciliation.
//!
//! Maps provider-reported progress into the UI-facing progress band. The
//! mapping is pure, total and deterministic so a worker retrying after a
//! crash re-publishes identical values.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized provider task phase.
///
/// Every adapter translates its vendor's raw status vocabulary into this
/// enum; nothing downstream ever sees a vendor string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPhase {
    /// Accepted by the provider, not started
    Queued,
    /// Actively generating
    Running,
    /// Finished with a result
    Succeeded,
    /// Provider reported failure
    Failed,
}

impl ProviderPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderPhase::Queued => "queued",
            ProviderPhase::Running => "running",
            ProviderPhase::Succeeded => "succeeded",
            ProviderPhase::Failed => "failed",
        }
    }

    /// Check if this is a terminal phase (no more polling needed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProviderPhase::Succeeded | ProviderPhase::Failed)
    }
}

impl fmt::Display for ProviderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ceiling of the generation band; 85..100 is reserved for local finishing.
pub const GENERATION_BAND_MAX: u8 = 85;

/// Floor of the generation band; 0..10 is reserved for submission.
pub const GENERATION_BAND_MIN: u8 = 10;

/// Map provider progress into the UI progress band with a phase label.
///
/// The provider's 0-100 range is compressed into 10-85 while generating:
/// `ui = min(10 + floor(provider * 0.75), 85)`. Inputs above 100 are
/// clamped first, so the function is defined for all inputs.
pub fn map_progress(provider_progress: u8, phase: ProviderPhase) -> (u8, &'static str) {
    match phase {
        ProviderPhase::Succeeded => (100, "complete"),
        ProviderPhase::Failed => (band_value(provider_progress), "failed"),
        ProviderPhase::Queued | ProviderPhase::Running => {
            let ui = band_value(provider_progress);
            (ui, band_label(ui))
        }
    }
}

fn band_value(provider_progress: u8) -> u8 {
    let p = provider_progress.min(100) as u32;
    (GENERATION_BAND_MIN as u32 + p * 3 / 4).min(GENERATION_BAND_MAX as u32) as u8
}

fn band_label(ui_progress: u8) -> &'static str {
    match ui_progress {
        0..=10 => "submitting",
        11..=30 => "queued",
        31..=60 => "generating",
        61..=85 => "rendering",
        86..=99 => "uploading",
        _ => "complete",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_progress_anchors() {
        assert_eq!(map_progress(0, ProviderPhase::Queued), (10, "submitting"));
        assert_eq!(map_progress(100, ProviderPhase::Running).0, 85);
        assert_eq!(map_progress(40, ProviderPhase::Running), (40, "generating"));
    }

    #[test]
    fn test_map_progress_total_and_idempotent() {
        for p in 0..=u8::MAX {
            for phase in [
                ProviderPhase::Queued,
                ProviderPhase::Running,
                ProviderPhase::Succeeded,
                ProviderPhase::Failed,
            ] {
                let first = map_progress(p, phase);
                let second = map_progress(p, phase);
                assert_eq!(first, second);
                assert!(first.0 <= 100);
            }
        }
    }

    #[test]
    fn test_map_progress_monotone_in_provider_progress() {
        let mut last = 0;
        for p in 0..=100 {
            let (ui, _) = map_progress(p, ProviderPhase::Running);
            assert!(ui >= last);
            last = ui;
        }
    }

    #[test]
    fn test_map_progress_terminal_phases() {
        assert_eq!(map_progress(57, ProviderPhase::Succeeded), (100, "complete"));
        let (ui, label) = map_progress(57, ProviderPhase::Failed);
        assert_eq!(label, "failed");
        assert!(ui <= GENERATION_BAND_MAX);
    }

    #[test]
    fn test_band_labels() {
        assert_eq!(map_progress(10, ProviderPhase::Queued).1, "queued");
        assert_eq!(map_progress(70, ProviderPhase::Running).1, "rendering");
    }
}
