//! Generation modes.
//!
//! One variant per provider capability, each carrying only the fields that
//! mode actually uses. Requests are validated at construction time, not deep
//! inside provider-specific branches.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ValidationError, ValidationResult};

/// Default clip length in seconds when a mode does not specify one.
pub const DEFAULT_DURATION_SECONDS: u8 = 5;

/// Longest clip any provider currently accepts.
pub const MAX_DURATION_SECONDS: u8 = 60;

/// Which external provider executes a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Generative video API (text/image to video, editing modes)
    Vireo,
    /// Avatar presenter API (scripted lip-sync clips)
    Avatarly,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Vireo => "vireo",
            ProviderKind::Avatarly => "avatarly",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated generation request, one variant per provider mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GenerationMode {
    /// Base generation from a prompt and/or a product image.
    Standard {
        prompt: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        negative_prompt: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        #[serde(default = "default_duration")]
        duration_seconds: u8,
    },
    /// Re-render an existing clip in a different visual style.
    StyleTransfer {
        source_url: String,
        style_prompt: String,
        #[serde(default = "default_duration")]
        duration_seconds: u8,
    },
    /// Replace the background behind the product.
    BackgroundReplace {
        source_url: String,
        background_prompt: String,
    },
    /// Regenerate a masked region of the source clip.
    Inpaint {
        source_url: String,
        mask_url: String,
        prompt: String,
    },
    /// Scripted avatar presenter clip.
    LipSync {
        avatar_id: String,
        script: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        voice_id: Option<String>,
    },
    /// Extend a previously generated clip.
    Extend {
        source_task_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        #[serde(default = "default_duration")]
        duration_seconds: u8,
    },
    /// Animate a still image following a reference motion clip.
    MotionReference { image_url: String, motion_url: String },
    /// Compose several product shots into one clip.
    Composite {
        element_urls: Vec<String>,
        prompt: String,
    },
}

fn default_duration() -> u8 {
    DEFAULT_DURATION_SECONDS
}

impl GenerationMode {
    /// Short mode name used in logs and provider task refs.
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Standard { .. } => "standard",
            GenerationMode::StyleTransfer { .. } => "style_transfer",
            GenerationMode::BackgroundReplace { .. } => "background_replace",
            GenerationMode::Inpaint { .. } => "inpaint",
            GenerationMode::LipSync { .. } => "lip_sync",
            GenerationMode::Extend { .. } => "extend",
            GenerationMode::MotionReference { .. } => "motion_reference",
            GenerationMode::Composite { .. } => "composite",
        }
    }

    /// Which provider executes this mode.
    pub fn provider(&self) -> ProviderKind {
        match self {
            GenerationMode::LipSync { .. } => ProviderKind::Avatarly,
            _ => ProviderKind::Vireo,
        }
    }

    /// Requested clip duration, where the mode carries one.
    pub fn duration_seconds(&self) -> Option<u8> {
        match self {
            GenerationMode::Standard { duration_seconds, .. }
            | GenerationMode::StyleTransfer { duration_seconds, .. }
            | GenerationMode::Extend { duration_seconds, .. } => Some(*duration_seconds),
            _ => None,
        }
    }

    /// Validate mode-specific required fields.
    ///
    /// Must pass before a job for this mode may be enqueued.
    pub fn validate(&self) -> ValidationResult<()> {
        match self {
            GenerationMode::Standard {
                prompt,
                image_url,
                duration_seconds,
                ..
            } => {
                let has_prompt = prompt.as_deref().is_some_and(|p| !p.trim().is_empty());
                let has_image = image_url.as_deref().is_some_and(|u| !u.trim().is_empty());
                if !has_prompt && !has_image {
                    return Err(ValidationError::MissingAlternative {
                        mode: "standard",
                        options: "prompt, image_url",
                    });
                }
                validate_duration(*duration_seconds)
            }
            GenerationMode::StyleTransfer {
                source_url,
                style_prompt,
                duration_seconds,
            } => {
                require("style_transfer", "source_url", source_url)?;
                require("style_transfer", "style_prompt", style_prompt)?;
                validate_duration(*duration_seconds)
            }
            GenerationMode::BackgroundReplace {
                source_url,
                background_prompt,
            } => {
                require("background_replace", "source_url", source_url)?;
                require("background_replace", "background_prompt", background_prompt)
            }
            GenerationMode::Inpaint {
                source_url,
                mask_url,
                prompt,
            } => {
                require("inpaint", "source_url", source_url)?;
                require("inpaint", "mask_url", mask_url)?;
                require("inpaint", "prompt", prompt)
            }
            GenerationMode::LipSync {
                avatar_id, script, ..
            } => {
                require("lip_sync", "avatar_id", avatar_id)?;
                require("lip_sync", "script", script)
            }
            GenerationMode::Extend {
                source_task_id,
                duration_seconds,
                ..
            } => {
                require("extend", "source_task_id", source_task_id)?;
                validate_duration(*duration_seconds)
            }
            GenerationMode::MotionReference {
                image_url,
                motion_url,
            } => {
                require("motion_reference", "image_url", image_url)?;
                require("motion_reference", "motion_url", motion_url)
            }
            GenerationMode::Composite {
                element_urls,
                prompt,
            } => {
                if element_urls.is_empty() {
                    return Err(ValidationError::missing_field("composite", "element_urls"));
                }
                require("composite", "prompt", prompt)
            }
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn require(mode: &'static str, field: &'static str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::missing_field(mode, field))
    } else {
        Ok(())
    }
}

fn validate_duration(seconds: u8) -> ValidationResult<()> {
    if seconds == 0 || seconds > MAX_DURATION_SECONDS {
        return Err(ValidationError::invalid_value(
            "duration_seconds",
            format!("must be 1..={MAX_DURATION_SECONDS}, got {seconds}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard(prompt: Option<&str>, image: Option<&str>) -> GenerationMode {
        GenerationMode::Standard {
            prompt: prompt.map(String::from),
            negative_prompt: None,
            image_url: image.map(String::from),
            duration_seconds: 5,
        }
    }

    #[test]
    fn test_standard_requires_prompt_or_image() {
        assert!(standard(Some("spinning sneaker"), None).validate().is_ok());
        assert!(standard(None, Some("https://cdn/shoe.jpg")).validate().is_ok());

        let err = standard(None, None).validate().unwrap_err();
        assert!(matches!(err, ValidationError::MissingAlternative { .. }));

        // Whitespace-only values do not count
        let err = standard(Some("  "), None).validate().unwrap_err();
        assert!(matches!(err, ValidationError::MissingAlternative { .. }));
    }

    #[test]
    fn test_lip_sync_requires_script() {
        let mode = GenerationMode::LipSync {
            avatar_id: "ava-1".into(),
            script: String::new(),
            voice_id: None,
        };
        assert_eq!(
            mode.validate().unwrap_err(),
            ValidationError::missing_field("lip_sync", "script")
        );
    }

    #[test]
    fn test_duration_bounds() {
        let mode = GenerationMode::Standard {
            prompt: Some("demo".into()),
            negative_prompt: None,
            image_url: None,
            duration_seconds: 0,
        };
        assert!(matches!(
            mode.validate().unwrap_err(),
            ValidationError::InvalidValue { field: "duration_seconds", .. }
        ));
    }

    #[test]
    fn test_provider_routing() {
        let lip_sync = GenerationMode::LipSync {
            avatar_id: "ava-1".into(),
            script: "hello".into(),
            voice_id: None,
        };
        assert_eq!(lip_sync.provider(), ProviderKind::Avatarly);
        assert_eq!(standard(Some("p"), None).provider(), ProviderKind::Vireo);
    }

    #[test]
    fn test_mode_serde_tagged() {
        let mode = GenerationMode::Inpaint {
            source_url: "https://cdn/clip.mp4".into(),
            mask_url: "https://cdn/mask.png".into(),
            prompt: "remove logo".into(),
        };
        let json = serde_json::to_value(&mode).unwrap();
        assert_eq!(json["mode"], "inpaint");

        let back: GenerationMode = serde_json::from_value(json).unwrap();
        assert_eq!(back, mode);
    }
}
