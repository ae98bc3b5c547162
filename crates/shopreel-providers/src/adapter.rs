//! The provider adapter contract.

use async_trait::async_trait;
use serde_json::Value;

use shopreel_models::{GenerationMode, ProviderPhase};

use crate::error::{ProviderError, ProviderResult};

/// Normalized request passed to `submit`.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Validated generation mode and its fields
    pub mode: GenerationMode,
    /// Opaque vendor parameters forwarded verbatim
    pub provider_params: Value,
}

impl SubmitRequest {
    pub fn new(mode: GenerationMode) -> Self {
        Self {
            mode,
            provider_params: Value::Null,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.provider_params = params;
        self
    }
}

/// Normalized poll result.
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    /// Normalized phase
    pub phase: ProviderPhase,
    /// Provider-reported progress (0-100), when the vendor exposes one
    pub progress: Option<u8>,
    /// Result URL, present once the phase is `Succeeded`
    pub result_url: Option<String>,
    /// Vendor error text, present when the phase is `Failed`
    pub error: Option<String>,
}

impl ProviderStatus {
    pub fn queued() -> Self {
        Self {
            phase: ProviderPhase::Queued,
            progress: Some(0),
            result_url: None,
            error: None,
        }
    }

    pub fn running(progress: u8) -> Self {
        Self {
            phase: ProviderPhase::Running,
            progress: Some(progress),
            result_url: None,
            error: None,
        }
    }

    pub fn succeeded(result_url: impl Into<String>) -> Self {
        Self {
            phase: ProviderPhase::Succeeded,
            progress: Some(100),
            result_url: Some(result_url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            phase: ProviderPhase::Failed,
            progress: None,
            result_url: None,
            error: Some(error.into()),
        }
    }
}

/// One external video-generation backend.
///
/// Implementations hold no shared mutable state; a single adapter instance
/// serves any number of concurrent tasks.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Short vendor name for logs.
    fn name(&self) -> &'static str;

    /// Submit a generation request; returns the opaque task identifier.
    ///
    /// Fails with `ProviderError::Rejected` when the upstream API returns a
    /// non-success HTTP status.
    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<String>;

    /// Poll a task; returns normalized status.
    ///
    /// Fails with `ProviderError::Unavailable` on transport errors, which
    /// callers treat as retryable.
    async fn poll(&self, task_id: &str) -> ProviderResult<ProviderStatus>;
}

/// Extract a result URL by trying nested locations in a fixed order.
///
/// Compatibility shim: vendors have moved the result URL between releases
/// (top-level `video_url`, nested under `result`, under `output.assets[0]`,
/// ...). The fallback order is append-only; new locations go at the end so
/// existing responses keep resolving the same way. Keep all of this here;
/// nothing outside the adapters may re-implement it.
pub fn extract_result_url<'a>(body: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    paths.iter().find_map(|path| resolve(body, path))
}

fn resolve<'a>(body: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut node = body;
    for key in path {
        node = match key.parse::<usize>() {
            Ok(index) => node.get(index)?,
            Err(_) => node.get(key)?,
        };
    }
    node.as_str().filter(|s| !s.is_empty())
}

/// Map a non-success submit response into `ProviderError::Rejected`.
pub async fn rejected_from_response(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ProviderError::Rejected { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_result_url_fallback_order() {
        let paths: &[&[&str]] = &[
            &["video_url"],
            &["result", "video_url"],
            &["output", "assets", "0"],
        ];

        let top = json!({"video_url": "https://a/v.mp4"});
        assert_eq!(extract_result_url(&top, paths), Some("https://a/v.mp4"));

        let nested = json!({"result": {"video_url": "https://b/v.mp4"}});
        assert_eq!(extract_result_url(&nested, paths), Some("https://b/v.mp4"));

        let assets = json!({"output": {"assets": ["https://c/v.mp4"]}});
        assert_eq!(extract_result_url(&assets, paths), Some("https://c/v.mp4"));

        // Earlier locations win when several are present
        let both = json!({
            "video_url": "https://first/v.mp4",
            "result": {"video_url": "https://second/v.mp4"}
        });
        assert_eq!(extract_result_url(&both, paths), Some("https://first/v.mp4"));
    }

    #[test]
    fn test_extract_result_url_ignores_non_strings() {
        let paths: &[&[&str]] = &[&["video_url"], &["result", "video_url"]];
        let body = json!({"video_url": 42, "result": {"video_url": "https://ok/v.mp4"}});
        assert_eq!(extract_result_url(&body, paths), Some("https://ok/v.mp4"));

        let empty = json!({"video_url": ""});
        assert_eq!(extract_result_url(&empty, paths), None);
    }
}
