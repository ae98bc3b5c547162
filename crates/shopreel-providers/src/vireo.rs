//! Vireo generative video API adapter.
//!
//! Covers every generative mode (text/image to video, style transfer,
//! background replace, inpaint, extend, motion reference, composite).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shopreel_models::GenerationMode;

use crate::adapter::{
    extract_result_url, rejected_from_response, ProviderAdapter, ProviderStatus, SubmitRequest,
};
use crate::error::{ProviderError, ProviderResult};

/// Where Vireo has put the result URL across API revisions. Ordered, append-only.
const RESULT_URL_PATHS: &[&[&str]] = &[
    &["data", "video_url"],
    &["data", "result", "video_url"],
    &["data", "works", "0", "resource", "resource"],
    &["video_url"],
];

/// Configuration for the Vireo adapter.
#[derive(Debug, Clone)]
pub struct VireoConfig {
    /// API base URL
    pub base_url: String,
    /// Bearer token
    pub api_key: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl VireoConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("VIREO_BASE_URL")
                .unwrap_or_else(|_| "https://api.vireo.ai/v1".to_string()),
            api_key: std::env::var("VIREO_API_KEY").unwrap_or_default(),
            timeout: Duration::from_secs(
                std::env::var("VIREO_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

/// Adapter for the Vireo generation API.
pub struct VireoAdapter {
    http: Client,
    config: VireoConfig,
}

impl VireoAdapter {
    /// Create a new adapter.
    pub fn new(config: VireoConfig) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ProviderError::Network)?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Self::new(VireoConfig::from_env())
    }

    fn endpoint(&self, mode: &GenerationMode) -> String {
        let path = match mode {
            GenerationMode::Standard { .. } => "generations",
            GenerationMode::StyleTransfer { .. } => "edits/style",
            GenerationMode::BackgroundReplace { .. } => "edits/background",
            GenerationMode::Inpaint { .. } => "edits/inpaint",
            GenerationMode::Extend { .. } => "generations/extend",
            GenerationMode::MotionReference { .. } => "generations/motion",
            GenerationMode::Composite { .. } => "generations/composite",
            // Routed to Avatarly by the caller; never reaches this adapter
            GenerationMode::LipSync { .. } => "generations",
        };
        format!("{}/{}", self.config.base_url, path)
    }

    fn request_body(&self, request: &SubmitRequest) -> Value {
        let mut body = match &request.mode {
            GenerationMode::Standard {
                prompt,
                negative_prompt,
                image_url,
                duration_seconds,
            } => json!({
                "prompt": prompt,
                "negative_prompt": negative_prompt,
                "image_url": image_url,
                "duration": duration_seconds,
            }),
            GenerationMode::StyleTransfer {
                source_url,
                style_prompt,
                duration_seconds,
            } => json!({
                "source_url": source_url,
                "style_prompt": style_prompt,
                "duration": duration_seconds,
            }),
            GenerationMode::BackgroundReplace {
                source_url,
                background_prompt,
            } => json!({
                "source_url": source_url,
                "background_prompt": background_prompt,
            }),
            GenerationMode::Inpaint {
                source_url,
                mask_url,
                prompt,
            } => json!({
                "source_url": source_url,
                "mask_url": mask_url,
                "prompt": prompt,
            }),
            GenerationMode::Extend {
                source_task_id,
                prompt,
                duration_seconds,
            } => json!({
                "source_task_id": source_task_id,
                "prompt": prompt,
                "duration": duration_seconds,
            }),
            GenerationMode::MotionReference {
                image_url,
                motion_url,
            } => json!({
                "image_url": image_url,
                "motion_url": motion_url,
            }),
            GenerationMode::Composite {
                element_urls,
                prompt,
            } => json!({
                "elements": element_urls,
                "prompt": prompt,
            }),
            GenerationMode::LipSync { .. } => Value::Null,
        };

        // Vendor-specific knobs ride along untouched
        if let (Some(body_map), Some(extra)) =
            (body.as_object_mut(), request.provider_params.as_object())
        {
            for (k, v) in extra {
                body_map.insert(k.clone(), v.clone());
            }
        }

        body
    }
}

#[async_trait]
impl ProviderAdapter for VireoAdapter {
    fn name(&self) -> &'static str {
        "vireo"
    }

    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<String> {
        let url = self.endpoint(&request.mode);
        let body = self.request_body(request);

        debug!(mode = %request.mode, "Submitting Vireo task to {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(rejected_from_response(response).await);
        }

        let payload: Value = response.json().await?;
        payload
            .pointer("/data/task_id")
            .or_else(|| payload.get("task_id"))
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ProviderError::invalid_response("submit response missing task_id"))
    }

    async fn poll(&self, task_id: &str) -> ProviderResult<ProviderStatus> {
        let url = format!("{}/tasks/{}", self.config.base_url, task_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::unavailable(e.to_string()))?;

        if response.status().is_server_error() {
            return Err(ProviderError::unavailable(format!(
                "poll returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(ProviderError::invalid_response(format!(
                "poll returned {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await?;
        normalize_status(&payload)
    }
}

/// Translate Vireo's raw status vocabulary into the normalized phase.
///
/// The vendor has shipped `"submitted"`, `"queued"`, `"processing"`,
/// `"succeed"` and `"completed"` for what our state machine considers two
/// phases; treat unknown strings as still-running rather than failing the
/// poll, so a vocabulary addition on their side degrades gracefully.
fn normalize_status(payload: &Value) -> ProviderResult<ProviderStatus> {
    let raw_status = payload
        .pointer("/data/status")
        .or_else(|| payload.get("status"))
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::invalid_response("poll response missing status"))?;

    let progress = payload
        .pointer("/data/progress")
        .or_else(|| payload.get("progress"))
        .and_then(Value::as_u64)
        .map(|p| p.min(100) as u8);

    match raw_status {
        "submitted" | "queued" | "pending" => Ok(ProviderStatus {
            progress,
            ..ProviderStatus::queued()
        }),
        "succeed" | "succeeded" | "completed" => {
            let url = extract_result_url(payload, RESULT_URL_PATHS).ok_or_else(|| {
                ProviderError::invalid_response("succeeded task has no result URL")
            })?;
            Ok(ProviderStatus::succeeded(url))
        }
        "failed" | "error" => {
            let message = payload
                .pointer("/data/error")
                .or_else(|| payload.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("generation failed");
            Ok(ProviderStatus::failed(message))
        }
        other => {
            if !matches!(other, "processing" | "running") {
                warn!("Unknown Vireo status '{}', treating as running", other);
            }
            Ok(ProviderStatus::running(progress.unwrap_or(0)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopreel_models::ProviderPhase;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base_url: String) -> VireoAdapter {
        VireoAdapter::new(VireoConfig {
            base_url,
            api_key: "test-key".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn standard_request() -> SubmitRequest {
        SubmitRequest::new(GenerationMode::Standard {
            prompt: Some("sneaker hero shot".into()),
            negative_prompt: None,
            image_url: None,
            duration_seconds: 5,
        })
    }

    #[tokio::test]
    async fn test_submit_returns_task_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generations"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"task_id": "t-1"}})),
            )
            .mount(&server)
            .await;

        let task_id = adapter(server.uri()).submit(&standard_request()).await.unwrap();
        assert_eq!(task_id, "t-1");
    }

    #[tokio::test]
    async fn test_submit_rejection_keeps_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generations"))
            .respond_with(ResponseTemplate::new(422).set_body_string("prompt too long"))
            .mount(&server)
            .await;

        let err = adapter(server.uri()).submit(&standard_request()).await.unwrap_err();
        match err {
            ProviderError::Rejected { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(body, "prompt too long");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_poll_normalizes_vendor_vocabulary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks/t-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"status": "succeed", "works": [{"resource": {"resource": "https://cdn/v.mp4"}}]}
            })))
            .mount(&server)
            .await;

        let status = adapter(server.uri()).poll("t-1").await.unwrap();
        assert_eq!(status.phase, ProviderPhase::Succeeded);
        assert_eq!(status.result_url.as_deref(), Some("https://cdn/v.mp4"));
    }

    #[tokio::test]
    async fn test_poll_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks/t-1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = adapter(server.uri()).poll("t-1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_normalize_unknown_status_is_running() {
        let payload = json!({"data": {"status": "warming_up", "progress": 12}});
        let status = normalize_status(&payload).unwrap();
        assert_eq!(status.phase, ProviderPhase::Running);
        assert_eq!(status.progress, Some(12));
    }
}
