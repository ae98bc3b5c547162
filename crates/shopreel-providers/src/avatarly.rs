//! Avatarly avatar presenter API adapter.
//!
//! Handles scripted lip-sync clips. Avatarly's API differs from Vireo's in
//! every superficial way (numeric progress as 0.0-1.0 float, `"done"` as the
//! success status, result nested under `clip`), which is exactly why the
//! normalization lives here and nowhere else.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use shopreel_models::GenerationMode;

use crate::adapter::{
    extract_result_url, rejected_from_response, ProviderAdapter, ProviderStatus, SubmitRequest,
};
use crate::error::{ProviderError, ProviderResult};

/// Where Avatarly has put the result URL across API revisions. Ordered, append-only.
const RESULT_URL_PATHS: &[&[&str]] = &[
    &["clip", "download_url"],
    &["clip", "url"],
    &["result_url"],
];

/// Configuration for the Avatarly adapter.
#[derive(Debug, Clone)]
pub struct AvatarlyConfig {
    /// API base URL
    pub base_url: String,
    /// API key sent as `X-Api-Key`
    pub api_key: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl AvatarlyConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("AVATARLY_BASE_URL")
                .unwrap_or_else(|_| "https://api.avatarly.io/v2".to_string()),
            api_key: std::env::var("AVATARLY_API_KEY").unwrap_or_default(),
            timeout: Duration::from_secs(
                std::env::var("AVATARLY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

/// Adapter for the Avatarly presenter API.
pub struct AvatarlyAdapter {
    http: Client,
    config: AvatarlyConfig,
}

impl AvatarlyAdapter {
    /// Create a new adapter.
    pub fn new(config: AvatarlyConfig) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ProviderError::Network)?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Self::new(AvatarlyConfig::from_env())
    }
}

#[async_trait]
impl ProviderAdapter for AvatarlyAdapter {
    fn name(&self) -> &'static str {
        "avatarly"
    }

    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<String> {
        let GenerationMode::LipSync {
            avatar_id,
            script,
            voice_id,
        } = &request.mode
        else {
            return Err(ProviderError::invalid_response(format!(
                "avatarly cannot execute mode {}",
                request.mode
            )));
        };

        let url = format!("{}/clips", self.config.base_url);
        let mut body = json!({
            "avatar_id": avatar_id,
            "script": script,
            "voice_id": voice_id,
        });
        if let (Some(body_map), Some(extra)) =
            (body.as_object_mut(), request.provider_params.as_object())
        {
            for (k, v) in extra {
                body_map.insert(k.clone(), v.clone());
            }
        }

        debug!(avatar_id = %avatar_id, "Submitting Avatarly clip");

        let response = self
            .http
            .post(&url)
            .header("X-Api-Key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(rejected_from_response(response).await);
        }

        let payload: Value = response.json().await?;
        payload
            .get("clip_id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ProviderError::invalid_response("submit response missing clip_id"))
    }

    async fn poll(&self, task_id: &str) -> ProviderResult<ProviderStatus> {
        let url = format!("{}/clips/{}", self.config.base_url, task_id);

        let response = self
            .http
            .get(&url)
            .header("X-Api-Key", &self.config.api_key)
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

/// Translate Avatarly's status vocabulary and float progress.
fn normalize_status(payload: &Value) -> ProviderResult<ProviderStatus> {
    let raw_status = payload
        .get("state")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::invalid_response("poll response missing state"))?;

    // Avatarly reports progress as a 0.0-1.0 float
    let progress = payload
        .get("progress")
        .and_then(Value::as_f64)
        .map(|p| (p.clamp(0.0, 1.0) * 100.0).round() as u8);

    match raw_status {
        "waiting" | "queued" => Ok(ProviderStatus {
            progress,
            ..ProviderStatus::queued()
        }),
        "done" | "completed" => {
            let url = extract_result_url(payload, RESULT_URL_PATHS).ok_or_else(|| {
                ProviderError::invalid_response("finished clip has no download URL")
            })?;
            Ok(ProviderStatus::succeeded(url))
        }
        "failed" | "rejected" => {
            let message = payload
                .get("failure_reason")
                .and_then(Value::as_str)
                .unwrap_or("clip generation failed");
            Ok(ProviderStatus::failed(message))
        }
        _ => Ok(ProviderStatus::running(progress.unwrap_or(0))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopreel_models::ProviderPhase;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base_url: String) -> AvatarlyAdapter {
        AvatarlyAdapter::new(AvatarlyConfig {
            base_url,
            api_key: "secret".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn lip_sync_request() -> SubmitRequest {
        SubmitRequest::new(GenerationMode::LipSync {
            avatar_id: "ava-9".into(),
            script: "This serum changed my routine.".into(),
            voice_id: Some("warm-f".into()),
        })
    }

    #[tokio::test]
    async fn test_submit_sends_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/clips"))
            .and(header("X-Api-Key", "secret"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"clip_id": "c-5"})))
            .mount(&server)
            .await;

        let task_id = adapter(server.uri()).submit(&lip_sync_request()).await.unwrap();
        assert_eq!(task_id, "c-5");
    }

    #[tokio::test]
    async fn test_submit_rejects_non_lip_sync_mode() {
        let server = MockServer::start().await;
        let request = SubmitRequest::new(GenerationMode::Standard {
            prompt: Some("nope".into()),
            negative_prompt: None,
            image_url: None,
            duration_seconds: 5,
        });

        let err = adapter(server.uri()).submit(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_poll_translates_float_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clips/c-5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": "rendering", "progress": 0.4
            })))
            .mount(&server)
            .await;

        let status = adapter(server.uri()).poll("c-5").await.unwrap();
        assert_eq!(status.phase, ProviderPhase::Running);
        assert_eq!(status.progress, Some(40));
    }

    #[test]
    fn test_normalize_done_state() {
        let payload = json!({"state": "done", "clip": {"download_url": "https://cdn/clip.mp4"}});
        let status = normalize_status(&payload).unwrap();
        assert_eq!(status.phase, ProviderPhase::Succeeded);
        assert_eq!(status.result_url.as_deref(), Some("https://cdn/clip.mp4"));
    }

    #[test]
    fn test_normalize_failed_state_keeps_reason() {
        let payload = json!({"state": "failed", "failure_reason": "script rejected"});
        let status = normalize_status(&payload).unwrap();
        assert_eq!(status.phase, ProviderPhase::Failed);
        assert_eq!(status.error.as_deref(), Some("script rejected"));
    }
}
