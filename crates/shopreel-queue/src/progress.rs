//! Progress events via Redis Pub/Sub.
//!
//! Record writes are the source of truth; these events are the live channel
//! the dashboard subscribes to so it can refresh without re-polling.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use shopreel_models::VideoId;

use crate::error::QueueResult;

/// Progress event published to Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Video the event belongs to
    pub video_id: VideoId,
    /// UI progress (0-100)
    pub progress: u8,
    /// Human-readable phase label
    pub message: String,
    /// Status string, present on status transitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Channel for publishing/subscribing to progress events.
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a video.
    pub fn channel_name(video_id: &VideoId) -> String {
        format!("progress:{}", video_id)
    }

    /// Publish a progress event.
    pub async fn publish(&self, event: &ProgressEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.video_id);
        let payload = serde_json::to_string(event)?;

        debug!("Publishing progress event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Publish a progress update.
    pub async fn progress(
        &self,
        video_id: &VideoId,
        progress: u8,
        message: impl Into<String>,
    ) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            video_id: video_id.clone(),
            progress,
            message: message.into(),
            status: None,
        })
        .await
    }

    /// Publish a status transition.
    pub async fn status(
        &self,
        video_id: &VideoId,
        status: impl Into<String>,
        progress: u8,
        message: impl Into<String>,
    ) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            video_id: video_id.clone(),
            progress,
            message: message.into(),
            status: Some(status.into()),
        })
        .await
    }

    /// Subscribe to progress events for a video.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        video_id: &VideoId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ProgressEvent> + Send>>>
    {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::channel_name(video_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}
