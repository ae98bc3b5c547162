//! Status publication.
//!
//! One `StatusPublisher` exists per owned Video for the duration of a job.
//! It clamps published progress to be non-decreasing: providers occasionally
//! report a lower percentage than before, and the record's invariant says
//! progress never moves backwards while the video is active.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::warn;

use shopreel_models::VideoId;
use shopreel_queue::ProgressChannel;
use shopreel_store::VideoStore;

use crate::error::WorkerResult;

/// Publishes `{progress, message}` pairs for one Video.
pub struct StatusPublisher {
    store: Arc<dyn VideoStore>,
    events: Option<Arc<ProgressChannel>>,
    video_id: VideoId,
    last_progress: AtomicU8,
}

impl StatusPublisher {
    /// Create a publisher for one Video.
    pub fn new(
        store: Arc<dyn VideoStore>,
        events: Option<Arc<ProgressChannel>>,
        video_id: VideoId,
    ) -> Self {
        Self {
            store,
            events,
            video_id,
            last_progress: AtomicU8::new(0),
        }
    }

    /// The Video this publisher writes to.
    pub fn video_id(&self) -> &VideoId {
        &self.video_id
    }

    /// Publish a progress value, clamped to be non-decreasing.
    ///
    /// The record write is authoritative; the pub/sub event is best-effort
    /// and a failure there only logs.
    pub async fn publish(&self, progress: u8, message: &str) -> WorkerResult<()> {
        let progress = progress.min(100);
        let clamped = self.last_progress.fetch_max(progress, Ordering::SeqCst).max(progress);

        self.store
            .publish_progress(&self.video_id, clamped, message)
            .await?;

        if let Some(events) = &self.events {
            if let Err(e) = events.progress(&self.video_id, clamped, message).await {
                warn!(video_id = %self.video_id, "Failed to publish progress event: {}", e);
            }
        }

        Ok(())
    }

    /// Last progress value published through this publisher.
    pub fn last_progress(&self) -> u8 {
        self.last_progress.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopreel_models::{GenerationConfig, GenerationMode, Video};
    use shopreel_store::MemoryStore;

    fn video() -> Video {
        Video::new(
            "user-1",
            "prod-1",
            GenerationConfig::new(GenerationMode::Standard {
                prompt: Some("demo".into()),
                negative_prompt: None,
                image_url: None,
                duration_seconds: 5,
            }),
        )
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let store = Arc::new(MemoryStore::new());
        let v = video();
        store.create_video(&v).await.unwrap();
        store.mark_generating(&v.id).await.unwrap();

        let publisher = StatusPublisher::new(store.clone(), None, v.id.clone());
        publisher.publish(40, "generating").await.unwrap();
        publisher.publish(25, "generating").await.unwrap();

        let stored = store.get_video(&v.id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 40);
        assert_eq!(publisher.last_progress(), 40);

        publisher.publish(60, "rendering").await.unwrap();
        let stored = store.get_video(&v.id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 60);
    }
}
