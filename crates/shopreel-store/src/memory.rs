//! In-memory store for tests and local development.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use shopreel_models::{
    BatchId, BatchItemStatus, BatchJob, BatchJobItem, BatchStatus, ProviderTaskRef, Video, VideoId,
    VideoMeta, VideoStatus,
};

use crate::error::{StoreError, StoreResult};
use crate::store::{BatchStore, ItemOutcome, VideoStore};

/// Hash-map backed store with the same write semantics as `RedisStore`.
#[derive(Default)]
pub struct MemoryStore {
    videos: Mutex<HashMap<VideoId, Video>>,
    batches: Mutex<HashMap<BatchId, BatchJob>>,
    items: Mutex<HashMap<BatchId, Vec<BatchJobItem>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_video<T>(
        &self,
        id: &VideoId,
        f: impl FnOnce(&mut Video) -> T,
    ) -> StoreResult<T> {
        let mut videos = self.videos.lock().expect("video lock poisoned");
        let video = videos
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        Ok(f(video))
    }
}

#[async_trait]
impl VideoStore for MemoryStore {
    async fn create_video(&self, video: &Video) -> StoreResult<()> {
        self.videos
            .lock()
            .expect("video lock poisoned")
            .insert(video.id.clone(), video.clone());
        Ok(())
    }

    async fn get_video(&self, id: &VideoId) -> StoreResult<Option<Video>> {
        Ok(self.videos.lock().expect("video lock poisoned").get(id).cloned())
    }

    async fn get_status(&self, id: &VideoId) -> StoreResult<Option<VideoStatus>> {
        Ok(self
            .videos
            .lock()
            .expect("video lock poisoned")
            .get(id)
            .map(|v| v.status))
    }

    async fn mark_generating(&self, id: &VideoId) -> StoreResult<()> {
        self.with_video(id, |v| {
            if !v.status.is_terminal() {
                v.status = VideoStatus::Generating;
                v.updated_at = Utc::now();
            }
        })
    }

    async fn mark_processing(&self, id: &VideoId) -> StoreResult<()> {
        self.with_video(id, |v| {
            if !v.status.is_terminal() {
                v.status = VideoStatus::Processing;
                v.updated_at = Utc::now();
            }
        })
    }

    async fn set_task_ref(&self, id: &VideoId, task: &ProviderTaskRef) -> StoreResult<()> {
        self.with_video(id, |v| {
            v.generation_config.task = Some(task.clone());
            v.updated_at = Utc::now();
        })
    }

    async fn publish_progress(
        &self,
        id: &VideoId,
        progress: u8,
        message: &str,
    ) -> StoreResult<()> {
        self.with_video(id, |v| {
            if v.status.is_terminal() {
                return;
            }
            v.progress = progress.min(100);
            v.progress_message = message.to_string();
            v.updated_at = Utc::now();
        })
    }

    async fn mark_ready(
        &self,
        id: &VideoId,
        remote_url: &str,
        duration_seconds: Option<f64>,
    ) -> StoreResult<()> {
        self.with_video(id, |v| {
            if v.status.is_terminal() {
                return;
            }
            v.status = VideoStatus::Ready;
            v.progress = 100;
            v.progress_message = "complete".to_string();
            v.remote_url = Some(remote_url.to_string());
            if duration_seconds.is_some() {
                v.duration_seconds = duration_seconds;
            }
            v.updated_at = Utc::now();
        })
    }

    async fn mark_failed(&self, id: &VideoId, error: &str) -> StoreResult<()> {
        self.with_video(id, |v| {
            if v.status.is_terminal() {
                return;
            }
            v.status = VideoStatus::Failed;
            v.error_message = Some(error.to_string());
            v.updated_at = Utc::now();
        })
    }

    async fn mark_cancelled(&self, id: &VideoId) -> StoreResult<()> {
        self.with_video(id, |v| {
            if v.status.is_terminal() {
                return;
            }
            v.status = VideoStatus::Cancelled;
            v.updated_at = Utc::now();
        })
    }

    async fn update_metadata(&self, id: &VideoId, meta: &VideoMeta) -> StoreResult<()> {
        self.with_video(id, |v| {
            v.metadata = meta.clone();
            v.updated_at = Utc::now();
        })
    }
}

#[async_trait]
impl BatchStore for MemoryStore {
    async fn create_batch(&self, batch: &BatchJob, items: &[BatchJobItem]) -> StoreResult<()> {
        self.batches
            .lock()
            .expect("batch lock poisoned")
            .insert(batch.id.clone(), batch.clone());
        self.items
            .lock()
            .expect("item lock poisoned")
            .insert(batch.id.clone(), items.to_vec());
        Ok(())
    }

    async fn get_batch(&self, id: &BatchId) -> StoreResult<Option<BatchJob>> {
        Ok(self.batches.lock().expect("batch lock poisoned").get(id).cloned())
    }

    async fn get_items(&self, id: &BatchId) -> StoreResult<Vec<BatchJobItem>> {
        Ok(self
            .items
            .lock()
            .expect("item lock poisoned")
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_batch_processing(&self, id: &BatchId) -> StoreResult<()> {
        let mut batches = self.batches.lock().expect("batch lock poisoned");
        let batch = batches
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        if !batch.status.is_terminal() {
            batch.status = BatchStatus::Processing;
            batch.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_item_processing(
        &self,
        id: &BatchId,
        item_index: u32,
        video_id: &VideoId,
    ) -> StoreResult<()> {
        let mut items = self.items.lock().expect("item lock poisoned");
        let item = items
            .get_mut(id)
            .and_then(|v| v.iter_mut().find(|i| i.item_index == item_index))
            .ok_or_else(|| StoreError::not_found(format!("{}#{}", id, item_index)))?;
        item.status = BatchItemStatus::Processing;
        item.video_id = Some(video_id.clone());
        Ok(())
    }

    async fn record_item_outcome(
        &self,
        id: &BatchId,
        item_index: u32,
        outcome: ItemOutcome,
    ) -> StoreResult<BatchJob> {
        // Item first: a repeated call for an already-terminal item must not
        // increment the parent a second time.
        {
            let mut items = self.items.lock().expect("item lock poisoned");
            let item = items
                .get_mut(id)
                .and_then(|v| v.iter_mut().find(|i| i.item_index == item_index))
                .ok_or_else(|| StoreError::not_found(format!("{}#{}", id, item_index)))?;
            if item.status.is_terminal() {
                let batches = self.batches.lock().expect("batch lock poisoned");
                return batches
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::not_found(id.as_str()));
            }
            match &outcome {
                ItemOutcome::Completed => item.status = BatchItemStatus::Completed,
                ItemOutcome::Failed(message) => {
                    item.status = BatchItemStatus::Failed;
                    item.error_message = Some(message.clone());
                }
            }
        }

        let mut batches = self.batches.lock().expect("batch lock poisoned");
        let batch = batches
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        match outcome {
            ItemOutcome::Completed => batch.completed_count += 1,
            ItemOutcome::Failed(_) => batch.failed_count += 1,
        }
        batch.updated_at = Utc::now();
        Ok(batch.clone())
    }

    async fn finalize_batch(&self, id: &BatchId, status: BatchStatus) -> StoreResult<()> {
        let mut batches = self.batches.lock().expect("batch lock poisoned");
        let batch = batches
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        batch.status = status;
        batch.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopreel_models::{BatchKind, GenerationConfig, GenerationMode};

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
    async fn test_cancelled_record_drops_later_writes() {
        let store = MemoryStore::new();
        let v = video();
        store.create_video(&v).await.unwrap();

        store.mark_cancelled(&v.id).await.unwrap();
        store.publish_progress(&v.id, 40, "generating").await.unwrap();
        store.mark_ready(&v.id, "https://cdn/out.mp4", None).await.unwrap();

        let stored = store.get_video(&v.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VideoStatus::Cancelled);
        assert_eq!(stored.progress, 0);
        assert!(stored.remote_url.is_none());
    }

    #[tokio::test]
    async fn test_ready_sets_progress_and_url() {
        let store = MemoryStore::new();
        let v = video();
        store.create_video(&v).await.unwrap();

        store.mark_generating(&v.id).await.unwrap();
        store.publish_progress(&v.id, 40, "generating").await.unwrap();
        store
            .mark_ready(&v.id, "https://cdn/out.mp4", Some(5.0))
            .await
            .unwrap();

        let stored = store.get_video(&v.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VideoStatus::Ready);
        assert_eq!(stored.progress, 100);
        assert_eq!(stored.remote_url.as_deref(), Some("https://cdn/out.mp4"));
    }

    #[tokio::test]
    async fn test_repeated_item_outcome_counts_once() {
        let store = MemoryStore::new();
        let batch = BatchJob::new("user-1", BatchKind::Batch, 2);
        let items = vec![
            BatchJobItem::new(batch.id.clone(), 0, standard_mode()),
            BatchJobItem::new(batch.id.clone(), 1, standard_mode()),
        ];
        store.create_batch(&batch, &items).await.unwrap();

        let after = store
            .record_item_outcome(&batch.id, 0, ItemOutcome::Completed)
            .await
            .unwrap();
        assert_eq!(after.completed_count, 1);

        // Redelivered notification for the same child: no double count
        let after = store
            .record_item_outcome(&batch.id, 0, ItemOutcome::Completed)
            .await
            .unwrap();
        assert_eq!(after.completed_count, 1);
        assert_eq!(after.failed_count, 0);
    }

    fn standard_mode() -> GenerationMode {
        GenerationMode::Standard {
            prompt: Some("demo".into()),
            negative_prompt: None,
            image_url: None,
            duration_seconds: 5,
        }
    }
}
