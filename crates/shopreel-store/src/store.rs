//! Store traits.

use async_trait::async_trait;

use shopreel_models::{
    BatchId, BatchJob, BatchJobItem, BatchStatus, ProviderTaskRef, Video, VideoId, VideoMeta,
    VideoStatus,
};

use crate::error::StoreResult;

/// Terminal outcome of one fan-out child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed,
    Failed(String),
}

/// Access to persisted Video records.
///
/// Every mutation is a narrow update keyed by id. Implementations must
/// treat terminal records as read-only: once a Video is `cancelled` (or any
/// other terminal status), progress/status writes are silently dropped.
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Persist a freshly created record.
    async fn create_video(&self, video: &Video) -> StoreResult<()>;

    /// Fetch a full record.
    async fn get_video(&self, id: &VideoId) -> StoreResult<Option<Video>>;

    /// Fetch just the status (the cancellation-check read).
    async fn get_status(&self, id: &VideoId) -> StoreResult<Option<VideoStatus>>;

    /// Flip the record to `generating`.
    async fn mark_generating(&self, id: &VideoId) -> StoreResult<()>;

    /// Flip the record to `processing`.
    async fn mark_processing(&self, id: &VideoId) -> StoreResult<()>;

    /// Record the submitted provider task handle.
    async fn set_task_ref(&self, id: &VideoId, task: &ProviderTaskRef) -> StoreResult<()>;

    /// Publish a `{progress, message}` pair.
    ///
    /// Dropped without error when the record is already terminal.
    async fn publish_progress(&self, id: &VideoId, progress: u8, message: &str)
        -> StoreResult<()>;

    /// Flip to `ready` with the finished artifact; sets progress to 100.
    async fn mark_ready(
        &self,
        id: &VideoId,
        remote_url: &str,
        duration_seconds: Option<f64>,
    ) -> StoreResult<()>;

    /// Flip to `failed`, freezing progress at its last value.
    async fn mark_failed(&self, id: &VideoId, error: &str) -> StoreResult<()>;

    /// User-initiated cancellation. Terminal; later writes are dropped.
    async fn mark_cancelled(&self, id: &VideoId) -> StoreResult<()>;

    /// Replace the technical metadata blob.
    async fn update_metadata(&self, id: &VideoId, meta: &VideoMeta) -> StoreResult<()>;
}

/// Access to persisted Batch records and their items.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Persist a parent record together with all of its items.
    async fn create_batch(&self, batch: &BatchJob, items: &[BatchJobItem]) -> StoreResult<()>;

    /// Fetch a parent record.
    async fn get_batch(&self, id: &BatchId) -> StoreResult<Option<BatchJob>>;

    /// Fetch all items of a batch, ordered by `item_index`.
    async fn get_items(&self, id: &BatchId) -> StoreResult<Vec<BatchJobItem>>;

    /// Flip the parent to `processing` once children are enqueued.
    async fn mark_batch_processing(&self, id: &BatchId) -> StoreResult<()>;

    /// Attach a child's Video and flip the item to `processing`.
    async fn mark_item_processing(
        &self,
        id: &BatchId,
        item_index: u32,
        video_id: &VideoId,
    ) -> StoreResult<()>;

    /// Record one child's terminal outcome.
    ///
    /// Sets the item terminal and increments exactly one parent counter via
    /// an atomic increment (never read-modify-write). A repeated call for an
    /// already-terminal item is a no-op. Returns the parent as observed
    /// after the increment.
    async fn record_item_outcome(
        &self,
        id: &BatchId,
        item_index: u32,
        outcome: ItemOutcome,
    ) -> StoreResult<BatchJob>;

    /// Flip the parent to its terminal status. Idempotent.
    async fn finalize_batch(&self, id: &BatchId, status: BatchStatus) -> StoreResult<()>;
}
