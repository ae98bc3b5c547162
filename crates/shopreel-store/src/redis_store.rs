//! Redis-backed record store.
//!
//! Videos and batches are stored as hashes with one field per attribute, so
//! every mutation stays a narrow HSET. Batch counters use HINCRBY: concurrent
//! child completions increment without ever reading first.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tracing::debug;

use shopreel_models::{
    BatchId, BatchItemStatus, BatchJob, BatchJobItem, BatchKind, BatchStatus, GenerationConfig,
    ProviderTaskRef, Video, VideoId, VideoMeta, VideoStatus,
};

use crate::error::{StoreError, StoreResult};
use crate::store::{BatchStore, ItemOutcome, VideoStore};

/// Store configuration.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis URL
    pub redis_url: String,
    /// Key prefix, so several deployments can share one instance
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "shopreel".to_string(),
        }
    }
}

impl RedisStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("STORE_KEY_PREFIX")
                .unwrap_or_else(|_| "shopreel".to_string()),
        }
    }
}

/// Redis-backed implementation of both store traits.
pub struct RedisStore {
    client: redis::Client,
    config: RedisStoreConfig,
}

impl RedisStore {
    /// Create a new store.
    pub fn new(config: RedisStoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(RedisStoreConfig::from_env())
    }

    fn video_key(&self, id: &VideoId) -> String {
        format!("{}:video:{}", self.config.key_prefix, id)
    }

    fn batch_key(&self, id: &BatchId) -> String {
        format!("{}:batch:{}", self.config.key_prefix, id)
    }

    fn items_key(&self, id: &BatchId) -> String {
        format!("{}:batch:{}:items", self.config.key_prefix, id)
    }

    async fn conn(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Read the status field; `None` when the record does not exist.
    async fn read_status(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        id: &VideoId,
    ) -> StoreResult<Option<VideoStatus>> {
        let raw: Option<String> = conn.hget(self.video_key(id), "status").await?;
        match raw {
            Some(s) => Ok(Some(
                VideoStatus::from_str(&s).map_err(StoreError::Serialization)?,
            )),
            None => Ok(None),
        }
    }

    /// Apply a narrow update unless the record is terminal.
    async fn write_unless_terminal(
        &self,
        id: &VideoId,
        fields: Vec<(&'static str, String)>,
    ) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        match self.read_status(&mut conn, id).await? {
            None => return Err(StoreError::not_found(id.as_str())),
            Some(status) if status.is_terminal() => {
                debug!(video_id = %id, status = %status, "Dropping write to terminal record");
                return Ok(());
            }
            Some(_) => {}
        }

        let mut pairs = fields;
        pairs.push(("updated_at", Utc::now().to_rfc3339()));
        conn.hset_multiple::<_, _, _, ()>(self.video_key(id), &pairs)
            .await?;
        Ok(())
    }
}

fn video_to_pairs(video: &Video) -> StoreResult<Vec<(&'static str, String)>> {
    let mut pairs = vec![
        ("user_id", video.user_id.clone()),
        ("product_id", video.product_id.clone()),
        ("status", video.status.as_str().to_string()),
        ("progress", video.progress.to_string()),
        ("progress_message", video.progress_message.clone()),
        (
            "generation_config",
            serde_json::to_string(&video.generation_config)?,
        ),
        ("metadata", serde_json::to_string(&video.metadata)?),
        ("created_at", video.created_at.to_rfc3339()),
        ("updated_at", video.updated_at.to_rfc3339()),
    ];
    if let Some(url) = &video.remote_url {
        pairs.push(("remote_url", url.clone()));
    }
    if let Some(duration) = video.duration_seconds {
        pairs.push(("duration_seconds", duration.to_string()));
    }
    if let Some(error) = &video.error_message {
        pairs.push(("error_message", error.clone()));
    }
    Ok(pairs)
}

fn video_from_map(
    id: &VideoId,
    map: std::collections::HashMap<String, String>,
) -> StoreResult<Video> {
    let get = |key: &str| -> StoreResult<String> {
        map.get(key)
            .cloned()
            .ok_or_else(|| StoreError::Serialization(format!("video {id} missing field {key}")))
    };

    let generation_config: GenerationConfig = serde_json::from_str(&get("generation_config")?)?;
    let metadata: VideoMeta = map
        .get("metadata")
        .map(|m| serde_json::from_str(m))
        .transpose()?
        .unwrap_or_default();

    Ok(Video {
        id: id.clone(),
        user_id: get("user_id")?,
        product_id: get("product_id")?,
        status: VideoStatus::from_str(&get("status")?).map_err(StoreError::Serialization)?,
        progress: get("progress")?.parse().unwrap_or(0),
        progress_message: map.get("progress_message").cloned().unwrap_or_default(),
        remote_url: map.get("remote_url").cloned(),
        duration_seconds: map.get("duration_seconds").and_then(|d| d.parse().ok()),
        generation_config,
        metadata,
        error_message: map.get("error_message").cloned(),
        created_at: parse_time(&get("created_at")?)?,
        updated_at: parse_time(&get("updated_at")?)?,
    })
}

fn parse_time(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp {raw}: {e}")))
}

#[async_trait]
impl VideoStore for RedisStore {
    async fn create_video(&self, video: &Video) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let pairs = video_to_pairs(video)?;
        conn.hset_multiple::<_, _, _, ()>(self.video_key(&video.id), &pairs)
            .await?;
        debug!(video_id = %video.id, "Created video record");
        Ok(())
    }

    async fn get_video(&self, id: &VideoId) -> StoreResult<Option<Video>> {
        let mut conn = self.conn().await?;
        let map: std::collections::HashMap<String, String> =
            conn.hgetall(self.video_key(id)).await?;
        if map.is_empty() {
            return Ok(None);
        }
        Ok(Some(video_from_map(id, map)?))
    }

    async fn get_status(&self, id: &VideoId) -> StoreResult<Option<VideoStatus>> {
        let mut conn = self.conn().await?;
        self.read_status(&mut conn, id).await
    }

    async fn mark_generating(&self, id: &VideoId) -> StoreResult<()> {
        self.write_unless_terminal(id, vec![("status", "generating".to_string())])
            .await
    }

    async fn mark_processing(&self, id: &VideoId) -> StoreResult<()> {
        self.write_unless_terminal(id, vec![("status", "processing".to_string())])
            .await
    }

    async fn set_task_ref(&self, id: &VideoId, task: &ProviderTaskRef) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.hget(self.video_key(id), "generation_config").await?;
        let raw = raw.ok_or_else(|| StoreError::not_found(id.as_str()))?;
        let mut config: GenerationConfig = serde_json::from_str(&raw)?;
        config.task = Some(task.clone());

        self.write_unless_terminal(
            id,
            vec![("generation_config", serde_json::to_string(&config)?)],
        )
        .await
    }

    async fn publish_progress(
        &self,
        id: &VideoId,
        progress: u8,
        message: &str,
    ) -> StoreResult<()> {
        self.write_unless_terminal(
            id,
            vec![
                ("progress", progress.min(100).to_string()),
                ("progress_message", message.to_string()),
            ],
        )
        .await
    }

    async fn mark_ready(
        &self,
        id: &VideoId,
        remote_url: &str,
        duration_seconds: Option<f64>,
    ) -> StoreResult<()> {
        let mut fields = vec![
            ("status", "ready".to_string()),
            ("progress", "100".to_string()),
            ("progress_message", "complete".to_string()),
            ("remote_url", remote_url.to_string()),
        ];
        if let Some(duration) = duration_seconds {
            fields.push(("duration_seconds", duration.to_string()));
        }
        self.write_unless_terminal(id, fields).await
    }

    async fn mark_failed(&self, id: &VideoId, error: &str) -> StoreResult<()> {
        self.write_unless_terminal(
            id,
            vec![
                ("status", "failed".to_string()),
                ("error_message", error.to_string()),
            ],
        )
        .await
    }

    async fn mark_cancelled(&self, id: &VideoId) -> StoreResult<()> {
        self.write_unless_terminal(id, vec![("status", "cancelled".to_string())])
            .await
    }

    async fn update_metadata(&self, id: &VideoId, meta: &VideoMeta) -> StoreResult<()> {
        // Metadata writes accompany an in-flight run; terminal guard applies
        self.write_unless_terminal(id, vec![("metadata", serde_json::to_string(meta)?)])
            .await
    }
}

#[async_trait]
impl BatchStore for RedisStore {
    async fn create_batch(&self, batch: &BatchJob, items: &[BatchJobItem]) -> StoreResult<()> {
        let mut conn = self.conn().await?;

        let pairs = [
            ("user_id", batch.user_id.clone()),
            ("kind", batch.kind.as_str().to_string()),
            ("total_count", batch.total_count.to_string()),
            ("completed_count", batch.completed_count.to_string()),
            ("failed_count", batch.failed_count.to_string()),
            ("status", batch.status.as_str().to_string()),
            ("created_at", batch.created_at.to_rfc3339()),
            ("updated_at", batch.updated_at.to_rfc3339()),
        ];
        conn.hset_multiple::<_, _, _, ()>(self.batch_key(&batch.id), &pairs)
            .await?;

        let mut item_pairs = Vec::with_capacity(items.len());
        for item in items {
            item_pairs.push((item.item_index.to_string(), serde_json::to_string(item)?));
        }
        if !item_pairs.is_empty() {
            conn.hset_multiple::<_, _, _, ()>(self.items_key(&batch.id), &item_pairs)
                .await?;
        }

        debug!(batch_id = %batch.id, items = items.len(), "Created batch record");
        Ok(())
    }

    async fn get_batch(&self, id: &BatchId) -> StoreResult<Option<BatchJob>> {
        let mut conn = self.conn().await?;
        let map: std::collections::HashMap<String, String> =
            conn.hgetall(self.batch_key(id)).await?;
        if map.is_empty() {
            return Ok(None);
        }

        let get = |key: &str| -> StoreResult<String> {
            map.get(key)
                .cloned()
                .ok_or_else(|| StoreError::Serialization(format!("batch {id} missing field {key}")))
        };

        Ok(Some(BatchJob {
            id: id.clone(),
            user_id: get("user_id")?,
            kind: match get("kind")?.as_str() {
                "variants" => BatchKind::Variants,
                _ => BatchKind::Batch,
            },
            total_count: get("total_count")?.parse().unwrap_or(0),
            completed_count: get("completed_count")?.parse().unwrap_or(0),
            failed_count: get("failed_count")?.parse().unwrap_or(0),
            status: BatchStatus::from_str(&get("status")?).map_err(StoreError::Serialization)?,
            created_at: parse_time(&get("created_at")?)?,
            updated_at: parse_time(&get("updated_at")?)?,
        }))
    }

    async fn get_items(&self, id: &BatchId) -> StoreResult<Vec<BatchJobItem>> {
        let mut conn = self.conn().await?;
        let map: std::collections::HashMap<String, String> =
            conn.hgetall(self.items_key(id)).await?;

        let mut items = Vec::with_capacity(map.len());
        for raw in map.values() {
            items.push(serde_json::from_str::<BatchJobItem>(raw)?);
        }
        items.sort_by_key(|i| i.item_index);
        Ok(items)
    }

    async fn mark_batch_processing(&self, id: &BatchId) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.hset_multiple::<_, _, _, ()>(
            self.batch_key(id),
            &[
                ("status", BatchStatus::Processing.as_str().to_string()),
                ("updated_at", Utc::now().to_rfc3339()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn mark_item_processing(
        &self,
        id: &BatchId,
        item_index: u32,
        video_id: &VideoId,
    ) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.hget(self.items_key(id), item_index.to_string()).await?;
        let raw = raw.ok_or_else(|| StoreError::not_found(format!("{}#{}", id, item_index)))?;
        let mut item: BatchJobItem = serde_json::from_str(&raw)?;
        item.status = BatchItemStatus::Processing;
        item.video_id = Some(video_id.clone());
        conn.hset::<_, _, _, ()>(
            self.items_key(id),
            item_index.to_string(),
            serde_json::to_string(&item)?,
        )
        .await?;
        Ok(())
    }

    async fn record_item_outcome(
        &self,
        id: &BatchId,
        item_index: u32,
        outcome: ItemOutcome,
    ) -> StoreResult<BatchJob> {
        let mut conn = self.conn().await?;

        // Item CAS: exactly one worker owns this item, so a plain read-write
        // is safe here; the terminal check guards against queue redelivery.
        let raw: Option<String> = conn.hget(self.items_key(id), item_index.to_string()).await?;
        let raw = raw.ok_or_else(|| StoreError::not_found(format!("{}#{}", id, item_index)))?;
        let mut item: BatchJobItem = serde_json::from_str(&raw)?;
        if item.status.is_terminal() {
            return self
                .get_batch(id)
                .await?
                .ok_or_else(|| StoreError::not_found(id.as_str()));
        }

        let counter_field = match &outcome {
            ItemOutcome::Completed => {
                item.status = BatchItemStatus::Completed;
                "completed_count"
            }
            ItemOutcome::Failed(message) => {
                item.status = BatchItemStatus::Failed;
                item.error_message = Some(message.clone());
                "failed_count"
            }
        };

        conn.hset::<_, _, _, ()>(
            self.items_key(id),
            item_index.to_string(),
            serde_json::to_string(&item)?,
        )
        .await?;

        // The cross-worker hot spot: increment-by-one, never read-modify-write
        let _new_count: u32 = conn.hincr(self.batch_key(id), counter_field, 1u32).await?;
        conn.hset::<_, _, _, ()>(self.batch_key(id), "updated_at", Utc::now().to_rfc3339())
            .await?;

        self.get_batch(id)
            .await?
            .ok_or_else(|| StoreError::not_found(id.as_str()))
    }

    async fn finalize_batch(&self, id: &BatchId, status: BatchStatus) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.hset_multiple::<_, _, _, ()>(
            self.batch_key(id),
            &[
                ("status", status.as_str().to_string()),
                ("updated_at", Utc::now().to_rfc3339()),
            ],
        )
        .await?;
        Ok(())
    }
}
