//! Fan-out controller.
//!
//! Turns one request for N outcomes into N independent child jobs plus one
//! parent aggregate record, then folds terminal child notifications back
//! into the parent's counters.

use std::sync::Arc;

use tracing::info;

use shopreel_models::{
    BatchId, BatchJob, BatchJobItem, FanoutRequest, GenerationConfig, GenerationMode, Video,
    VideoId,
};
use shopreel_queue::{ExpandBatchJob, GenerateVideoJob, QueueJob};
use shopreel_store::{BatchStore, ItemOutcome, VideoStore};

use crate::context::JobSink;
use crate::error::WorkerResult;

/// Number of children a variant preset fans out into.
pub const VARIANT_COUNT: usize = 3;

/// Prompt treatments applied to the base prompt, one per A/B variant.
const VARIANT_TREATMENTS: [&str; VARIANT_COUNT] = [
    "clean studio backdrop, soft key light",
    "lifestyle setting, golden hour, handheld feel",
    "bold colors, fast cuts, high energy",
];

/// Creates batches, expands them into child jobs, aggregates outcomes.
pub struct FanoutController {
    videos: Arc<dyn VideoStore>,
    batches: Arc<dyn BatchStore>,
    jobs: Arc<dyn JobSink>,
}

impl FanoutController {
    pub fn new(
        videos: Arc<dyn VideoStore>,
        batches: Arc<dyn BatchStore>,
        jobs: Arc<dyn JobSink>,
    ) -> Self {
        Self {
            videos,
            batches,
            jobs,
        }
    }

    /// Create a batch from a fan-out request.
    ///
    /// Every item is validated BEFORE any record is written or job
    /// enqueued; a validation failure aborts the whole request with no
    /// partial side effects. Returns the parent id and the item indexes.
    pub async fn create(&self, request: &FanoutRequest) -> WorkerResult<(BatchId, Vec<u32>)> {
        request.validate_all()?;

        let batch = BatchJob::new(&request.user_id, request.kind, request.items.len() as u32);
        let items: Vec<BatchJobItem> = request
            .items
            .iter()
            .enumerate()
            .map(|(index, mode)| BatchJobItem::new(batch.id.clone(), index as u32, mode.clone()))
            .collect();

        self.batches.create_batch(&batch, &items).await?;

        let expand = ExpandBatchJob::new(
            batch.id.clone(),
            &request.user_id,
            &request.product_id,
            request.kind,
            request.items.clone(),
        );
        self.jobs.submit(&QueueJob::ExpandBatch(expand)).await?;

        info!(batch_id = %batch.id, total = items.len(), "Created {} batch", request.kind);

        let item_ids = items.iter().map(|i| i.item_index).collect();
        Ok((batch.id, item_ids))
    }

    /// Expand a base request into the fixed A/B variant set.
    ///
    /// Only prompt-driven generation has meaningful prompt treatments; the
    /// variant items are validated like any other batch.
    pub fn variant_items(base: &GenerationMode) -> Vec<GenerationMode> {
        match base {
            GenerationMode::Standard {
                prompt,
                negative_prompt,
                image_url,
                duration_seconds,
            } => VARIANT_TREATMENTS
                .iter()
                .map(|treatment| GenerationMode::Standard {
                    prompt: Some(match prompt {
                        Some(p) => format!("{p}, {treatment}"),
                        None => treatment.to_string(),
                    }),
                    negative_prompt: negative_prompt.clone(),
                    image_url: image_url.clone(),
                    duration_seconds: *duration_seconds,
                })
                .collect(),
            other => vec![other.clone(); VARIANT_COUNT],
        }
    }

    /// Worker-side expansion: create one Video per item and enqueue the
    /// child generation jobs.
    ///
    /// Children are deduplicated by their idempotency keys, so a redelivered
    /// expansion job does not double-enqueue.
    pub async fn expand(&self, job: &ExpandBatchJob) -> WorkerResult<()> {
        for (index, mode) in job.items.iter().enumerate() {
            let index = index as u32;

            let video = Video::new(
                &job.user_id,
                &job.product_id,
                GenerationConfig::new(mode.clone()),
            );
            self.videos.create_video(&video).await?;
            self.batches
                .mark_item_processing(&job.batch_id, index, &video.id)
                .await?;

            let child = GenerateVideoJob::new(
                &job.user_id,
                video.id.clone(),
                &job.product_id,
                mode.clone(),
            )
            .with_batch_ref(job.batch_id.clone(), index);

            self.jobs.submit(&QueueJob::GenerateVideo(child)).await?;
        }

        self.batches.mark_batch_processing(&job.batch_id).await?;
        info!(batch_id = %job.batch_id, children = job.items.len(), "Fanned out batch");
        Ok(())
    }

    /// Record one child's terminal outcome and flip the parent when every
    /// child has terminated.
    ///
    /// The store increments the counter atomically; one child's failure
    /// never touches its siblings, and the parent resolves to `failed` only
    /// when every child failed.
    pub async fn record_outcome(
        &self,
        batch_id: &BatchId,
        item_index: u32,
        outcome: ItemOutcome,
    ) -> WorkerResult<()> {
        let parent = self
            .batches
            .record_item_outcome(batch_id, item_index, outcome)
            .await?;

        if parent.all_terminated() && !parent.status.is_terminal() {
            let resolved = parent.resolved_status();
            self.batches.finalize_batch(batch_id, resolved).await?;
            info!(
                batch_id = %batch_id,
                completed = parent.completed_count,
                failed = parent.failed_count,
                "Batch terminated as {}", resolved
            );
        }

        Ok(())
    }

    /// Attach a child's Video record id (used by tests and admin tooling).
    pub async fn item_video(&self, batch_id: &BatchId, item_index: u32) -> WorkerResult<Option<VideoId>> {
        let items = self.batches.get_items(batch_id).await?;
        Ok(items
            .into_iter()
            .find(|i| i.item_index == item_index)
            .and_then(|i| i.video_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use shopreel_models::{BatchKind, BatchStatus, ValidationError};
    use shopreel_store::MemoryStore;

    use crate::error::WorkerError;

    /// Sink that records submitted jobs instead of touching Redis.
    #[derive(Default)]
    struct RecordingSink {
        jobs: Mutex<Vec<QueueJob>>,
    }

    #[async_trait]
    impl JobSink for RecordingSink {
        async fn submit(&self, job: &QueueJob) -> WorkerResult<String> {
            let mut jobs = self.jobs.lock().unwrap();
            jobs.push(job.clone());
            Ok(format!("msg-{}", jobs.len()))
        }
    }

    fn prompt_mode(prompt: &str) -> GenerationMode {
        GenerationMode::Standard {
            prompt: Some(prompt.into()),
            negative_prompt: None,
            image_url: None,
            duration_seconds: 5,
        }
    }

    fn controller() -> (FanoutController, Arc<MemoryStore>, Arc<RecordingSink>) {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let controller = FanoutController::new(store.clone(), store.clone(), sink.clone());
        (controller, store, sink)
    }

    fn request(items: Vec<GenerationMode>) -> FanoutRequest {
        FanoutRequest {
            user_id: "user-1".into(),
            product_id: "prod-1".into(),
            kind: BatchKind::Batch,
            items,
        }
    }

    #[tokio::test]
    async fn test_create_validates_before_any_side_effect() {
        let (controller, store, sink) = controller();

        let bad = request(vec![
            prompt_mode("ok"),
            GenerationMode::LipSync {
                avatar_id: "ava".into(),
                script: String::new(), // invalid
                voice_id: None,
            },
        ]);

        let err = controller.create(&bad).await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::Validation(ValidationError::BatchItem { index: 1, .. })
        ));

        // No partial side effects: nothing stored, nothing enqueued
        assert!(sink.jobs.lock().unwrap().is_empty());
        let _ = store; // MemoryStore has no list API; the empty sink is the observable
    }

    #[tokio::test]
    async fn test_create_and_expand_enqueue_children() {
        let (controller, store, sink) = controller();

        let req = request(vec![prompt_mode("a"), prompt_mode("b")]);
        let (batch_id, item_ids) = controller.create(&req).await.unwrap();
        assert_eq!(item_ids, vec![0, 1]);

        // The expansion job was enqueued; run it
        let expand = match &sink.jobs.lock().unwrap()[0] {
            QueueJob::ExpandBatch(j) => j.clone(),
            other => panic!("unexpected job: {other:?}"),
        };
        controller.expand(&expand).await.unwrap();

        let jobs = sink.jobs.lock().unwrap();
        let children: Vec<_> = jobs
            .iter()
            .filter_map(|j| match j {
                QueueJob::GenerateVideo(g) => Some(g),
                _ => None,
            })
            .collect();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.batch_ref.is_some()));

        // Every item has a Video record attached
        let items = controller.batches.get_items(&batch_id).await.unwrap();
        assert!(items.iter().all(|i| i.video_id.is_some()));

        let parent = store.get_batch(&batch_id).await.unwrap().unwrap();
        assert_eq!(parent.status, BatchStatus::Processing);
    }

    #[tokio::test]
    async fn test_scenario_mixed_outcomes_complete_parent() {
        let (controller, store, sink) = controller();

        let req = request(vec![
            prompt_mode("a"),
            prompt_mode("b"),
            prompt_mode("c"),
            prompt_mode("d"),
        ]);
        let (batch_id, _) = controller.create(&req).await.unwrap();
        let expand = match &sink.jobs.lock().unwrap()[0] {
            QueueJob::ExpandBatch(j) => j.clone(),
            other => panic!("unexpected job: {other:?}"),
        };
        controller.expand(&expand).await.unwrap();

        // Items 0, 1, 3 complete; item 2 fails inside the provider
        controller
            .record_outcome(&batch_id, 0, ItemOutcome::Completed)
            .await
            .unwrap();
        controller
            .record_outcome(&batch_id, 1, ItemOutcome::Completed)
            .await
            .unwrap();

        // Not terminal yet
        let parent = store.get_batch(&batch_id).await.unwrap().unwrap();
        assert_eq!(parent.status, BatchStatus::Processing);
        assert!(parent.terminated_count() <= parent.total_count);

        controller
            .record_outcome(&batch_id, 2, ItemOutcome::Failed("provider rejected".into()))
            .await
            .unwrap();
        controller
            .record_outcome(&batch_id, 3, ItemOutcome::Completed)
            .await
            .unwrap();

        let parent = store.get_batch(&batch_id).await.unwrap().unwrap();
        assert_eq!(parent.completed_count, 3);
        assert_eq!(parent.failed_count, 1);
        assert_eq!(parent.status, BatchStatus::Completed);
        assert_eq!(
            parent.completed_count + parent.failed_count,
            parent.total_count
        );
    }

    #[tokio::test]
    async fn test_all_children_failed_resolves_failed() {
        let (controller, store, sink) = controller();

        let req = request(vec![prompt_mode("a"), prompt_mode("b")]);
        let (batch_id, _) = controller.create(&req).await.unwrap();
        let expand = match &sink.jobs.lock().unwrap()[0] {
            QueueJob::ExpandBatch(j) => j.clone(),
            other => panic!("unexpected job: {other:?}"),
        };
        controller.expand(&expand).await.unwrap();

        controller
            .record_outcome(&batch_id, 0, ItemOutcome::Failed("boom".into()))
            .await
            .unwrap();
        controller
            .record_outcome(&batch_id, 1, ItemOutcome::Failed("boom".into()))
            .await
            .unwrap();

        let parent = store.get_batch(&batch_id).await.unwrap().unwrap();
        assert_eq!(parent.status, BatchStatus::Failed);
    }

    #[test]
    fn test_variant_items_produce_fixed_count() {
        let items = FanoutController::variant_items(&prompt_mode("red sneaker"));
        assert_eq!(items.len(), VARIANT_COUNT);
        // Each variant keeps the base prompt and adds a distinct treatment
        let prompts: Vec<_> = items
            .iter()
            .map(|m| match m {
                GenerationMode::Standard { prompt, .. } => prompt.clone().unwrap(),
                other => panic!("unexpected mode: {other:?}"),
            })
            .collect();
        assert!(prompts.iter().all(|p| p.starts_with("red sneaker, ")));
        assert_eq!(
            prompts.iter().collect::<std::collections::HashSet<_>>().len(),
            VARIANT_COUNT
        );
    }
}
