//! Task poller.
//!
//! Drives one provider task to a terminal phase: poll, map progress,
//! publish, sleep, repeat. Bounded by the wait budget and interruptible by
//! user cancellation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use shopreel_models::{map_progress, ProviderPhase, VideoId, VideoStatus};
use shopreel_providers::ProviderAdapter;
use shopreel_store::VideoStore;

use crate::clock::Clock;
use crate::error::{WorkerError, WorkerResult};
use crate::publisher::StatusPublisher;
use crate::retry::{retry_async, RetryConfig};

/// Terminal outcome of a poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The provider finished; the result URL is ready for pickup.
    Succeeded { result_url: String },
    /// The user cancelled the Video; no further writes were performed.
    Cancelled,
}

impl PollOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PollOutcome::Cancelled)
    }
}

/// Polls one provider task until it terminates.
///
/// Exactly one poller owns a given task at a time; the job queue's
/// per-message exclusivity enforces this, so all record writes from here
/// are single-writer.
pub struct TaskPoller {
    adapter: Arc<dyn ProviderAdapter>,
    store: Arc<dyn VideoStore>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl TaskPoller {
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        store: Arc<dyn VideoStore>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            adapter,
            store,
            clock,
            poll_interval,
            max_attempts,
        }
    }

    /// Run the poll loop for one task.
    ///
    /// Each iteration first re-reads the Video's status; a `cancelled`
    /// record stops the loop before the next provider call. The check and
    /// the poll are not atomic: a cancellation landing between them is
    /// observed on the following iteration, a latency bound of at most one
    /// poll interval.
    pub async fn run(
        &self,
        video_id: &VideoId,
        task_id: &str,
        publisher: &StatusPublisher,
    ) -> WorkerResult<PollOutcome> {
        let poll_retry = RetryConfig::new(format!("{}_poll", self.adapter.name()))
            .with_max_retries(2)
            .with_base_delay(Duration::from_millis(500));

        for attempt in 1..=self.max_attempts {
            if self.is_cancelled(video_id).await? {
                info!(video_id = %video_id, task_id, "Cancellation observed, stopping poll loop");
                return Ok(PollOutcome::Cancelled);
            }

            let status = retry_async(&poll_retry, || self.adapter.poll(task_id)).await?;

            match status.phase {
                ProviderPhase::Succeeded => {
                    let result_url = status.result_url.ok_or_else(|| {
                        WorkerError::provider_task_failed("succeeded without a result URL")
                    })?;
                    debug!(video_id = %video_id, task_id, "Provider task succeeded");
                    return Ok(PollOutcome::Succeeded { result_url });
                }
                ProviderPhase::Failed => {
                    let message = status
                        .error
                        .unwrap_or_else(|| "provider reported failure".to_string());
                    return Err(WorkerError::provider_task_failed(message));
                }
                ProviderPhase::Queued | ProviderPhase::Running => {
                    let (ui_progress, label) =
                        map_progress(status.progress.unwrap_or(0), status.phase);
                    publisher.publish(ui_progress, label).await?;
                    debug!(
                        video_id = %video_id,
                        task_id,
                        attempt,
                        ui_progress,
                        "Provider task still {}", status.phase
                    );
                    self.clock.sleep(self.poll_interval).await;
                }
            }
        }

        Err(WorkerError::GenerationTimedOut {
            attempts: self.max_attempts,
            waited_secs: (self.poll_interval * self.max_attempts).as_secs(),
        })
    }

    async fn is_cancelled(&self, video_id: &VideoId) -> WorkerResult<bool> {
        Ok(self.store.get_status(video_id).await? == Some(VideoStatus::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use shopreel_models::{GenerationConfig, GenerationMode, Video};
    use shopreel_providers::{ProviderError, ProviderResult, ProviderStatus, SubmitRequest};
    use shopreel_store::MemoryStore;

    use crate::clock::test_clock::InstantClock;

    /// Adapter that replays a scripted sequence of poll results.
    struct ScriptedAdapter {
        script: Mutex<Vec<ProviderResult<ProviderStatus>>>,
    }

    impl ScriptedAdapter {
        fn new(script: Vec<ProviderResult<ProviderStatus>>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn submit(&self, _request: &SubmitRequest) -> ProviderResult<String> {
            Ok("task-1".to_string())
        }

        async fn poll(&self, _task_id: &str) -> ProviderResult<ProviderStatus> {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                // Script exhausted: keep reporting running
                return Ok(ProviderStatus::running(0));
            }
            script.remove(0)
        }
    }

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

    async fn setup(
        script: Vec<ProviderResult<ProviderStatus>>,
        max_attempts: u32,
    ) -> (TaskPoller, Arc<MemoryStore>, Video, Arc<InstantClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(InstantClock::new());
        let v = video();
        store.create_video(&v).await.unwrap();
        store.mark_generating(&v.id).await.unwrap();

        let poller = TaskPoller::new(
            Arc::new(ScriptedAdapter::new(script)),
            store.clone(),
            clock.clone(),
            Duration::from_secs(10),
            max_attempts,
        );
        (poller, store, v, clock)
    }

    #[tokio::test]
    async fn test_scenario_queued_running_succeeded() {
        let (poller, store, v, _clock) = setup(
            vec![
                Ok(ProviderStatus::queued()),
                Ok(ProviderStatus::running(40)),
                Ok(ProviderStatus::succeeded("https://cdn/out.mp4")),
            ],
            60,
        )
        .await;

        let publisher = StatusPublisher::new(store.clone(), None, v.id.clone());
        let outcome = poller.run(&v.id, "task-1", &publisher).await.unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Succeeded {
                result_url: "https://cdn/out.mp4".to_string()
            }
        );
        // Two publications: queued(0) -> 10 "submitting", running(40) -> 40 "generating"
        assert_eq!(publisher.last_progress(), 40);
        let stored = store.get_video(&v.id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 40);
        assert_eq!(stored.progress_message, "generating");
    }

    #[tokio::test]
    async fn test_cancellation_before_first_poll() {
        let (poller, store, v, _clock) =
            setup(vec![Ok(ProviderStatus::succeeded("https://cdn/out.mp4"))], 60).await;

        store.mark_cancelled(&v.id).await.unwrap();

        let publisher = StatusPublisher::new(store.clone(), None, v.id.clone());
        let outcome = poller.run(&v.id, "task-1", &publisher).await.unwrap();
        assert!(outcome.is_cancelled());

        // No writes happened: no remote_url, status still cancelled
        let stored = store.get_video(&v.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VideoStatus::Cancelled);
        assert!(stored.remote_url.is_none());
        assert_eq!(stored.progress, 0);
    }

    #[tokio::test]
    async fn test_cancellation_observed_mid_loop() {
        let (poller, store, v, clock) = setup(vec![Ok(ProviderStatus::running(20))], 60).await;

        // Cancel after the first iteration has been scripted
        let store_clone = store.clone();
        let id = v.id.clone();
        let cancel = tokio::spawn(async move {
            store_clone.mark_cancelled(&id).await.unwrap();
        });
        cancel.await.unwrap();

        let publisher = StatusPublisher::new(store.clone(), None, v.id.clone());
        let outcome = poller.run(&v.id, "task-1", &publisher).await.unwrap();
        assert!(outcome.is_cancelled());
        assert_eq!(clock.sleep_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_is_terminal() {
        let (poller, store, v, _clock) =
            setup(vec![Ok(ProviderStatus::failed("nsfw content"))], 60).await;

        let publisher = StatusPublisher::new(store.clone(), None, v.id.clone());
        let err = poller.run(&v.id, "task-1", &publisher).await.unwrap_err();
        assert!(matches!(err, WorkerError::ProviderTaskFailed(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_wait_budget_exhaustion() {
        let script: Vec<ProviderResult<ProviderStatus>> =
            (0..10).map(|_| Ok(ProviderStatus::running(50))).collect();
        let (poller, store, v, clock) = setup(script, 5).await;

        let publisher = StatusPublisher::new(store.clone(), None, v.id.clone());
        let err = poller.run(&v.id, "task-1", &publisher).await.unwrap_err();

        match err {
            WorkerError::GenerationTimedOut { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("unexpected error: {other:?}"),
        }
        // One sleep per non-terminal iteration
        assert_eq!(clock.sleep_count(), 5);
    }

    #[tokio::test]
    async fn test_progress_monotone_despite_provider_regression() {
        let (poller, store, v, _clock) = setup(
            vec![
                Ok(ProviderStatus::running(50)),
                Ok(ProviderStatus::running(30)),
                Ok(ProviderStatus::succeeded("https://cdn/out.mp4")),
            ],
            60,
        )
        .await;

        let publisher = StatusPublisher::new(store.clone(), None, v.id.clone());
        poller.run(&v.id, "task-1", &publisher).await.unwrap();

        // map(50) = 47; map(30) = 32 but clamped to 47
        let stored = store.get_video(&v.id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 47);
    }

    #[tokio::test]
    async fn test_transient_poll_error_propagates_after_retries() {
        let script: Vec<ProviderResult<ProviderStatus>> = vec![
            Err(ProviderError::unavailable("blip 1")),
            Err(ProviderError::unavailable("blip 2")),
            Err(ProviderError::unavailable("blip 3")),
        ];
        let (poller, store, v, _clock) = setup(script, 60).await;

        let publisher = StatusPublisher::new(store.clone(), None, v.id.clone());
        let err = poller.run(&v.id, "task-1", &publisher).await.unwrap_err();
        assert!(err.is_retryable());

        // User-visible status untouched by the transient failure
        let stored = store.get_video(&v.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VideoStatus::Generating);
        assert_eq!(stored.progress, 0);
    }
}
