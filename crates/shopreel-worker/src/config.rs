//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent jobs per queue (one poller occupies a slot for its whole
    /// wait window, so this bounds simultaneously in-flight generations)
    pub workers_per_queue: usize,
    /// Delay between provider polls
    pub poll_interval: Duration,
    /// Maximum polls before a task is declared timed out
    pub max_poll_attempts: u32,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Work directory for pipeline run workspaces
    pub work_dir: String,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// Per-stage FFmpeg timeout
    pub stage_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers_per_queue: 2,
            poll_interval: Duration::from_secs(10),
            max_poll_attempts: 60, // 10 minute wait budget
            shutdown_timeout: Duration::from_secs(30),
            work_dir: "/tmp/shopreel".to_string(),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            stage_timeout: Duration::from_secs(300),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            workers_per_queue: std::env::var("WORKER_JOBS_PER_QUEUE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            poll_interval: Duration::from_secs(
                std::env::var("WORKER_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            max_poll_attempts: std::env::var("WORKER_MAX_POLL_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .unwrap_or_else(|_| "/tmp/shopreel".to_string()),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("WORKER_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            stage_timeout: Duration::from_secs(
                std::env::var("WORKER_STAGE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }

    /// Total wait budget of one task poll loop.
    pub fn wait_budget(&self) -> Duration {
        self.poll_interval * self.max_poll_attempts
    }
}
