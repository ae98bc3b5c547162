//! Injectable clock.
//!
//! The poll loop blocks on `Clock::sleep` instead of `tokio::time::sleep`
//! directly so tests can run many iterations without wall-clock delay.

use std::time::Duration;

use async_trait::async_trait;

/// Source of delay for polling loops.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the tokio timer.
#[derive(Debug, Clone, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub mod test_clock {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Clock that returns immediately and counts the sleeps it was asked for.
    #[derive(Debug, Default)]
    pub struct InstantClock {
        sleeps: Arc<AtomicU32>,
    }

    impl InstantClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sleep_count(&self) -> u32 {
            self.sleeps.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Clock for InstantClock {
        async fn sleep(&self, _duration: Duration) {
            self.sleeps.fetch_add(1, Ordering::SeqCst);
        }
    }
}
