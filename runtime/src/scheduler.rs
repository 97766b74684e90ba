//! Production scheduler backed by tokio timers.

use futures::future::BoxFuture;
use std::time::Duration;
use tessera_core::environment::{Scheduler, SchedulerInstant};
use tokio::time::Instant;

/// Scheduler measuring time with `tokio::time`
///
/// Follows tokio's clock, so tests that call `tokio::time::pause()` drive it
/// with `tokio::time::advance` like any other tokio timer.
#[derive(Debug, Clone, Copy)]
pub struct TokioScheduler {
    epoch: Instant,
}

impl TokioScheduler {
    /// Create a scheduler whose epoch is the current tokio instant
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> SchedulerInstant {
        SchedulerInstant::from_elapsed(self.epoch.elapsed())
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_follows_paused_tokio_clock() {
        let scheduler = TokioScheduler::new();
        assert_eq!(scheduler.now(), SchedulerInstant::EPOCH);

        let sleep = scheduler.sleep(Duration::from_millis(250));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(scheduler.now().elapsed(), Duration::from_millis(100));

        sleep.await;
        assert!(scheduler.now().elapsed() >= Duration::from_millis(250));
    }
}
