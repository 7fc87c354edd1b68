/**
 * Time source for debouncing, injectable so tests control time explicitly.
 */
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[async_trait]
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Completes once `now() >= deadline`
    async fn sleep_until(&self, deadline: Instant);
}

/// The tokio timer; honours `tokio::time::pause` in tests
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

/// A clock that only moves when [`ManualClock::advance`] is called
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
    tick: Notify,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            tick: Notify::new(),
        }
    }

    /// Moves time forward and wakes every sleeper whose deadline has passed
    pub fn advance(&self, by: Duration) {
        {
            let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *now += by;
        }
        self.tick.notify_waiters();
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn sleep_until(&self, deadline: Instant) {
        loop {
            // Register before checking so an advance between the two is not missed
            let ticked = self.tick.notified();
            if self.now() >= deadline {
                return;
            }
            ticked.await;
        }
    }
}
