//! Time source abstraction for log timestamps and scripted delays.
//!
//! Strategies never call `tokio::time` directly; they go through a
//! [`Clock`] so tests can substitute [`ManualClock`] and replay whole runs
//! in virtual time with reproducible timestamps.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;

/// Boxed sleep future returned by [`Clock::sleep`].
pub type Sleep<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Wall-clock reading plus a suspendable sleep.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    /// Suspend the caller for `duration`.
    fn sleep(&self, duration: Duration) -> Sleep<'_>;
}

/// Real clock: `chrono` wall time and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn sleep(&self, duration: Duration) -> Sleep<'_> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Virtual clock whose sleeps advance time instantly.
///
/// Each sleep moves the clock forward by the requested duration and yields
/// once to the scheduler, so concurrently spawned tasks still interleave.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
    sleeps: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at `start_millis`.
    #[must_use]
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
            sleeps: AtomicU64::new(0),
        }
    }

    /// Move the clock forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        let step = millis(duration);
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(step))
            });
    }

    /// Number of completed sleeps.
    #[must_use]
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) -> Sleep<'_> {
        Box::pin(async move {
            self.advance(duration);
            self.sleeps.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
        })
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
