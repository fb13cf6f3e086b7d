//! Advisory request budget.
//!
//! Every authenticated REST response reports the remaining request weight
//! and the time at which the budget resets. The values are stored here so
//! callers can self-throttle; nothing in the client blocks on them.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Budget reported by the venue when nothing has been observed yet.
pub const DEFAULT_RATE_LIMIT: i64 = 1000;

/// Point-in-time copy of the rate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindowSnapshot {
    /// Remaining request weight in the current window.
    pub remaining: i64,
    /// When the window resets. `None` until the first response is seen.
    pub reset_at: Option<DateTime<Utc>>,
}

/// Shared rate limit state. Cloning shares the underlying counters.
///
/// Last write wins; there is no ordering between concurrent updates.
#[derive(Debug, Clone)]
pub struct RateWindow {
    inner: Arc<RwLock<RateWindowSnapshot>>,
}

impl RateWindow {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RateWindowSnapshot {
                remaining: DEFAULT_RATE_LIMIT,
                reset_at: None,
            })),
        }
    }

    /// Record the remaining request weight.
    pub fn update_remaining(&self, remaining: i64) {
        self.inner.write().remaining = remaining;
    }

    /// Record the reset time.
    pub fn update_reset_at(&self, reset_at: DateTime<Utc>) {
        self.inner.write().reset_at = Some(reset_at);
    }

    /// Record the reset time from epoch milliseconds. Out of range values are ignored.
    pub fn update_reset_at_millis(&self, millis: i64) {
        if let Some(reset_at) = DateTime::from_timestamp_millis(millis) {
            self.update_reset_at(reset_at);
        }
    }

    pub fn remaining(&self) -> i64 {
        self.inner.read().remaining
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().reset_at
    }

    pub fn snapshot(&self) -> RateWindowSnapshot {
        *self.inner.read()
    }

    /// Check if the reported budget is exhausted and the window has not reset yet.
    pub fn is_exhausted(&self) -> bool {
        let snapshot = self.snapshot();
        snapshot.remaining <= 0 && snapshot.reset_at.is_some_and(|t| t > Utc::now())
    }
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::new()
    }
}
