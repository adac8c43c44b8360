//! Rate-limit guard: process-wide view of the event source's quota.
//!
//! Written after every fetch response, read by the scheduler before each tick.
//! All state sits behind one mutex so concurrent cycles cannot lose updates.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use repowatch_core::types::RateLimit;

/// Shared quota tracker.
#[derive(Debug, Default)]
pub struct RateLimitGuard {
    state: Mutex<Option<RateLimit>>,
    /// Back off once `remaining <= reserve`.
    reserve: u32,
}

impl RateLimitGuard {
    pub fn new(reserve: u32) -> Self {
        Self {
            state: Mutex::new(None),
            reserve,
        }
    }

    /// Merge a quota observation.
    ///
    /// A later reset time starts a new window and replaces the state; within
    /// the same window the lowest remaining count wins; stale windows are ignored.
    pub fn record_quota(&self, observed: RateLimit) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let merged = match *state {
            Some(cur) if observed.reset_at < cur.reset_at => cur,
            Some(cur) if observed.reset_at == cur.reset_at => RateLimit {
                remaining: cur.remaining.min(observed.remaining),
                reset_at: cur.reset_at,
            },
            _ => observed,
        };
        if merged.remaining <= self.reserve {
            tracing::warn!(
                "Rate limit exhausted ({} remaining), resets at {}",
                merged.remaining,
                merged.reset_at.to_rfc3339()
            );
        }
        *state = Some(merged);
    }

    /// How long to pause dispatch, if at all.
    pub fn should_backoff(&self, now: DateTime<Utc>) -> Option<Duration> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let quota = (*state)?;
        if quota.remaining > self.reserve || now >= quota.reset_at {
            return None;
        }
        (quota.reset_at - now).to_std().ok()
    }

    /// Last merged observation.
    pub fn snapshot(&self) -> Option<RateLimit> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
