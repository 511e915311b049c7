//! Debounce gate for filesystem change bursts
//!
//! A single timestamp records when the last change event was accepted. Any
//! event arriving before the quiet window has elapsed is suppressed, which
//! collapses a burst of saves (and the working-tree churn caused by the sync
//! itself) into one sync attempt.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct DebounceGate {
    window: Duration,
    last_accepted: Instant,
}

impl DebounceGate {
    /// Quiet window used when none is configured
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

    /// Create a gate whose window starts counting at `started_at`
    pub fn new(window: Duration, started_at: Instant) -> Self {
        Self {
            window,
            last_accepted: started_at,
        }
    }

    /// Decide whether an event observed at `now` should trigger a sync.
    ///
    /// Accepting moves the timestamp to `now`; suppressing leaves it untouched.
    /// An event exactly one window after the last acceptance is accepted.
    pub fn admit(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_accepted) < self.window {
            return false;
        }
        self.last_accepted = now;
        true
    }

    pub fn last_accepted(&self) -> Instant {
        self.last_accepted
    }
}
