//! Connection Monitor - tracks when the remote store last answered
//!
//! Every successful store call is registered here. The SafetyMonitor asks
//! how long the store has been silent to detect connectivity loss.
//!
//! Time comes from the injected [`Clock`](crate::clock::Clock) as a
//! [`Timestamp`], stored in an `AtomicU64` so the monitor can be shared
//! without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lalabot_protocol::Timestamp;

/// Connection health monitor
pub struct ConnectionMonitor {
    last_success: AtomicU64,
    bound: Duration,
}

impl ConnectionMonitor {
    /// Create a monitor that treats `now` as the last successful call
    ///
    /// # Parameters
    /// - `bound`: longest silence still considered connected
    pub fn new(now: Timestamp, bound: Duration) -> Self {
        Self {
            last_success: AtomicU64::new(now.as_millis()),
            bound,
        }
    }

    /// Register a successful round trip to the store
    pub fn register_success(&self, now: Timestamp) {
        self.last_success.fetch_max(now.as_millis(), Ordering::Relaxed);
    }

    pub fn last_success(&self) -> Timestamp {
        Timestamp::from_millis(self.last_success.load(Ordering::Relaxed))
    }

    /// Time since the last successful call
    pub fn time_since_last_success(&self, now: Timestamp) -> Duration {
        now.saturating_duration_since(self.last_success())
    }

    /// Returns true if the store answered within the bound
    pub fn is_connected(&self, now: Timestamp) -> bool {
        self.time_since_last_success(now) <= self.bound
    }

    pub fn bound(&self) -> Duration {
        self.bound
    }
}
