//! Polling configuration and the polling loop manager.
//!
//! Remote stage jobs run out of band, so their outcome is observed by
//! polling a progress resource and a report resource at a fixed period.

pub mod manager;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use manager::{LoopKey, PollingLoopManager, Tick};

/// Default period between two polls of the same resource.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Configuration for polling loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Period between two ticks of a loop, in milliseconds.
    /// Not drift corrected: the next period starts when a tick finishes.
    /// Default: 1000
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl PollingConfig {
    /// Creates a new PollingConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the polling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
