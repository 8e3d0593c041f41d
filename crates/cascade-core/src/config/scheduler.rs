use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Waveless scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Default batch size before load adaptation.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Default tick interval in milliseconds before queue adaptation.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Age in seconds past which a pending workflow bypasses batching.
    #[serde(default = "default_immediate_dispatch_age_secs")]
    pub immediate_dispatch_age_secs: i64,

    /// Maximum candidates fetched from the repository per tick.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
}

impl SchedulerConfig {
    /// Default tick interval as a Duration.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Immediate-dispatch age as a chrono Duration.
    pub fn immediate_dispatch_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.immediate_dispatch_age_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            tick_interval_ms: default_tick_interval_ms(),
            immediate_dispatch_age_secs: default_immediate_dispatch_age_secs(),
            fetch_limit: default_fetch_limit(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_immediate_dispatch_age_secs() -> i64 {
    60
}

fn default_fetch_limit() -> usize {
    100
}
