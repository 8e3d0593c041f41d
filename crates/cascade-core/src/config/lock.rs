use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-workflow lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lock TTL in seconds. Must cover the per-step processing budget.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// How many times to retry acquisition before yielding.
    #[serde(default = "default_acquire_attempts")]
    pub acquire_attempts: u32,

    /// Backoff between acquisition attempts, in milliseconds.
    #[serde(default = "default_acquire_backoff_ms")]
    pub acquire_backoff_ms: u64,
}

impl LockConfig {
    /// Lock TTL as a Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Acquisition backoff as a Duration.
    pub fn acquire_backoff(&self) -> Duration {
        Duration::from_millis(self.acquire_backoff_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            acquire_attempts: default_acquire_attempts(),
            acquire_backoff_ms: default_acquire_backoff_ms(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    30
}

fn default_acquire_attempts() -> u32 {
    3
}

fn default_acquire_backoff_ms() -> u64 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_config_default() {
        let config = LockConfig::default();
        assert_eq!(config.ttl(), Duration::from_secs(30));
        assert_eq!(config.acquire_attempts, 3);
        assert_eq!(config.acquire_backoff(), Duration::from_millis(100));
    }
}
