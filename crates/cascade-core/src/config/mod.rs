mod load;
mod lock;
mod retry;
mod scheduler;

pub use load::LoadConfig;
pub use lock::LockConfig;
pub use retry::RetryConfig;
pub use scheduler::SchedulerConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CascadeError, Result};

/// Root configuration for a cascade engine instance.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CascadeConfig {
    /// Engine-wide settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Waveless scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Load controller thresholds and monitor settings.
    #[serde(default)]
    pub load: LoadConfig,

    /// Per-workflow lock settings.
    #[serde(default)]
    pub lock: LockConfig,

    /// Default step retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl CascadeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CascadeError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        // Substitute environment variables
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| CascadeError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Service id this engine reports load under.
    #[serde(default = "default_service_id")]
    pub service_id: String,

    /// Default workflow retry budget.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Default per-step timeout in milliseconds.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    /// How long shutdown waits for in-flight step executions.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl EngineConfig {
    /// Default step timeout as a Duration.
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Drain timeout as a Duration.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_id: default_service_id(),
            max_retries: default_max_retries(),
            step_timeout_ms: default_step_timeout_ms(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_service_id() -> String {
    "cascade-engine".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_step_timeout_ms() -> u64 {
    30_000
}

fn default_drain_timeout_secs() -> u64 {
    30
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CascadeConfig::default();
        assert_eq!(config.engine.max_retries, 3);
        assert_eq!(config.scheduler.batch_size, 10);
        assert_eq!(config.load.target_percent, 85.0);
        assert_eq!(config.lock.ttl_secs, 30);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay_ms, 1000);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [engine]
            service_id = "wes-orchestrator"
        "#;

        let config = CascadeConfig::parse_toml(toml).unwrap();
        assert_eq!(config.engine.service_id, "wes-orchestrator");
        assert_eq!(config.scheduler.batch_size, 10);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [engine]
            service_id = "engine-1"
            max_retries = 5

            [scheduler]
            batch_size = 20
            tick_interval_ms = 250

            [load]
            target_percent = 80.0
            critical_percent = 90.0

            [lock]
            ttl_secs = 60

            [retry]
            max_retries = 2
            initial_delay_ms = 2000
            max_delay_ms = 20000
            multiplier = 3.0
        "#;

        let config = CascadeConfig::parse_toml(toml).unwrap();
        assert_eq!(config.engine.max_retries, 5);
        assert_eq!(config.scheduler.batch_size, 20);
        assert_eq!(config.load.critical_percent, 90.0);
        assert_eq!(config.lock.ttl_secs, 60);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.policy().multiplier, 3.0);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("CASCADE_TEST_SERVICE", "engine-from-env");

        let toml = r#"
            [engine]
            service_id = "${CASCADE_TEST_SERVICE}"
        "#;

        let config = CascadeConfig::parse_toml(toml).unwrap();
        assert_eq!(config.engine.service_id, "engine-from-env");

        std::env::remove_var("CASCADE_TEST_SERVICE");
    }
}
