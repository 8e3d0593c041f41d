use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::load::LoadThresholds;

/// Load controller and monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Target utilization percentage per service.
    #[serde(default = "default_target_percent")]
    pub target_percent: f64,

    /// Critical utilization percentage per service.
    #[serde(default = "default_critical_percent")]
    pub critical_percent: f64,

    /// Error rate at or below which a service counts as healthy.
    #[serde(default = "default_healthy_error_rate")]
    pub healthy_error_rate: f64,

    /// How often the load monitor samples, in milliseconds.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
}

impl LoadConfig {
    /// Monitor interval as a Duration.
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Thresholds value handed to the load controller.
    pub fn thresholds(&self) -> LoadThresholds {
        LoadThresholds {
            target_percent: self.target_percent,
            critical_percent: self.critical_percent,
            healthy_error_rate: self.healthy_error_rate,
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            target_percent: default_target_percent(),
            critical_percent: default_critical_percent(),
            healthy_error_rate: default_healthy_error_rate(),
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }
}

fn default_target_percent() -> f64 {
    85.0
}

fn default_critical_percent() -> f64 {
    95.0
}

fn default_healthy_error_rate() -> f64 {
    0.1
}

fn default_monitor_interval_ms() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_default() {
        let config = LoadConfig::default();
        assert_eq!(config.target_percent, 85.0);
        assert_eq!(config.critical_percent, 95.0);
        assert_eq!(config.monitor_interval(), Duration::from_millis(5000));
    }

    #[test]
    fn test_thresholds_conversion() {
        let config = LoadConfig {
            target_percent: 80.0,
            critical_percent: 92.0,
            ..Default::default()
        };
        let thresholds = config.thresholds();
        assert_eq!(thresholds.target_percent, 80.0);
        assert_eq!(thresholds.critical_percent, 92.0);
    }
}
