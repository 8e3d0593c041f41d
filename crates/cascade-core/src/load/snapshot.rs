use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Utilization thresholds the load controller judges services against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadThresholds {
    /// Target utilization percentage.
    pub target_percent: f64,
    /// Critical utilization percentage.
    pub critical_percent: f64,
    /// Error rate at or below which a service counts as healthy.
    pub healthy_error_rate: f64,
}

impl Default for LoadThresholds {
    fn default() -> Self {
        Self {
            target_percent: 85.0,
            critical_percent: 95.0,
            healthy_error_rate: 0.1,
        }
    }
}

/// Point-in-time load measurement for one target service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    /// Service the measurement belongs to.
    pub service_id: String,
    /// CPU utilization percentage (0..100).
    pub cpu_percent: f64,
    /// Memory utilization percentage (0..100).
    pub memory_percent: f64,
    /// Requests currently in flight.
    pub active_requests: u32,
    /// Depth of the service's work queue.
    pub queue_depth: u32,
    /// Rolling average response time in milliseconds.
    pub avg_response_time_ms: f64,
    /// Error rate over the sampling window (0..1).
    pub error_rate: f64,
    /// When the measurement was taken.
    pub timestamp: DateTime<Utc>,
}

impl LoadSnapshot {
    /// Create a snapshot with zeroed counters.
    pub fn new(service_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            service_id: service_id.into(),
            cpu_percent: 0.0,
            memory_percent: 0.0,
            active_requests: 0,
            queue_depth: 0,
            avg_response_time_ms: 0.0,
            error_rate: 0.0,
            timestamp,
        }
    }

    /// Composite load score in [0, 100].
    ///
    /// Weighted blend: cpu 30%, memory 30%, queue 20%, errors 20%. Queue
    /// depth normalises against 1000 outstanding items, capped at 100.
    pub fn load_score(&self) -> f64 {
        let queue_score = (self.queue_depth as f64 / 1000.0 * 100.0).min(100.0);
        let error_score = (self.error_rate * 100.0).min(100.0);
        self.cpu_percent * 0.3 + self.memory_percent * 0.3 + queue_score * 0.2 + error_score * 0.2
    }

    /// Whether this service is past the critical threshold.
    pub fn is_overloaded(&self, thresholds: &LoadThresholds) -> bool {
        self.load_score() >= thresholds.critical_percent
    }

    /// Whether this service should shed load.
    pub fn needs_rebalance(&self, thresholds: &LoadThresholds) -> bool {
        self.load_score() >= thresholds.target_percent || self.error_rate > 0.5
    }

    /// Whether new work may be routed here.
    pub fn can_accept_work(&self, thresholds: &LoadThresholds) -> bool {
        self.load_score() < thresholds.target_percent && self.error_rate < 0.3
    }
}
