use std::collections::HashMap;
use std::time::Duration;

use super::snapshot::{LoadSnapshot, LoadThresholds};

/// Health classification of one target service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

impl HealthStatus {
    /// Convert to string for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
        }
    }
}

/// Load-balancing decisions over a map of service snapshots.
///
/// Pure decision logic: the scheduler applies target selection when
/// admitting work, and the monitor loop publishes rebalance events when
/// targets shift.
#[derive(Debug, Clone, Copy)]
pub struct LoadController {
    thresholds: LoadThresholds,
}

impl Default for LoadController {
    fn default() -> Self {
        Self::new(LoadThresholds::default())
    }
}

impl LoadController {
    pub fn new(thresholds: LoadThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &LoadThresholds {
        &self.thresholds
    }

    /// Whether the cluster needs rebalancing: any service overloaded, or
    /// the spread between hottest and coolest exceeds 30 points.
    pub fn needs_rebalance(&self, snapshots: &HashMap<String, LoadSnapshot>) -> bool {
        if snapshots
            .values()
            .any(|s| s.is_overloaded(&self.thresholds))
        {
            return true;
        }
        let scores: Vec<f64> = snapshots.values().map(|s| s.load_score()).collect();
        match (
            scores.iter().cloned().reduce(f64::max),
            scores.iter().cloned().reduce(f64::min),
        ) {
            (Some(max), Some(min)) => max - min > 30.0,
            _ => false,
        }
    }

    /// Per-service target utilization for the next admission window.
    pub fn rebalance_targets(
        &self,
        snapshots: &HashMap<String, LoadSnapshot>,
    ) -> HashMap<String, f64> {
        let target = self.thresholds.target_percent;
        snapshots
            .iter()
            .map(|(id, snap)| {
                let current = snap.load_score();
                let desired = if current > self.thresholds.critical_percent {
                    0.8 * target
                } else if current > target {
                    target
                } else if current < 0.5 * target {
                    0.7 * target
                } else {
                    current
                };
                (id.clone(), desired)
            })
            .collect()
    }

    /// Pick the least-loaded service that can accept work. `None` means
    /// every target is saturated and the scheduler should yield.
    pub fn select_target(&self, snapshots: &HashMap<String, LoadSnapshot>) -> Option<String> {
        snapshots
            .values()
            .filter(|s| s.can_accept_work(&self.thresholds) && s.error_rate < 0.5)
            .min_by(|a, b| a.load_score().total_cmp(&b.load_score()))
            .map(|s| s.service_id.clone())
    }

    /// Whether the circuit breaker for this service should trip.
    pub fn should_trip_circuit(&self, snapshot: &LoadSnapshot) -> bool {
        snapshot.active_requests >= 10 && snapshot.error_rate >= 0.5
    }

    /// Health classification for one service.
    pub fn health_of(&self, snapshot: &LoadSnapshot) -> HealthStatus {
        let score = snapshot.load_score();
        if snapshot.error_rate > 0.5 {
            HealthStatus::Degraded
        } else if score >= self.thresholds.critical_percent {
            HealthStatus::Critical
        } else if score < self.thresholds.target_percent
            && snapshot.error_rate <= self.thresholds.healthy_error_rate
        {
            HealthStatus::Healthy
        } else {
            HealthStatus::Warning
        }
    }

    /// Whether waveless admission should pause entirely this tick.
    pub fn should_pause_admission(&self, snapshot: &LoadSnapshot) -> bool {
        snapshot.load_score() >= self.thresholds.critical_percent || snapshot.error_rate >= 0.5
    }

    /// Batch size recommendation for the waveless scheduler given the
    /// current system load score.
    pub fn recommended_batch_size(&self, default_size: usize, load_score: f64) -> usize {
        if load_score >= self.thresholds.critical_percent {
            (default_size / 4).max(1)
        } else if load_score >= self.thresholds.target_percent {
            (default_size / 2).max(1)
        } else if load_score < 50.0 {
            default_size * 2
        } else {
            default_size
        }
    }

    /// Tick interval recommendation for the waveless scheduler given the
    /// pending queue depth.
    pub fn recommended_tick_interval(&self, queue_depth: usize) -> Duration {
        if queue_depth > 100 {
            Duration::from_millis(500)
        } else if queue_depth > 50 {
            Duration::from_millis(1000)
        } else if queue_depth < 10 {
            Duration::from_millis(2000)
        } else {
            Duration::from_millis(1000)
        }
    }
}
