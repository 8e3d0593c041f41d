use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cascade_core::workflow::{EventEnvelope, WorkflowEvent, WorkflowStatus};
use cascade_core::{
    Clock, EventPublisher, LoadController, LoadSnapshot, LoadTracker, Result, WorkflowRepository,
};

/// Periodic load sampler for the engine's own service id.
///
/// Folds local process cpu/memory, the pending queue depth and the
/// in-flight step count into a snapshot, records it on the shared tracker,
/// and publishes a rebalance event whenever the controller's targets shift.
pub struct LoadMonitor {
    tracker: Arc<LoadTracker>,
    controller: LoadController,
    publisher: Arc<dyn EventPublisher>,
    repository: Arc<dyn WorkflowRepository>,
    clock: Arc<dyn Clock>,
    service_id: String,
    interval: Duration,
    in_flight: Arc<AtomicU32>,
    system: Mutex<sysinfo::System>,
    last_score: Mutex<Option<f64>>,
}

impl LoadMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracker: Arc<LoadTracker>,
        controller: LoadController,
        publisher: Arc<dyn EventPublisher>,
        repository: Arc<dyn WorkflowRepository>,
        clock: Arc<dyn Clock>,
        service_id: impl Into<String>,
        interval: Duration,
        in_flight: Arc<AtomicU32>,
    ) -> Self {
        Self {
            tracker,
            controller,
            publisher,
            repository,
            clock,
            service_id: service_id.into(),
            interval,
            in_flight,
            system: Mutex::new(sysinfo::System::new()),
            last_score: Mutex::new(None),
        }
    }

    /// Run the sampling loop until shutdown.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            service_id = %self.service_id,
            interval = ?self.interval,
            "Load monitor started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.sample().await {
                        tracing::error!(error = %e, "Load sampling failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Load monitor shutting down");
                    break;
                }
            }
        }
    }

    /// Take one sample and evaluate rebalancing.
    pub async fn sample(&self) -> Result<()> {
        let queue_depth = self
            .repository
            .count_by_status(WorkflowStatus::Pending)
            .await? as u32;

        let (cpu_percent, memory_percent) = self.sample_process();
        let snapshot = LoadSnapshot {
            cpu_percent,
            memory_percent,
            active_requests: self.in_flight.load(Ordering::SeqCst),
            queue_depth,
            ..LoadSnapshot::new(self.service_id.clone(), self.clock.now())
        };

        let score = snapshot.load_score();
        tracing::debug!(
            service_id = %self.service_id,
            score,
            queue_depth,
            cpu = cpu_percent,
            memory = memory_percent,
            "Load sampled"
        );
        self.tracker.record(snapshot);

        self.evaluate_rebalance(score).await
    }

    /// Publish a rebalance event when the controller detects imbalance.
    async fn evaluate_rebalance(&self, current_score: f64) -> Result<()> {
        let snapshots = self.tracker.snapshot_map();
        if !self.controller.needs_rebalance(&snapshots) {
            *self.last_score.lock().unwrap() = Some(current_score);
            return Ok(());
        }

        let targets = self.controller.rebalance_targets(&snapshots);
        let previous = self
            .last_score
            .lock()
            .unwrap()
            .replace(current_score)
            .unwrap_or(current_score);

        let now = self.clock.now();
        let envelope = EventEnvelope::new(
            self.service_id.clone(),
            0,
            now,
            WorkflowEvent::LoadRebalanced {
                service_id: self.service_id.clone(),
                previous_load: previous,
                current_load: current_score,
                service_loads: targets.clone(),
                at: now,
                reason: Some("load imbalance detected".to_string()),
            },
        );
        self.publisher.publish(&envelope).await?;

        tracing::info!(
            service_id = %self.service_id,
            previous_load = previous,
            current_load = current_score,
            targets = ?targets,
            "Load rebalanced"
        );
        Ok(())
    }

    /// Local process cpu and memory utilization percentages.
    fn sample_process(&self) -> (f64, f64) {
        let mut system = self.system.lock().unwrap();
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu = system.global_cpu_usage() as f64;
        let memory = match system.total_memory() {
            0 => 0.0,
            total => system.used_memory() as f64 / total as f64 * 100.0,
        };
        (cpu.clamp(0.0, 100.0), memory.clamp(0.0, 100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::testing::{ManualClock, RecordingPublisher};
    use cascade_core::LoadThresholds;
    use chrono::Utc;

    use crate::store::MemoryRepository;

    fn monitor(
        tracker: Arc<LoadTracker>,
        publisher: Arc<RecordingPublisher>,
    ) -> LoadMonitor {
        let clock = Arc::new(ManualClock::fixed());
        LoadMonitor::new(
            tracker,
            LoadController::new(LoadThresholds::default()),
            publisher,
            Arc::new(MemoryRepository::new(clock.clone())),
            clock,
            "cascade-engine",
            Duration::from_millis(100),
            Arc::new(AtomicU32::new(0)),
        )
    }

    #[tokio::test]
    async fn test_sample_records_snapshot() {
        let tracker = Arc::new(LoadTracker::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let monitor = monitor(tracker.clone(), publisher);

        monitor.sample().await.unwrap();
        let snapshot = tracker.latest("cascade-engine").unwrap();
        assert_eq!(snapshot.service_id, "cascade-engine");
        assert_eq!(snapshot.queue_depth, 0);
    }

    #[tokio::test]
    async fn test_rebalance_event_on_imbalance() {
        let tracker = Arc::new(LoadTracker::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let monitor = monitor(tracker.clone(), publisher.clone());

        // A remote service already past critical forces a rebalance.
        tracker.record(LoadSnapshot {
            cpu_percent: 100.0,
            memory_percent: 100.0,
            queue_depth: 1000,
            error_rate: 1.0,
            ..LoadSnapshot::new("picking-service", Utc::now())
        });

        monitor.sample().await.unwrap();
        let types = publisher.event_types();
        assert!(types.contains(&"system.load.rebalanced".to_string()));
    }
}
