use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use cascade_core::workflow::{Workflow, WorkflowStatus};
use cascade_core::{
    CascadeError, Clock, LoadController, LoadTracker, Priority, Result, SchedulerConfig,
    WorkflowRepository,
};

use crate::service::WorkflowExecutionService;

/// Sort admission candidates by scheduler rank: high priority first, then
/// oldest creation time as the tie-break.
pub fn order_candidates(mut candidates: Vec<Workflow>) -> Vec<Workflow> {
    candidates.sort_by(|a, b| {
        a.priority()
            .cmp(&b.priority())
            .then_with(|| a.created_at().cmp(&b.created_at()))
    });
    candidates
}

/// Waveless admission loop.
///
/// Each tick admits a priority-ordered batch of eligible workflows whose
/// size adapts to the engine's load score, at an interval that adapts to
/// queue depth. High-priority or long-waiting workflows bypass batching.
/// The loop checkpoints nothing outside the repository.
pub struct WavelessScheduler {
    config: SchedulerConfig,
    service: Arc<WorkflowExecutionService>,
    repository: Arc<dyn WorkflowRepository>,
    tracker: Arc<LoadTracker>,
    controller: LoadController,
    clock: Arc<dyn Clock>,
    engine_service_id: String,
}

impl WavelessScheduler {
    pub fn new(
        config: SchedulerConfig,
        service: Arc<WorkflowExecutionService>,
        repository: Arc<dyn WorkflowRepository>,
        tracker: Arc<LoadTracker>,
        controller: LoadController,
        clock: Arc<dyn Clock>,
        engine_service_id: impl Into<String>,
    ) -> Self {
        Self {
            config,
            service,
            repository,
            tracker,
            controller,
            clock,
            engine_service_id: engine_service_id.into(),
        }
    }

    /// Run the admission loop until shutdown.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = self.config.tick_interval();

        tracing::info!(
            batch_size = self.config.batch_size,
            tick_interval = ?interval,
            "Waveless scheduler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.tick().await {
                        Ok(queue_depth) => {
                            interval = self.controller.recommended_tick_interval(queue_depth);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Scheduler tick failed");
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Waveless scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// One admission pass. Returns the pending queue depth so the caller
    /// can adapt the next tick interval.
    pub async fn tick(&self) -> Result<usize> {
        let now = self.clock.now();

        // Admission gate: a saturated engine yields the whole tick.
        if let Some(snapshot) = self.tracker.latest(&self.engine_service_id) {
            if self.controller.should_pause_admission(&snapshot) {
                tracing::warn!(
                    score = snapshot.load_score(),
                    error_rate = snapshot.error_rate,
                    "Admission paused under load"
                );
                return self.queue_depth().await;
            }
        }

        let mut candidates = self
            .repository
            .find_for_waveless(self.config.fetch_limit)
            .await?;
        candidates.extend(self.retry_due_workflows(now).await?);

        let ordered = order_candidates(candidates);
        let (immediate, batched): (Vec<_>, Vec<_>) = ordered
            .into_iter()
            .partition(|w| self.bypasses_batching(w, now));

        let load_score = self
            .tracker
            .latest(&self.engine_service_id)
            .map(|s| s.load_score())
            .unwrap_or(0.0);
        let batch_size = self
            .controller
            .recommended_batch_size(self.config.batch_size, load_score);

        let admitted = immediate.len() + batched.len().min(batch_size);
        if admitted > 0 {
            tracing::debug!(
                immediate = immediate.len(),
                batch = batched.len().min(batch_size),
                batch_size,
                load_score,
                "Admitting workflows"
            );
        }

        for workflow in immediate
            .into_iter()
            .chain(batched.into_iter().take(batch_size))
        {
            self.dispatch(workflow.id()).await;
        }

        self.expire_stuck_steps(now).await?;
        self.queue_depth().await
    }

    /// Hand one workflow to the execution service, tolerating contention.
    async fn dispatch(&self, id: &str) {
        match self.service.admit(id).await {
            Ok(outcome) => {
                tracing::debug!(workflow_id = %id, outcome = ?outcome, "Dispatched workflow");
            }
            Err(CascadeError::LockUnavailable(_)) => {
                // Another worker holds it; the next tick will retry.
                tracing::debug!(workflow_id = %id, "Workflow locked elsewhere, skipping");
            }
            Err(e) => {
                tracing::error!(workflow_id = %id, error = %e, "Failed to admit workflow");
            }
        }
    }

    /// Executing workflows whose scheduled step retry has come due.
    async fn retry_due_workflows(&self, now: DateTime<Utc>) -> Result<Vec<Workflow>> {
        let executing = self
            .repository
            .find_by_status(WorkflowStatus::Executing)
            .await?;
        Ok(executing
            .into_iter()
            .filter(|w| {
                w.context()
                    .get("retry.due_at")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|due| due.with_timezone(&Utc) <= now)
                    .unwrap_or(false)
            })
            .collect())
    }

    /// High-priority workflows and long-waiters skip batching entirely.
    fn bypasses_batching(&self, workflow: &Workflow, now: DateTime<Utc>) -> bool {
        workflow.priority() == Priority::High
            || now - workflow.created_at() > self.config.immediate_dispatch_age()
    }

    /// Surface executing steps that exceeded their timeout as recoverable
    /// timeout failures.
    async fn expire_stuck_steps(&self, now: DateTime<Utc>) -> Result<()> {
        for workflow in self
            .repository
            .find_by_status(WorkflowStatus::Executing)
            .await?
        {
            let Some(step_id) = workflow.current_step_id() else {
                continue;
            };
            let timed_out = workflow
                .step(step_id)
                .map(|s| s.has_timed_out(now))
                .unwrap_or(false);
            if !timed_out {
                continue;
            }
            tracing::warn!(
                workflow_id = %workflow.id(),
                step_id = %step_id,
                "Step exceeded its timeout, surfacing failure"
            );
            if let Err(e) = self
                .service
                .check_step_timeout(workflow.id(), step_id)
                .await
            {
                tracing::error!(
                    workflow_id = %workflow.id(),
                    error = %e,
                    "Failed to expire stuck step"
                );
            }
        }
        Ok(())
    }

    async fn queue_depth(&self) -> Result<usize> {
        Ok(self
            .repository
            .count_by_status(WorkflowStatus::Pending)
            .await? as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::testing::{ManualClock, WorkflowBuilder};
    use std::time::Duration;

    #[test]
    fn test_order_candidates_priority_then_age() {
        let clock = ManualClock::fixed();
        let mut candidates = Vec::new();
        for (i, priority) in [
            Priority::Low,
            Priority::High,
            Priority::Normal,
            Priority::High,
            Priority::Low,
            Priority::Normal,
        ]
        .iter()
        .enumerate()
        {
            let w = WorkflowBuilder::new(format!("w{}", i + 1))
                .priority(*priority)
                .build(clock.now());
            candidates.push(w);
            clock.advance(Duration::from_secs(1));
        }

        let ordered = order_candidates(candidates);
        let ids: Vec<&str> = ordered.iter().map(|w| w.id()).collect();
        // High first (older high wins), then normal, then low.
        assert_eq!(ids, vec!["w2", "w4", "w3", "w6", "w1", "w5"]);

        // The first batch of three matches the expected admission order.
        let priorities: Vec<Priority> = ordered.iter().take(3).map(|w| w.priority()).collect();
        assert_eq!(
            priorities,
            vec![Priority::High, Priority::High, Priority::Normal]
        );
    }
}
