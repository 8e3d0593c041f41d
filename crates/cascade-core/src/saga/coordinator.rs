use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::workflow::{StepStatus, Workflow, WorkflowError, WorkflowStatus};

/// Chooses between forward and backward recovery for a failing workflow.
///
/// The coordinator is deterministic given the workflow state and performs no
/// I/O: it mutates the aggregate through its guarded methods and reports
/// decisions (such as retry delays) back to the caller. Invoking the remote
/// compensation calls is the execution service's responsibility.
#[derive(Debug, Clone, Copy, Default)]
pub struct SagaCoordinator;

impl SagaCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Start a workflow as a saga, stamping a transaction id into the
    /// execution context.
    pub fn start_saga(&self, workflow: &mut Workflow, now: DateTime<Utc>) -> Result<()> {
        workflow.update_context(
            "saga.transaction_id",
            Uuid::new_v4().to_string().into(),
        );
        workflow.start(now)
    }

    /// Attempt forward recovery of a failed step.
    ///
    /// Returns the backoff delay the scheduler should honor before the step
    /// is re-admitted, or `None` when the step cannot be retried and the
    /// caller must switch to backward recovery.
    pub fn forward_recovery(
        &self,
        workflow: &mut Workflow,
        step_id: &str,
    ) -> Result<Option<Duration>> {
        let retryable = workflow.step(step_id).is_some_and(|step| {
            step.can_retry() && step.last_error().map_or(true, |e| e.recoverable)
        });
        if !retryable {
            tracing::debug!(
                workflow_id = %workflow.id(),
                step_id = %step_id,
                "Forward recovery exhausted"
            );
            return Ok(None);
        }

        let delay = workflow
            .step(step_id)
            .map(|s| s.next_retry_delay())
            .unwrap_or(Duration::ZERO);
        workflow.retry_step(step_id)?;
        tracing::debug!(
            workflow_id = %workflow.id(),
            step_id = %step_id,
            delay_ms = delay.as_millis() as u64,
            "Forward recovery scheduled"
        );
        Ok(Some(delay))
    }

    /// Switch a failed workflow into backward recovery.
    ///
    /// With nothing to compensate the workflow goes straight to its
    /// compensated terminal state; otherwise it enters COMPENSATING and the
    /// execution service drives each compensating call.
    pub fn backward_recovery(&self, workflow: &mut Workflow, now: DateTime<Utc>) -> Result<()> {
        let pending = workflow.steps_requiring_compensation();
        tracing::debug!(
            workflow_id = %workflow.id(),
            steps = ?pending,
            "Backward recovery engaged"
        );
        workflow.compensate(now)?;
        if pending.is_empty() {
            workflow.complete_compensation(now)?;
        }
        Ok(())
    }

    /// Complete a saga whose steps all succeeded.
    pub fn complete_saga(&self, workflow: &mut Workflow, now: DateTime<Utc>) -> Result<()> {
        workflow.complete(now)
    }

    /// Fail a saga, entering backward recovery when the error and the
    /// executed log call for it.
    pub fn fail_saga(
        &self,
        workflow: &mut Workflow,
        error: WorkflowError,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if workflow.status() != WorkflowStatus::Failed {
            workflow.fail(error.clone(), now)?;
        }
        if error.requires_compensation() && !workflow.executed_steps().is_empty() {
            self.backward_recovery(workflow, now)?;
        }
        Ok(())
    }

    /// Admission check: every completed step must carry a compensation
    /// descriptor, or backward recovery could strand completed work.
    pub fn check_consistency(&self, workflow: &Workflow) -> bool {
        !workflow
            .steps()
            .iter()
            .any(|s| s.status() == StepStatus::Completed && s.compensation().is_none())
    }

    /// Fraction of executed steps already compensated, as a percentage.
    /// Defined as 100 when nothing was executed.
    pub fn compensation_progress(&self, workflow: &Workflow) -> f64 {
        let executed = workflow.executed_steps().len();
        if executed == 0 {
            return 100.0;
        }
        workflow.compensated_steps().len() as f64 / executed as f64 * 100.0
    }
}
