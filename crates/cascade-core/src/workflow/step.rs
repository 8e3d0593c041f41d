use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::compensation::CompensationSpec;
use super::errors::WorkflowError;
use super::retry::RetryPolicy;
use crate::error::{CascadeError, Result};

/// Step execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step not yet started.
    Pending,
    /// Step currently running against its downstream service.
    Executing,
    /// Step completed successfully.
    Completed,
    /// Step failed; retry may follow.
    Failed,
    /// Step was skipped.
    Skipped,
    /// Step compensation is running.
    Compensating,
    /// Step compensation finished.
    Compensated,
}

impl StepStatus {
    /// Convert to string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Compensating => "compensating",
            Self::Compensated => "compensated",
        }
    }

    /// Check if the step can change no further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Skipped | Self::Compensated)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result reported by a downstream service for one step execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Whether the downstream call succeeded.
    pub success: bool,
    /// Output parameters produced by the call.
    #[serde(default)]
    pub output: HashMap<String, serde_json::Value>,
    /// Optional human-readable message.
    pub message: Option<String>,
}

impl StepOutcome {
    /// Successful outcome with no output.
    pub fn ok() -> Self {
        Self {
            success: true,
            output: HashMap::new(),
            message: None,
        }
    }

    /// Successful outcome with a single output entry.
    pub fn ok_with(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut output = HashMap::new();
        output.insert(key.into(), value);
        Self {
            success: true,
            output,
            message: None,
        }
    }

    /// Attach an output entry.
    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.output.insert(key.into(), value);
        self
    }
}

/// One unit of remote work inside a workflow.
///
/// Owned exclusively by its workflow; all transitions go through the
/// guarded methods below and reject anything outside the step state
/// machine with `InvalidState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) step_type: String,
    pub(crate) service: String,
    pub(crate) operation: String,
    pub(crate) execution_order: u32,
    /// Steps that must appear in the executed log before this one runs.
    #[serde(default)]
    pub(crate) depends_on: Vec<String>,
    pub(crate) status: StepStatus,
    #[serde(default)]
    pub(crate) input: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub(crate) output: HashMap<String, serde_json::Value>,
    pub(crate) last_outcome: Option<StepOutcome>,
    pub(crate) last_error: Option<WorkflowError>,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) retry_count: u32,
    /// Set by `reset_for_retry`; consumed by the next `start`.
    #[serde(default)]
    pub(crate) retry_pending: bool,
    pub(crate) compensation: Option<CompensationSpec>,
    pub(crate) timeout: Duration,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) compensated: bool,
    pub(crate) compensated_at: Option<DateTime<Utc>>,
}

impl Step {
    /// Create a new pending step.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        service: impl Into<String>,
        operation: impl Into<String>,
        execution_order: u32,
    ) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            step_type: name.clone(),
            name,
            service: service.into(),
            operation: operation.into(),
            execution_order,
            depends_on: Vec::new(),
            status: StepStatus::Pending,
            input: HashMap::new(),
            output: HashMap::new(),
            last_outcome: None,
            last_error: None,
            retry_policy: RetryPolicy::default(),
            retry_count: 0,
            retry_pending: false,
            compensation: None,
            timeout: Duration::from_secs(30),
            started_at: None,
            completed_at: None,
            compensated: false,
            compensated_at: None,
        }
    }

    /// Override the step type label.
    pub fn with_step_type(mut self, step_type: impl Into<String>) -> Self {
        self.step_type = step_type.into();
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Attach a compensation descriptor.
    pub fn with_compensation(mut self, spec: CompensationSpec) -> Self {
        self.compensation = Some(spec);
        self
    }

    /// Set the per-execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set an input parameter.
    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    /// Require another step to have executed before this one runs.
    pub fn with_dependency(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.push(step_id.into());
        self
    }

    // --- accessors ---

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_type(&self) -> &str {
        &self.step_type
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn execution_order(&self) -> u32 {
        self.execution_order
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn input(&self) -> &HashMap<String, serde_json::Value> {
        &self.input
    }

    pub fn output(&self) -> &HashMap<String, serde_json::Value> {
        &self.output
    }

    pub fn last_error(&self) -> Option<&WorkflowError> {
        self.last_error.as_ref()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn compensation(&self) -> Option<&CompensationSpec> {
        self.compensation.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn compensated_at(&self) -> Option<DateTime<Utc>> {
        self.compensated_at
    }

    // --- transitions ---

    /// Start executing. Valid from PENDING (first attempt or a scheduled
    /// retry) and from FAILED (an immediate retry); retry bookkeeping is
    /// consumed here.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            StepStatus::Pending => {
                if self.retry_pending {
                    self.retry_count += 1;
                    self.retry_pending = false;
                }
            }
            StepStatus::Failed => {
                self.retry_count += 1;
                self.retry_pending = false;
                self.last_error = None;
                self.completed_at = None;
            }
            _ => return Err(self.invalid_transition("start")),
        }
        self.status = StepStatus::Executing;
        self.started_at = Some(now);
        Ok(())
    }

    /// Record a successful execution.
    pub fn complete(&mut self, outcome: StepOutcome, now: DateTime<Utc>) -> Result<()> {
        if self.status != StepStatus::Executing {
            return Err(self.invalid_transition("complete"));
        }
        self.status = StepStatus::Completed;
        self.output = outcome.output.clone();
        self.last_outcome = Some(outcome);
        self.last_error = None;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Record a failed execution.
    pub fn fail(&mut self, error: WorkflowError, now: DateTime<Utc>) -> Result<()> {
        if self.status != StepStatus::Executing {
            return Err(self.invalid_transition("fail"));
        }
        self.status = StepStatus::Failed;
        self.last_error = Some(error);
        self.completed_at = Some(now);
        Ok(())
    }

    /// Skip a step that is currently executing.
    pub fn skip(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != StepStatus::Executing {
            return Err(self.invalid_transition("skip"));
        }
        self.status = StepStatus::Skipped;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Return a failed step to PENDING so the scheduler can re-admit it.
    /// The retry counter increments on the next `start`.
    pub fn reset_for_retry(&mut self) -> Result<()> {
        if !self.can_retry() {
            return Err(CascadeError::InvalidState(format!(
                "step '{}' cannot retry (status {}, {} of {} retries used)",
                self.id, self.status, self.retry_count, self.retry_policy.max_retries
            )));
        }
        self.status = StepStatus::Pending;
        self.retry_pending = true;
        self.last_error = None;
        self.started_at = None;
        self.completed_at = None;
        Ok(())
    }

    /// Begin compensating a completed step.
    pub fn begin_compensation(&mut self) -> Result<()> {
        if self.status != StepStatus::Completed {
            return Err(self.invalid_transition("begin_compensation"));
        }
        if self.compensation.is_none() {
            return Err(CascadeError::InvalidState(format!(
                "step '{}' has no compensation descriptor",
                self.id
            )));
        }
        self.status = StepStatus::Compensating;
        Ok(())
    }

    /// Record that compensation finished. A no-op on an already
    /// compensated step.
    pub fn mark_compensated(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status == StepStatus::Compensated {
            return Ok(());
        }
        if self.status != StepStatus::Compensating {
            return Err(self.invalid_transition("mark_compensated"));
        }
        self.status = StepStatus::Compensated;
        self.compensated = true;
        self.compensated_at = Some(now);
        Ok(())
    }

    // --- queries ---

    /// Whether this step may be retried right now.
    pub fn can_retry(&self) -> bool {
        self.status == StepStatus::Failed
            && self.retries_remaining() > 0
            && self.retry_policy.can_retry(self.retry_count)
    }

    /// Retries left in the budget.
    pub fn retries_remaining(&self) -> u32 {
        self.retry_policy.max_retries.saturating_sub(self.retry_count)
    }

    /// Whether this step must be compensated during backward recovery.
    pub fn requires_compensation(&self) -> bool {
        self.status == StepStatus::Completed && self.compensation.is_some()
    }

    /// Whether an executing step has exceeded its timeout.
    pub fn has_timed_out(&self, now: DateTime<Utc>) -> bool {
        if self.status != StepStatus::Executing {
            return false;
        }
        match self.started_at {
            Some(started) => {
                let elapsed = (now - started).to_std().unwrap_or(Duration::ZERO);
                elapsed > self.timeout
            }
            None => false,
        }
    }

    /// Delay the scheduler should wait before re-admitting this step.
    pub fn next_retry_delay(&self) -> Duration {
        self.retry_policy.delay_for_attempt(self.retry_count)
    }

    fn invalid_transition(&self, op: &str) -> CascadeError {
        CascadeError::InvalidState(format!(
            "step '{}' cannot {} from status {}",
            self.id, op, self.status
        ))
    }
}
