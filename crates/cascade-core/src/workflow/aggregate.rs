use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::WorkflowError;
use super::events::{EventEnvelope, WorkflowEvent};
use super::kind::WorkflowKind;
use super::priority::Priority;
use super::status::WorkflowStatus;
use super::step::{Step, StepOutcome, StepStatus};
use crate::error::{CascadeError, Result};

/// The workflow aggregate root.
///
/// Owns its ordered step table, executed- and compensated-step logs, error
/// log and pending event outbox. Every mutation goes through a guarded
/// method; transitions outside the workflow state machine are rejected with
/// `InvalidState` and leave the aggregate untouched. The aggregate performs
/// no I/O: callers persist it through the repository port and publish the
/// drained outbox after the write commits.
#[derive(Debug, Clone)]
pub struct Workflow {
    id: String,
    definition_id: String,
    name: String,
    kind: WorkflowKind,
    status: WorkflowStatus,
    priority: Priority,
    steps: Vec<Step>,
    executed_steps: Vec<String>,
    compensated_steps: Vec<String>,
    current_step_id: Option<String>,
    triggered_by: Option<String>,
    correlation_id: Option<String>,
    input: HashMap<String, serde_json::Value>,
    output: HashMap<String, serde_json::Value>,
    context: HashMap<String, serde_json::Value>,
    errors: Vec<WorkflowError>,
    retry_count: u32,
    max_retries: u32,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    pending_events: Vec<EventEnvelope>,
}

impl Workflow {
    /// Create a new pending workflow.
    pub fn new(
        id: impl Into<String>,
        definition_id: impl Into<String>,
        name: impl Into<String>,
        kind: WorkflowKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            definition_id: definition_id.into(),
            name: name.into(),
            kind,
            status: WorkflowStatus::Pending,
            priority: Priority::Normal,
            steps: Vec::new(),
            executed_steps: Vec::new(),
            compensated_steps: Vec::new(),
            current_step_id: None,
            triggered_by: None,
            correlation_id: None,
            input: HashMap::new(),
            output: HashMap::new(),
            context: HashMap::new(),
            errors: Vec::new(),
            retry_count: 0,
            max_retries: 3,
            started_at: None,
            completed_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
            pending_events: Vec::new(),
        }
    }

    /// Set the scheduling priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the correlation id linking this workflow to an upstream request.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Record who or what triggered this workflow.
    pub fn with_triggered_by(mut self, triggered_by: impl Into<String>) -> Self {
        self.triggered_by = Some(triggered_by.into());
        self
    }

    /// Override the workflow retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set an input parameter.
    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    /// Add a step to the table. Steps execute in `execution_order`; ids must
    /// be unique within the workflow.
    pub fn add_step(&mut self, step: Step) -> Result<()> {
        if self.steps.iter().any(|s| s.id() == step.id()) {
            return Err(CascadeError::Validation(format!(
                "duplicate step id '{}'",
                step.id()
            )));
        }
        self.steps.push(step);
        self.steps.sort_by_key(|s| s.execution_order());
        Ok(())
    }

    // --- accessors ---

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn definition_id(&self) -> &str {
        &self.definition_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> WorkflowKind {
        self.kind
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id() == step_id)
    }

    pub fn executed_steps(&self) -> &[String] {
        &self.executed_steps
    }

    pub fn compensated_steps(&self) -> &[String] {
        &self.compensated_steps
    }

    pub fn current_step_id(&self) -> Option<&str> {
        self.current_step_id.as_deref()
    }

    pub fn triggered_by(&self) -> Option<&str> {
        self.triggered_by.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn input(&self) -> &HashMap<String, serde_json::Value> {
        &self.input
    }

    pub fn output(&self) -> &HashMap<String, serde_json::Value> {
        &self.output
    }

    pub fn context(&self) -> &HashMap<String, serde_json::Value> {
        &self.context
    }

    pub fn errors(&self) -> &[WorkflowError] {
        &self.errors
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Wall-clock duration from start to completion, in milliseconds.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }

    /// Events produced since the last drain, in emission order.
    pub fn pending_events(&self) -> &[EventEnvelope] {
        &self.pending_events
    }

    /// Take the pending events, leaving the outbox empty. Called by the
    /// execution service after a successful persist.
    pub fn drain_events(&mut self) -> Vec<EventEnvelope> {
        std::mem::take(&mut self.pending_events)
    }

    // --- lifecycle transitions ---

    /// Start the workflow.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(WorkflowStatus::Executing, "start")?;
        self.started_at = Some(now);
        self.retry_count = 0;
        self.emit(
            WorkflowEvent::Started {
                workflow_id: self.id.clone(),
                definition_id: self.definition_id.clone(),
                kind: self.kind,
                correlation_id: self.correlation_id.clone(),
                started_at: now,
            },
            now,
        );
        Ok(())
    }

    /// Begin executing one step.
    pub fn start_step(&mut self, step_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.require_status(WorkflowStatus::Executing, "start_step")?;
        self.step_mut(step_id)?.start(now)?;
        self.current_step_id = Some(step_id.to_string());
        Ok(())
    }

    /// Record a successful step execution and advance the current step.
    pub fn execute_step(
        &mut self,
        step_id: &str,
        outcome: StepOutcome,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.require_status(WorkflowStatus::Executing, "execute_step")?;

        let (step_name, step_output) = {
            let step = self.step_mut(step_id)?;
            step.complete(outcome, now)?;
            (step.name().to_string(), step.output().clone())
        };

        if !self.executed_steps.iter().any(|id| id == step_id) {
            self.executed_steps.push(step_id.to_string());
        }
        for (key, value) in &step_output {
            self.output.insert(key.clone(), value.clone());
        }
        self.current_step_id = self.next_step_id();

        self.emit(
            WorkflowEvent::StepExecuted {
                workflow_id: self.id.clone(),
                step_id: step_id.to_string(),
                step_name,
                output: step_output,
                at: now,
            },
            now,
        );
        Ok(())
    }

    /// Record a step failure. Emits `StepFailed` with the retry decision;
    /// non-recoverable failures also fail the workflow.
    pub fn handle_step_failure(
        &mut self,
        step_id: &str,
        error: WorkflowError,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.require_status(WorkflowStatus::Executing, "handle_step_failure")?;

        let error = error.with_step(step_id);
        let (step_name, will_retry, retry_count) = {
            let recoverable = error.recoverable;
            let step = self.step_mut(step_id)?;
            step.fail(error.clone(), now)?;
            let will_retry = recoverable && step.can_retry();
            let retry_count = if will_retry {
                step.retry_count() + 1
            } else {
                step.retry_count()
            };
            (step.name().to_string(), will_retry, retry_count)
        };

        self.emit(
            WorkflowEvent::StepFailed {
                workflow_id: self.id.clone(),
                step_id: step_id.to_string(),
                step_name,
                error: error.clone(),
                will_retry,
                retry_count,
                at: now,
            },
            now,
        );

        if !will_retry && !error.recoverable {
            self.fail(error, now)?;
        }
        Ok(())
    }

    /// Return a failed step to pending for re-admission.
    pub fn retry_step(&mut self, step_id: &str) -> Result<()> {
        let step = self.step_mut(step_id)?;
        step.reset_for_retry()?;
        self.current_step_id = Some(step_id.to_string());
        Ok(())
    }

    /// Fail the workflow.
    pub fn fail(&mut self, error: WorkflowError, now: DateTime<Utc>) -> Result<()> {
        self.transition(WorkflowStatus::Failed, "fail")?;
        self.completed_at = Some(now);
        let compensation_required =
            error.requires_compensation() && !self.executed_steps.is_empty();
        self.errors.push(error.clone());
        self.emit(
            WorkflowEvent::Failed {
                workflow_id: self.id.clone(),
                failed_step_id: error.step_id.clone(),
                error,
                compensation_required,
                at: now,
            },
            now,
        );
        Ok(())
    }

    /// Enter backward recovery. A no-op when compensation already started.
    pub fn compensate(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status == WorkflowStatus::Compensating {
            return Ok(());
        }
        self.transition(WorkflowStatus::Compensating, "compensate")?;
        let reason = self.errors.last().map(|e| e.message.clone());
        self.emit(
            WorkflowEvent::CompensationStarted {
                workflow_id: self.id.clone(),
                steps_to_compensate: self.steps_requiring_compensation(),
                at: now,
                reason,
            },
            now,
        );
        Ok(())
    }

    /// Begin compensating one completed step.
    pub fn compensate_step(&mut self, step_id: &str) -> Result<()> {
        self.require_status(WorkflowStatus::Compensating, "compensate_step")?;
        self.step_mut(step_id)?.begin_compensation()
    }

    /// Record that one step's compensation finished. Idempotent per step:
    /// an already compensated step is left untouched and not re-logged.
    pub fn mark_step_compensated(&mut self, step_id: &str, now: DateTime<Utc>) -> Result<()> {
        let step = self.step_mut(step_id)?;
        if step.status() == StepStatus::Compensated {
            return Ok(());
        }
        step.mark_compensated(now)?;
        if !self.compensated_steps.iter().any(|id| id == step_id) {
            self.compensated_steps.push(step_id.to_string());
        }
        Ok(())
    }

    /// Finish backward recovery with every required step compensated.
    pub fn complete_compensation(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(WorkflowStatus::Compensated, "complete_compensation")?;
        self.completed_at = Some(now);
        self.emit(
            WorkflowEvent::CompensationCompleted {
                workflow_id: self.id.clone(),
                compensated_steps: self.compensated_steps.clone(),
                successful: true,
                at: now,
                error: None,
            },
            now,
        );
        Ok(())
    }

    /// Finish backward recovery after one or more compensations failed.
    /// Partial compensation still reaches a terminal state; the event
    /// reports `successful = false` for out-of-band reconciliation.
    pub fn fail_compensation(
        &mut self,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.transition(WorkflowStatus::Compensated, "fail_compensation")?;
        self.completed_at = Some(now);
        self.emit(
            WorkflowEvent::CompensationCompleted {
                workflow_id: self.id.clone(),
                compensated_steps: self.compensated_steps.clone(),
                successful: false,
                at: now,
                error: Some(message.into()),
            },
            now,
        );
        Ok(())
    }

    /// Retry the whole workflow after a failure. Failed steps return to
    /// pending without consuming their own retry budget: the workflow-level
    /// retry is a fresh lease on the step.
    pub fn retry(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.retry_count >= self.max_retries {
            return Err(CascadeError::InvalidState(format!(
                "workflow '{}' exhausted its retry budget ({} of {})",
                self.id, self.retry_count, self.max_retries
            )));
        }
        self.transition(WorkflowStatus::Executing, "retry")?;
        self.retry_count += 1;
        self.errors.clear();
        self.completed_at = None;
        for step in &mut self.steps {
            if step.status == StepStatus::Failed {
                step.status = StepStatus::Pending;
                step.last_error = None;
                step.started_at = None;
                step.completed_at = None;
            }
        }
        self.emit(
            WorkflowEvent::Retried {
                workflow_id: self.id.clone(),
                retry_count: self.retry_count,
                at: now,
            },
            now,
        );
        Ok(())
    }

    /// Pause an executing workflow.
    pub fn pause(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition(WorkflowStatus::Paused, "pause")?;
        self.emit(
            WorkflowEvent::Paused {
                workflow_id: self.id.clone(),
                at: now,
                current_step_id: self.current_step_id.clone(),
                reason,
            },
            now,
        );
        Ok(())
    }

    /// Resume a paused workflow.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require_status(WorkflowStatus::Paused, "resume")?;
        self.transition(WorkflowStatus::Executing, "resume")?;
        self.emit(
            WorkflowEvent::Resumed {
                workflow_id: self.id.clone(),
                at: now,
                from_step_id: self.current_step_id.clone(),
            },
            now,
        );
        Ok(())
    }

    /// Cancel the workflow. Allowed from any non-terminal state; cancel
    /// wins over concurrent completion because both run under the
    /// per-workflow lock and terminal states absorb later mutations.
    pub fn cancel(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(CascadeError::InvalidState(format!(
                "workflow '{}' cannot cancel from terminal status {}",
                self.id, self.status
            )));
        }
        self.status = WorkflowStatus::Cancelled;
        self.completed_at = Some(now);
        self.emit(
            WorkflowEvent::Cancelled {
                workflow_id: self.id.clone(),
                reason: reason.into(),
                at: now,
            },
            now,
        );
        Ok(())
    }

    /// Complete the workflow.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(WorkflowStatus::Completed, "complete")?;
        self.completed_at = Some(now);
        self.emit(
            WorkflowEvent::Completed {
                workflow_id: self.id.clone(),
                at: now,
                duration_ms: self.duration_ms().unwrap_or(0),
                total_steps: self.steps.len(),
                outputs: self.output.clone(),
            },
            now,
        );
        Ok(())
    }

    /// Set a value in the execution context. Emits nothing.
    pub fn update_context(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), value);
    }

    /// Remove a value from the execution context. Emits nothing.
    pub fn remove_context(&mut self, key: &str) {
        self.context.remove(key);
    }

    /// Whether this workflow may switch to waveless processing.
    pub fn can_transition_to_waveless(&self) -> bool {
        self.kind.supports_waveless()
            && self.status == WorkflowStatus::Executing
            && self.priority == Priority::High
    }

    /// Switch to waveless processing, recording the batch configuration.
    pub fn transition_to_waveless(
        &mut self,
        batch_size: usize,
        interval_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.can_transition_to_waveless() {
            return Err(CascadeError::InvalidState(format!(
                "workflow '{}' is not eligible for waveless processing",
                self.id
            )));
        }
        self.context
            .insert("waveless.batch_size".into(), batch_size.into());
        self.context
            .insert("waveless.interval_ms".into(), interval_ms.into());
        self.emit(
            WorkflowEvent::WavelessEnabled {
                workflow_id: self.id.clone(),
                batch_size,
                interval_ms,
                at: now,
            },
            now,
        );
        Ok(())
    }

    // --- queries ---

    /// Percentage of steps that finished (completed or skipped).
    pub fn progress_percent(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        let done = self
            .steps
            .iter()
            .filter(|s| matches!(s.status(), StepStatus::Completed | StepStatus::Skipped))
            .count();
        done as f64 / self.steps.len() as f64 * 100.0
    }

    /// Share of this workflow's steps still outstanding, as a percentage.
    pub fn system_load_percent(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        100.0 - self.progress_percent()
    }

    /// Whether the workflow as a whole exceeded the given wall-clock limit.
    pub fn has_timed_out(&self, limit: Duration, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match self.started_at {
            Some(started) => {
                let elapsed = (now - started).to_std().unwrap_or(Duration::ZERO);
                elapsed > limit
            }
            None => false,
        }
    }

    /// Step ids requiring compensation, in strict reverse executed order.
    /// The executed log itself is append-only; this walks a reversed view.
    pub fn steps_requiring_compensation(&self) -> Vec<String> {
        self.executed_steps
            .iter()
            .rev()
            .filter(|id| {
                self.step(id)
                    .map(|s| s.requires_compensation())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Whether every step reached a completed or skipped state.
    pub fn all_steps_completed(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status(), StepStatus::Completed | StepStatus::Skipped))
    }

    /// The next step eligible to run: lowest execution order still pending
    /// whose declared dependencies all appear in the executed log. `None`
    /// means no step is runnable; the caller checks `all_steps_completed`
    /// to distinguish done from stuck.
    pub fn next_step_id(&self) -> Option<String> {
        self.steps
            .iter()
            .find(|s| {
                s.status() == StepStatus::Pending
                    && s.depends_on()
                        .iter()
                        .all(|dep| self.executed_steps.iter().any(|id| id == dep))
            })
            .map(|s| s.id().to_string())
    }

    // --- internals ---

    fn step_mut(&mut self, step_id: &str) -> Result<&mut Step> {
        let id = self.id.clone();
        self.steps
            .iter_mut()
            .find(|s| s.id() == step_id)
            .ok_or_else(|| {
                CascadeError::NotFound(format!("step '{}' in workflow '{}'", step_id, id))
            })
    }

    fn require_status(&self, expected: WorkflowStatus, op: &str) -> Result<()> {
        if self.status != expected {
            return Err(CascadeError::InvalidState(format!(
                "workflow '{}' cannot {} from status {} (expected {})",
                self.id, op, self.status, expected
            )));
        }
        Ok(())
    }

    fn transition(&mut self, next: WorkflowStatus, op: &str) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CascadeError::InvalidState(format!(
                "workflow '{}' cannot {}: {} -> {} is not a legal transition",
                self.id, op, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    fn emit(&mut self, event: WorkflowEvent, occurred_at: DateTime<Utc>) {
        self.pending_events.push(EventEnvelope::new(
            self.id.clone(),
            self.version,
            occurred_at,
            event,
        ));
    }
}

// --- persisted form ---

/// Persisted representation of a workflow.
///
/// Plain data for the repository boundary; behavior lives on `Workflow`.
/// The pending event outbox is deliberately absent: events are published
/// after the write commits, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub id: String,
    pub definition_id: String,
    pub name: String,
    pub kind: WorkflowKind,
    pub status: WorkflowStatus,
    pub priority: Priority,
    pub steps: Vec<Step>,
    pub executed_steps: Vec<String>,
    pub compensated_steps: Vec<String>,
    pub current_step_id: Option<String>,
    pub triggered_by: Option<String>,
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub input: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub output: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<WorkflowError>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Snapshot into the persisted form.
    pub fn to_document(&self) -> WorkflowDocument {
        WorkflowDocument {
            id: self.id.clone(),
            definition_id: self.definition_id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            status: self.status,
            priority: self.priority,
            steps: self.steps.clone(),
            executed_steps: self.executed_steps.clone(),
            compensated_steps: self.compensated_steps.clone(),
            current_step_id: self.current_step_id.clone(),
            triggered_by: self.triggered_by.clone(),
            correlation_id: self.correlation_id.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            context: self.context.clone(),
            errors: self.errors.clone(),
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            started_at: self.started_at,
            completed_at: self.completed_at,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Rehydrate from the persisted form. The outbox starts empty.
    pub fn from_document(doc: WorkflowDocument) -> Self {
        Self {
            id: doc.id,
            definition_id: doc.definition_id,
            name: doc.name,
            kind: doc.kind,
            status: doc.status,
            priority: doc.priority,
            steps: doc.steps,
            executed_steps: doc.executed_steps,
            compensated_steps: doc.compensated_steps,
            current_step_id: doc.current_step_id,
            triggered_by: doc.triggered_by,
            correlation_id: doc.correlation_id,
            input: doc.input,
            output: doc.output,
            context: doc.context,
            errors: doc.errors,
            retry_count: doc.retry_count,
            max_retries: doc.max_retries,
            started_at: doc.started_at,
            completed_at: doc.completed_at,
            version: doc.version,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            pending_events: Vec::new(),
        }
    }
}
