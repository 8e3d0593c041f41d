use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use cascade_core::workflow::{StepOutcome, Workflow, WorkflowError, WorkflowStatus};
use cascade_core::{
    CascadeError, Clock, CompensationSpec, EventPublisher, LockConfig, LockManager,
    RemoteCallError, RemoteService, Result, SagaCoordinator, WorkflowRepository,
};

/// What one admission accomplished.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionOutcome {
    /// One step ran to completion; more remain.
    StepExecuted(String),
    /// A step failed and forward recovery scheduled a retry.
    RetryScheduled { step_id: String, delay: Duration },
    /// A step failed beyond recovery; backward recovery was driven.
    CompensationTriggered,
    /// Every step finished and the workflow completed.
    WorkflowCompleted,
    /// The workflow failed terminally with nothing to compensate.
    WorkflowFailed,
    /// The workflow was not in a runnable status.
    Skipped,
    /// Nothing runnable right now (e.g. a retry not yet due).
    Idle,
}

/// Where a step failure was routed.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureRouting {
    /// Forward recovery: the step retries after the given delay.
    Retry { step_id: String, delay: Duration },
    /// Backward recovery: compensation was triggered.
    Compensation,
    /// Terminal failure without compensation.
    Failed,
}

/// Per-step entry point into the engine.
///
/// Every mutation of one workflow runs the same pipeline: acquire the
/// per-workflow lock, load, mutate through the aggregate, persist with the
/// optimistic version check, publish the drained outbox in order, release.
/// If persistence fails the outbox is never published.
pub struct WorkflowExecutionService {
    repository: Arc<dyn WorkflowRepository>,
    publisher: Arc<dyn EventPublisher>,
    remote: Arc<dyn RemoteService>,
    locks: Arc<dyn LockManager>,
    clock: Arc<dyn Clock>,
    coordinator: SagaCoordinator,
    lock_config: LockConfig,
    in_flight: Arc<AtomicU32>,
}

impl WorkflowExecutionService {
    pub fn new(
        repository: Arc<dyn WorkflowRepository>,
        publisher: Arc<dyn EventPublisher>,
        remote: Arc<dyn RemoteService>,
        locks: Arc<dyn LockManager>,
        clock: Arc<dyn Clock>,
        lock_config: LockConfig,
    ) -> Self {
        Self {
            repository,
            publisher,
            remote,
            locks,
            clock,
            coordinator: SagaCoordinator::new(),
            lock_config,
            in_flight: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Steps currently being driven by this process.
    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Shared in-flight counter handle for the engine's drain logic and
    /// the load monitor's active-request gauge.
    pub fn in_flight_handle(&self) -> Arc<AtomicU32> {
        self.in_flight.clone()
    }

    /// Persist a newly built workflow. It must not have started yet.
    pub async fn submit(&self, workflow: Workflow) -> Result<Workflow> {
        if workflow.status() != WorkflowStatus::Pending {
            return Err(CascadeError::Validation(format!(
                "workflow '{}' must be submitted in pending status, not {}",
                workflow.id(),
                workflow.status()
            )));
        }
        self.repository.save(workflow).await
    }

    /// Admission check: a workflow whose completed steps cannot all be
    /// compensated would strand work under backward recovery.
    pub fn check_consistency(&self, workflow: &Workflow) -> bool {
        self.coordinator.check_consistency(workflow)
    }

    /// Drive one unit of progress: start a pending workflow, then run its
    /// next step through the remote port and route the outcome.
    pub async fn admit(&self, id: &str) -> Result<AdmissionOutcome> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        self.acquire_lock(id).await?;
        let result = self.admit_locked(id).await;
        self.release_lock(id).await;

        match result {
            Ok(AdmissionOutcome::CompensationTriggered) => {
                self.drive_compensation(id).await?;
                Ok(AdmissionOutcome::CompensationTriggered)
            }
            other => other,
        }
    }

    async fn admit_locked(&self, id: &str) -> Result<AdmissionOutcome> {
        let mut workflow = self.load(id).await?;
        let now = self.clock.now();

        if workflow.status() == WorkflowStatus::Pending {
            self.coordinator.start_saga(&mut workflow, now)?;
            workflow = self.persist_and_publish(workflow).await?;
            tracing::info!(workflow_id = %id, kind = %workflow.kind(), "Workflow started");
        }

        if workflow.status() != WorkflowStatus::Executing {
            return Ok(AdmissionOutcome::Skipped);
        }

        // Honor a scheduled retry's due time.
        if let Some(due) = retry_due_at(&workflow) {
            if now < due {
                return Ok(AdmissionOutcome::Idle);
            }
            workflow.remove_context("retry.step_id");
            workflow.remove_context("retry.due_at");
        }

        let Some(step_id) = workflow.next_step_id() else {
            if workflow.all_steps_completed() {
                self.coordinator.complete_saga(&mut workflow, now)?;
                self.persist_and_publish(workflow).await?;
                tracing::info!(workflow_id = %id, "Workflow completed");
                return Ok(AdmissionOutcome::WorkflowCompleted);
            }
            return Ok(AdmissionOutcome::Idle);
        };

        workflow.start_step(&step_id, now)?;
        let mut workflow = self.repository.save(workflow).await?;

        let step = workflow
            .step(&step_id)
            .expect("started step present")
            .clone();
        let payload = serde_json::to_value(step.input())?;
        let call = tokio::time::timeout(
            step.timeout(),
            self.remote.call(step.service(), step.operation(), payload),
        )
        .await
        .unwrap_or_else(|_| {
            Err(RemoteCallError::Timeout(step.timeout().as_millis() as u64))
        });

        let now = self.clock.now();
        match call {
            Ok(value) => {
                workflow.execute_step(&step_id, outcome_from_value(value), now)?;
                tracing::debug!(workflow_id = %id, step_id = %step_id, "Step executed");
                if workflow.all_steps_completed() {
                    self.coordinator.complete_saga(&mut workflow, now)?;
                    self.persist_and_publish(workflow).await?;
                    tracing::info!(workflow_id = %id, "Workflow completed");
                    Ok(AdmissionOutcome::WorkflowCompleted)
                } else {
                    self.persist_and_publish(workflow).await?;
                    Ok(AdmissionOutcome::StepExecuted(step_id))
                }
            }
            Err(remote_err) => {
                tracing::warn!(
                    workflow_id = %id,
                    step_id = %step_id,
                    service = %step.service(),
                    error = %remote_err,
                    "Step call failed"
                );
                let error = remote_err.into_workflow_error(step.service(), now);
                let routing =
                    route_failure(&self.coordinator, &mut workflow, &step_id, error, now)?;
                self.persist_and_publish(workflow).await?;
                Ok(match routing {
                    FailureRouting::Retry { step_id, delay } => {
                        AdmissionOutcome::RetryScheduled { step_id, delay }
                    }
                    FailureRouting::Compensation => AdmissionOutcome::CompensationTriggered,
                    FailureRouting::Failed => AdmissionOutcome::WorkflowFailed,
                })
            }
        }
    }

    /// Start a pending workflow without driving a step.
    pub async fn start_workflow(&self, id: &str) -> Result<()> {
        self.with_workflow(id, |workflow, now, coordinator| {
            coordinator.start_saga(workflow, now)
        })
        .await
    }

    /// Mark a step as executing on behalf of an external driver.
    pub async fn begin_step(&self, id: &str, step_id: &str) -> Result<()> {
        let step_id = step_id.to_string();
        self.with_workflow(id, move |workflow, now, _| {
            workflow.start_step(&step_id, now)
        })
        .await
    }

    /// Record a step result reported from outside. Returns `true` when the
    /// workflow completed with it.
    pub async fn execute_step(
        &self,
        id: &str,
        step_id: &str,
        outcome: StepOutcome,
    ) -> Result<bool> {
        let step_id = step_id.to_string();
        self.with_workflow(id, move |workflow, now, coordinator| {
            workflow.execute_step(&step_id, outcome, now)?;
            if workflow.all_steps_completed() {
                coordinator.complete_saga(workflow, now)?;
                return Ok(true);
            }
            Ok(false)
        })
        .await
    }

    /// Record a step failure reported from outside and route it through
    /// forward or backward recovery.
    pub async fn handle_step_failure(
        &self,
        id: &str,
        step_id: &str,
        error: WorkflowError,
    ) -> Result<FailureRouting> {
        let owned_step = step_id.to_string();
        let routing = self
            .with_workflow(id, move |workflow, now, coordinator| {
                route_failure(coordinator, workflow, &owned_step, error, now)
            })
            .await?;

        if routing == FailureRouting::Compensation {
            self.drive_compensation(id).await?;
        }
        Ok(routing)
    }

    /// Surface a stuck executing step as a recoverable timeout failure.
    /// Returns the routing applied, or `None` when the step had not
    /// exceeded its budget.
    pub async fn check_step_timeout(
        &self,
        id: &str,
        step_id: &str,
    ) -> Result<Option<FailureRouting>> {
        let owned_step = step_id.to_string();
        let routing = self
            .with_workflow(id, move |workflow, now, coordinator| {
                let timed_out = workflow
                    .step(&owned_step)
                    .map(|s| s.has_timed_out(now))
                    .unwrap_or(false);
                if !timed_out {
                    return Ok(None);
                }
                let error = WorkflowError::timeout(
                    format!("step '{}' exceeded its execution budget", owned_step),
                    now,
                );
                route_failure(coordinator, workflow, &owned_step, error, now).map(Some)
            })
            .await?;

        if routing == Some(FailureRouting::Compensation) {
            self.drive_compensation(id).await?;
        }
        Ok(routing)
    }

    /// Next runnable step id, per the definition's execution order.
    pub async fn next_step(&self, id: &str) -> Result<Option<String>> {
        Ok(self.load(id).await?.next_step_id())
    }

    /// Pause an executing workflow.
    pub async fn pause(&self, id: &str, reason: Option<String>) -> Result<()> {
        self.with_workflow(id, move |workflow, now, _| workflow.pause(reason, now))
            .await
    }

    /// Resume a paused workflow.
    pub async fn resume(&self, id: &str) -> Result<()> {
        self.with_workflow(id, |workflow, now, _| workflow.resume(now))
            .await
    }

    /// Cancel a workflow from any non-terminal state.
    pub async fn cancel(&self, id: &str, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.with_workflow(id, move |workflow, now, _| workflow.cancel(reason, now))
            .await
    }

    /// Retry a failed workflow within its retry budget.
    pub async fn retry_workflow(&self, id: &str) -> Result<()> {
        self.with_workflow(id, |workflow, now, _| workflow.retry(now))
            .await
    }

    /// Walk the executed log in reverse, invoking each step's compensation
    /// through the remote port within its retry bound. Failed compensations
    /// are skipped past; the terminal event reports them.
    pub async fn drive_compensation(&self, id: &str) -> Result<()> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        self.acquire_lock(id).await?;
        let result = self.compensate_locked(id).await;
        self.release_lock(id).await;
        result
    }

    async fn compensate_locked(&self, id: &str) -> Result<()> {
        let mut workflow = self.load(id).await?;
        if workflow.status() != WorkflowStatus::Compensating {
            return Ok(());
        }

        let pending = workflow.steps_requiring_compensation();
        let mut failures: Vec<String> = Vec::new();

        for step_id in pending {
            let (spec, payload) = match workflow.step(&step_id) {
                Some(step) => match step.compensation() {
                    Some(spec) => (spec.clone(), compensation_payload(spec, step.output())),
                    None => continue,
                },
                None => continue,
            };

            workflow.compensate_step(&step_id)?;

            if self.run_compensation_call(id, &step_id, &spec, payload).await {
                workflow.mark_step_compensated(&step_id, self.clock.now())?;
                tracing::info!(workflow_id = %id, step_id = %step_id, "Step compensated");
            } else {
                failures.push(step_id);
            }
        }

        let now = self.clock.now();
        if failures.is_empty() {
            workflow.complete_compensation(now)?;
            tracing::info!(workflow_id = %id, "Compensation completed");
        } else {
            tracing::error!(
                workflow_id = %id,
                failed_steps = ?failures,
                "Compensation completed partially"
            );
            workflow.fail_compensation(
                format!("compensation failed for steps: {}", failures.join(", ")),
                now,
            )?;
        }
        self.persist_and_publish(workflow).await?;
        Ok(())
    }

    /// One compensating call with its descriptor's retry bound and timeout.
    async fn run_compensation_call(
        &self,
        workflow_id: &str,
        step_id: &str,
        spec: &CompensationSpec,
        payload: serde_json::Value,
    ) -> bool {
        let mut attempts = 0u32;
        loop {
            let call = tokio::time::timeout(
                spec.timeout,
                self.remote
                    .call(&spec.service, &spec.operation, payload.clone()),
            )
            .await
            .unwrap_or_else(|_| {
                Err(RemoteCallError::Timeout(spec.timeout.as_millis() as u64))
            });

            match call {
                Ok(_) => return true,
                Err(e) => {
                    attempts += 1;
                    tracing::warn!(
                        workflow_id = %workflow_id,
                        step_id = %step_id,
                        attempt = attempts,
                        error = %e,
                        "Compensation call failed"
                    );
                    if attempts > spec.max_retries {
                        return false;
                    }
                }
            }
        }
    }

    async fn with_workflow<T, F>(&self, id: &str, mutate: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut Workflow, DateTime<Utc>, &SagaCoordinator) -> Result<T> + Send,
    {
        let _guard = InFlightGuard::enter(&self.in_flight);
        self.acquire_lock(id).await?;
        let result = self.mutate_locked(id, mutate).await;
        self.release_lock(id).await;
        result
    }

    async fn mutate_locked<T, F>(&self, id: &str, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Workflow, DateTime<Utc>, &SagaCoordinator) -> Result<T>,
    {
        let mut workflow = self.load(id).await?;
        let now = self.clock.now();
        let value = mutate(&mut workflow, now, &self.coordinator)?;
        self.persist_and_publish(workflow).await?;
        Ok(value)
    }

    async fn persist_and_publish(&self, mut workflow: Workflow) -> Result<Workflow> {
        let events = workflow.drain_events();
        let saved = self.repository.save(workflow).await?;
        for envelope in &events {
            if let Err(e) = self.publisher.publish(envelope).await {
                tracing::warn!(
                    event_type = %envelope.event_type,
                    aggregate_id = %envelope.aggregate_id,
                    error = %e,
                    "Failed to publish event"
                );
            }
        }
        Ok(saved)
    }

    async fn load(&self, id: &str) -> Result<Workflow> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| CascadeError::NotFound(format!("workflow '{}'", id)))
    }

    async fn acquire_lock(&self, id: &str) -> Result<()> {
        let ttl = self.lock_config.ttl();
        for attempt in 0..self.lock_config.acquire_attempts {
            if self.locks.try_acquire(id, ttl).await? {
                return Ok(());
            }
            if attempt + 1 < self.lock_config.acquire_attempts {
                tokio::time::sleep(self.lock_config.acquire_backoff() * (attempt + 1)).await;
            }
        }
        Err(CascadeError::LockUnavailable(format!("workflow '{}'", id)))
    }

    async fn release_lock(&self, id: &str) {
        if let Err(e) = self.locks.release(id).await {
            tracing::warn!(workflow_id = %id, error = %e, "Failed to release workflow lock");
        }
    }
}

/// Route a step failure into forward recovery (retry markers in the
/// context for the scheduler) or backward recovery (compensation).
fn route_failure(
    coordinator: &SagaCoordinator,
    workflow: &mut Workflow,
    step_id: &str,
    error: WorkflowError,
    now: DateTime<Utc>,
) -> Result<FailureRouting> {
    workflow.handle_step_failure(step_id, error.clone(), now)?;

    if let Some(delay) = coordinator.forward_recovery(workflow, step_id)? {
        let due = now + chrono::Duration::from_std(delay).unwrap_or_default();
        workflow.update_context("retry.step_id", step_id.into());
        workflow.update_context("retry.due_at", due.to_rfc3339().into());
        tracing::info!(
            workflow_id = %workflow.id(),
            step_id = %step_id,
            delay_ms = delay.as_millis() as u64,
            "Retry scheduled"
        );
        return Ok(FailureRouting::Retry {
            step_id: step_id.to_string(),
            delay,
        });
    }

    coordinator.fail_saga(workflow, error, now)?;
    if workflow.status() == WorkflowStatus::Compensating {
        Ok(FailureRouting::Compensation)
    } else {
        Ok(FailureRouting::Failed)
    }
}

/// RAII counter for steps this process is actively driving.
struct InFlightGuard {
    counter: Arc<AtomicU32>,
}

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicU32>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: counter.clone(),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Due time of a scheduled step retry, if any.
fn retry_due_at(workflow: &Workflow) -> Option<DateTime<Utc>> {
    workflow
        .context()
        .get("retry.due_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Interpret a remote response as a step outcome.
fn outcome_from_value(value: serde_json::Value) -> StepOutcome {
    let mut outcome = StepOutcome::ok();
    match value {
        serde_json::Value::Object(map) => {
            outcome.output = map.into_iter().collect();
        }
        serde_json::Value::Null => {}
        other => {
            outcome.output.insert("result".to_string(), other);
        }
    }
    outcome
}

/// Build the compensating call payload from the descriptor's parameter
/// mapping over the step output; an empty mapping forwards the whole
/// output.
fn compensation_payload(
    spec: &CompensationSpec,
    output: &HashMap<String, serde_json::Value>,
) -> serde_json::Value {
    if spec.parameter_mapping.is_empty() {
        return serde_json::json!(output);
    }
    let mapped: serde_json::Map<String, serde_json::Value> = spec
        .parameter_mapping
        .iter()
        .map(|(param, from)| {
            (
                param.clone(),
                output.get(from).cloned().unwrap_or(serde_json::Value::Null),
            )
        })
        .collect();
    serde_json::Value::Object(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::CompensationSpec;

    #[test]
    fn test_outcome_from_value_shapes() {
        let outcome = outcome_from_value(serde_json::json!({"a": 1}));
        assert_eq!(outcome.output.get("a"), Some(&1.into()));

        let outcome = outcome_from_value(serde_json::Value::Null);
        assert!(outcome.output.is_empty());

        let outcome = outcome_from_value(serde_json::json!(42));
        assert_eq!(outcome.output.get("result"), Some(&42.into()));
    }

    #[test]
    fn test_compensation_payload_mapping() {
        let mut output = HashMap::new();
        output.insert("reservation_id".to_string(), serde_json::json!("r-1"));
        output.insert("warehouse".to_string(), serde_json::json!("east"));

        let spec = CompensationSpec::reverse_of("inventory-service", "release")
            .map_parameter("reservation", "reservation_id")
            .map_parameter("missing", "not_there");
        let payload = compensation_payload(&spec, &output);
        assert_eq!(payload["reservation"], "r-1");
        assert_eq!(payload["missing"], serde_json::Value::Null);

        let passthrough = CompensationSpec::reverse_of("inventory-service", "release");
        let payload = compensation_payload(&passthrough, &output);
        assert_eq!(payload["reservation_id"], "r-1");
        assert_eq!(payload["warehouse"], "east");
    }
}
