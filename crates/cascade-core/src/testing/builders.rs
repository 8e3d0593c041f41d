use chrono::{DateTime, Utc};

use crate::workflow::{
    CompensationSpec, Priority, RetryPolicy, Step, Workflow, WorkflowKind,
};

/// Terse workflow fixture builder for tests.
///
/// Steps are numbered in insertion order; compensation defaults to a
/// reverse operation on the same service.
pub struct WorkflowBuilder {
    id: String,
    definition_id: String,
    name: String,
    kind: WorkflowKind,
    priority: Priority,
    correlation_id: Option<String>,
    max_retries: Option<u32>,
    steps: Vec<Step>,
}

impl WorkflowBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            definition_id: format!("{}-def", id),
            name: id.clone(),
            id,
            kind: WorkflowKind::OrderFulfillment,
            priority: Priority::Normal,
            correlation_id: None,
            max_retries: None,
            steps: Vec::new(),
        }
    }

    pub fn kind(mut self, kind: WorkflowKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Add a compensatable step calling `operation` on `service`.
    pub fn step(mut self, id: &str, service: &str, operation: &str) -> Self {
        let order = self.steps.len() as u32 + 1;
        self.steps.push(
            Step::new(id, id, service, operation, order).with_compensation(
                CompensationSpec::reverse_of(service, format!("undo-{}", operation)),
            ),
        );
        self
    }

    /// Add a step with no compensation descriptor.
    pub fn plain_step(mut self, id: &str, service: &str, operation: &str) -> Self {
        let order = self.steps.len() as u32 + 1;
        self.steps.push(Step::new(id, id, service, operation, order));
        self
    }

    /// Add a fully customized step.
    pub fn custom_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Override the retry policy of the last added step.
    pub fn last_step_retry(mut self, policy: RetryPolicy) -> Self {
        if let Some(step) = self.steps.pop() {
            self.steps.push(step.with_retry_policy(policy));
        }
        self
    }

    /// Build the workflow, created at `now`.
    pub fn build(self, now: DateTime<Utc>) -> Workflow {
        let mut workflow = Workflow::new(self.id, self.definition_id, self.name, self.kind, now)
            .with_priority(self.priority);
        if let Some(correlation_id) = self.correlation_id {
            workflow = workflow.with_correlation_id(correlation_id);
        }
        if let Some(max_retries) = self.max_retries {
            workflow = workflow.with_max_retries(max_retries);
        }
        for step in self.steps {
            workflow
                .add_step(step)
                .expect("WorkflowBuilder produced a duplicate step id");
        }
        workflow
    }
}
