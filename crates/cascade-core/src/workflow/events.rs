use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::WorkflowError;
use super::kind::WorkflowKind;

/// Domain events emitted by the workflow aggregate and the load monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Started {
        workflow_id: String,
        definition_id: String,
        kind: WorkflowKind,
        correlation_id: Option<String>,
        started_at: DateTime<Utc>,
    },
    StepExecuted {
        workflow_id: String,
        step_id: String,
        step_name: String,
        output: HashMap<String, serde_json::Value>,
        at: DateTime<Utc>,
    },
    StepFailed {
        workflow_id: String,
        step_id: String,
        step_name: String,
        error: WorkflowError,
        will_retry: bool,
        retry_count: u32,
        at: DateTime<Utc>,
    },
    Failed {
        workflow_id: String,
        error: WorkflowError,
        failed_step_id: Option<String>,
        compensation_required: bool,
        at: DateTime<Utc>,
    },
    Completed {
        workflow_id: String,
        at: DateTime<Utc>,
        duration_ms: i64,
        total_steps: usize,
        outputs: HashMap<String, serde_json::Value>,
    },
    Paused {
        workflow_id: String,
        at: DateTime<Utc>,
        current_step_id: Option<String>,
        reason: Option<String>,
    },
    Resumed {
        workflow_id: String,
        at: DateTime<Utc>,
        from_step_id: Option<String>,
    },
    Cancelled {
        workflow_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
    Retried {
        workflow_id: String,
        retry_count: u32,
        at: DateTime<Utc>,
    },
    CompensationStarted {
        workflow_id: String,
        steps_to_compensate: Vec<String>,
        at: DateTime<Utc>,
        reason: Option<String>,
    },
    CompensationCompleted {
        workflow_id: String,
        compensated_steps: Vec<String>,
        successful: bool,
        at: DateTime<Utc>,
        error: Option<String>,
    },
    WavelessEnabled {
        workflow_id: String,
        batch_size: usize,
        interval_ms: u64,
        at: DateTime<Utc>,
    },
    LoadRebalanced {
        service_id: String,
        previous_load: f64,
        current_load: f64,
        service_loads: HashMap<String, f64>,
        at: DateTime<Utc>,
        reason: Option<String>,
    },
}

impl WorkflowEvent {
    /// Stable event type name carried on the envelope.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "workflow.started",
            Self::StepExecuted { .. } => "workflow.step.executed",
            Self::StepFailed { .. } => "workflow.step.failed",
            Self::Failed { .. } => "workflow.failed",
            Self::Completed { .. } => "workflow.completed",
            Self::Paused { .. } => "workflow.paused",
            Self::Resumed { .. } => "workflow.resumed",
            Self::Cancelled { .. } => "workflow.cancelled",
            Self::Retried { .. } => "workflow.retried",
            Self::CompensationStarted { .. } => "workflow.compensation.started",
            Self::CompensationCompleted { .. } => "workflow.compensation.completed",
            Self::WavelessEnabled { .. } => "workflow.waveless.enabled",
            Self::LoadRebalanced { .. } => "system.load.rebalanced",
        }
    }
}

/// Envelope wrapping an event for publication.
///
/// `event_id` is unique per emission; consumers deduplicate on it under
/// at-least-once delivery. `version` copies the aggregate version at
/// emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub aggregate_id: String,
    pub version: u64,
    pub event: WorkflowEvent,
}

impl EventEnvelope {
    /// Wrap an event for publication.
    pub fn new(
        aggregate_id: impl Into<String>,
        version: u64,
        occurred_at: DateTime<Utc>,
        event: WorkflowEvent,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event.event_type().to_string(),
            occurred_at,
            aggregate_id: aggregate_id.into(),
            version,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let now = Utc::now();
        let event = WorkflowEvent::Started {
            workflow_id: "w1".into(),
            definition_id: "d1".into(),
            kind: WorkflowKind::OrderFulfillment,
            correlation_id: None,
            started_at: now,
        };
        assert_eq!(event.event_type(), "workflow.started");

        let event = WorkflowEvent::CompensationCompleted {
            workflow_id: "w1".into(),
            compensated_steps: vec![],
            successful: true,
            at: now,
            error: None,
        };
        assert_eq!(event.event_type(), "workflow.compensation.completed");
    }

    #[test]
    fn test_envelope_carries_aggregate_version() {
        let now = Utc::now();
        let envelope = EventEnvelope::new(
            "w1",
            7,
            now,
            WorkflowEvent::Retried {
                workflow_id: "w1".into(),
                retry_count: 1,
                at: now,
            },
        );
        assert_eq!(envelope.aggregate_id, "w1");
        assert_eq!(envelope.version, 7);
        assert_eq!(envelope.event_type, "workflow.retried");
    }

    #[test]
    fn test_envelope_ids_are_unique() {
        let now = Utc::now();
        let event = WorkflowEvent::Cancelled {
            workflow_id: "w1".into(),
            reason: "operator".into(),
            at: now,
        };
        let a = EventEnvelope::new("w1", 1, now, event.clone());
        let b = EventEnvelope::new("w1", 1, now, event);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_envelope_serde_round_trip() {
        let now = Utc::now();
        let envelope = EventEnvelope::new(
            "w1",
            2,
            now,
            WorkflowEvent::StepExecuted {
                workflow_id: "w1".into(),
                step_id: "pick-items".into(),
                step_name: "Pick Items".into(),
                output: HashMap::new(),
                at: now,
            },
        );
        let json = serde_json::to_string(&envelope).unwrap();
        let back: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
    }
}
