//! End-to-end saga scenarios: happy path, forward recovery, backward
//! recovery, and partial compensation.

mod common;

use std::time::Duration;

use cascade_core::workflow::{EventEnvelope, WorkflowEvent, WorkflowStatus};
use cascade_core::{Clock, ErrorKind, RemoteCallError, WorkflowError, WorkflowRepository};
use cascade_runtime::AdmissionOutcome;
use common::Harness;

/// Drive a workflow to a terminal admission outcome, bounded.
async fn drive(harness: &Harness, id: &str) -> AdmissionOutcome {
    for _ in 0..20 {
        let outcome = harness.service.admit(id).await.unwrap();
        match outcome {
            AdmissionOutcome::StepExecuted(_) => continue,
            AdmissionOutcome::RetryScheduled { delay, .. } => {
                harness.clock.advance(delay + Duration::from_millis(1));
                continue;
            }
            terminal => return terminal,
        }
    }
    panic!("workflow '{}' did not reach a terminal outcome", id);
}

/// Rebuild the terminal status from the published event stream alone.
fn project_status(events: &[EventEnvelope]) -> Option<WorkflowStatus> {
    let mut status = None;
    for envelope in events {
        status = Some(match &envelope.event {
            WorkflowEvent::Started { .. } => WorkflowStatus::Executing,
            WorkflowEvent::StepExecuted { .. } | WorkflowEvent::StepFailed { .. } => {
                continue;
            }
            WorkflowEvent::Completed { .. } => WorkflowStatus::Completed,
            WorkflowEvent::Failed { .. } => WorkflowStatus::Failed,
            WorkflowEvent::Paused { .. } => WorkflowStatus::Paused,
            WorkflowEvent::Resumed { .. } => WorkflowStatus::Executing,
            WorkflowEvent::Retried { .. } => WorkflowStatus::Executing,
            WorkflowEvent::Cancelled { .. } => WorkflowStatus::Cancelled,
            WorkflowEvent::CompensationStarted { .. } => WorkflowStatus::Compensating,
            WorkflowEvent::CompensationCompleted { .. } => WorkflowStatus::Compensated,
            WorkflowEvent::WavelessEnabled { .. } | WorkflowEvent::LoadRebalanced { .. } => {
                continue;
            }
        });
    }
    status
}

#[tokio::test]
async fn happy_order_fulfillment_completes_in_order() {
    let harness = Harness::new();
    let workflow = harness.fulfillment_workflow("w1");
    harness.service.submit(workflow).await.unwrap();

    let outcome = drive(&harness, "w1").await;
    assert_eq!(outcome, AdmissionOutcome::WorkflowCompleted);

    let stored = harness
        .repository
        .find_by_id("w1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), WorkflowStatus::Completed);
    assert_eq!(
        stored.executed_steps(),
        &["reserve-inventory", "assign-robot", "pick-items"]
    );
    assert!(stored.compensated_steps().is_empty());

    assert_eq!(
        harness.bus.event_types(),
        vec![
            "workflow.started",
            "workflow.step.executed",
            "workflow.step.executed",
            "workflow.step.executed",
            "workflow.completed",
        ]
    );

    // Replaying the event stream reconstructs the terminal status.
    assert_eq!(
        project_status(&harness.bus.published_for("w1")),
        Some(WorkflowStatus::Completed)
    );
}

#[tokio::test]
async fn forward_recovery_retries_timed_out_step() {
    let harness = Harness::new();
    let workflow = harness.fulfillment_workflow("w2");
    harness.service.submit(workflow).await.unwrap();

    // First assignment attempt times out; the second succeeds.
    harness.remote.script(
        "robot-service",
        "assign",
        Err(RemoteCallError::Timeout(5000)),
    );

    // Start + first step.
    assert_eq!(
        harness.service.admit("w2").await.unwrap(),
        AdmissionOutcome::StepExecuted("reserve-inventory".into())
    );

    // Failing step schedules a retry with the default policy's first delay.
    let outcome = harness.service.admit("w2").await.unwrap();
    assert_eq!(
        outcome,
        AdmissionOutcome::RetryScheduled {
            step_id: "assign-robot".into(),
            delay: Duration::from_secs(1),
        }
    );

    // Not due yet: admission yields.
    assert_eq!(
        harness.service.admit("w2").await.unwrap(),
        AdmissionOutcome::Idle
    );

    // Once due, the step runs again and the workflow completes.
    harness.clock.advance(Duration::from_secs(2));
    assert_eq!(
        harness.service.admit("w2").await.unwrap(),
        AdmissionOutcome::StepExecuted("assign-robot".into())
    );
    assert_eq!(
        harness.service.admit("w2").await.unwrap(),
        AdmissionOutcome::WorkflowCompleted
    );

    let stored = harness
        .repository
        .find_by_id("w2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), WorkflowStatus::Completed);
    assert_eq!(stored.step("assign-robot").unwrap().retry_count(), 1);

    let failed_events: Vec<EventEnvelope> = harness
        .bus
        .published()
        .into_iter()
        .filter(|e| e.event_type == "workflow.step.failed")
        .collect();
    assert_eq!(failed_events.len(), 1);
    match &failed_events[0].event {
        WorkflowEvent::StepFailed {
            will_retry,
            retry_count,
            error,
            ..
        } => {
            assert!(*will_retry);
            assert_eq!(*retry_count, 1);
            assert_eq!(error.kind, ErrorKind::Timeout);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn backward_recovery_compensates_in_reverse_order() {
    let harness = Harness::new();
    let workflow = harness.fulfillment_workflow("w3");
    harness.service.submit(workflow).await.unwrap();

    // Run the two compensatable steps.
    harness.service.admit("w3").await.unwrap();
    harness.service.admit("w3").await.unwrap();

    // The pick fails a business rule, reported through the external entry
    // point; this is non-recoverable and obliges compensation.
    harness.service.begin_step("w3", "pick-items").await.unwrap();
    let error = WorkflowError::new(
        ErrorKind::BusinessRuleViolation,
        "SHORT_PICK",
        "insufficient stock at location",
        harness.clock.now(),
    );
    harness
        .service
        .handle_step_failure("w3", "pick-items", error)
        .await
        .unwrap();

    let stored = harness
        .repository
        .find_by_id("w3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), WorkflowStatus::Compensated);
    assert_eq!(
        stored.compensated_steps(),
        &["assign-robot", "reserve-inventory"]
    );

    // Compensating calls hit the reverse operations on the right services.
    assert_eq!(harness.remote.call_count("robot-service", "undo-assign"), 1);
    assert_eq!(
        harness.remote.call_count("inventory-service", "undo-reserve"),
        1
    );

    let events = harness.bus.published_for("w3");
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&"workflow.failed"));
    assert!(types.contains(&"workflow.compensation.started"));
    assert!(types.contains(&"workflow.compensation.completed"));

    let started = events
        .iter()
        .find(|e| e.event_type == "workflow.compensation.started")
        .unwrap();
    match &started.event {
        WorkflowEvent::CompensationStarted {
            steps_to_compensate,
            ..
        } => {
            assert_eq!(
                steps_to_compensate,
                &["assign-robot".to_string(), "reserve-inventory".to_string()]
            );
        }
        other => panic!("unexpected event {:?}", other),
    }

    let completed = events
        .iter()
        .find(|e| e.event_type == "workflow.compensation.completed")
        .unwrap();
    match &completed.event {
        WorkflowEvent::CompensationCompleted {
            successful, error, ..
        } => {
            assert!(*successful);
            assert!(error.is_none());
        }
        other => panic!("unexpected event {:?}", other),
    }

    assert_eq!(
        project_status(&events),
        Some(WorkflowStatus::Compensated)
    );
}

#[tokio::test]
async fn partial_compensation_reports_failed_step() {
    let harness = Harness::new();
    let workflow = harness.fulfillment_workflow("w4");
    harness.service.submit(workflow).await.unwrap();

    harness.service.admit("w4").await.unwrap();
    harness.service.admit("w4").await.unwrap();

    // Releasing the reservation keeps failing past the compensation retry
    // bound (first call plus three retries).
    harness.remote.script_failures(
        "inventory-service",
        "undo-reserve",
        RemoteCallError::Unavailable("inventory down".into()),
        4,
    );

    harness.service.begin_step("w4", "pick-items").await.unwrap();
    let error = WorkflowError::new(
        ErrorKind::BusinessRuleViolation,
        "SHORT_PICK",
        "insufficient stock",
        harness.clock.now(),
    );
    harness
        .service
        .handle_step_failure("w4", "pick-items", error)
        .await
        .unwrap();

    let stored = harness
        .repository
        .find_by_id("w4")
        .await
        .unwrap()
        .unwrap();
    // Partial compensation still terminates.
    assert_eq!(stored.status(), WorkflowStatus::Compensated);
    assert_eq!(stored.compensated_steps(), &["assign-robot"]);

    let completed = harness
        .bus
        .published_for("w4")
        .into_iter()
        .find(|e| e.event_type == "workflow.compensation.completed")
        .unwrap();
    match completed.event {
        WorkflowEvent::CompensationCompleted {
            successful, error, ..
        } => {
            assert!(!successful);
            assert!(error.unwrap().contains("reserve-inventory"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn validation_failure_never_compensates() {
    let harness = Harness::new();
    let workflow = harness.fulfillment_workflow("w5");
    harness.service.submit(workflow).await.unwrap();

    harness.service.admit("w5").await.unwrap();

    // A validation rejection on the second step fails the workflow without
    // touching the completed first step.
    harness.remote.script(
        "robot-service",
        "assign",
        Err(RemoteCallError::Validation("unknown robot class".into())),
    );
    let outcome = harness.service.admit("w5").await.unwrap();
    assert_eq!(outcome, AdmissionOutcome::WorkflowFailed);

    let stored = harness
        .repository
        .find_by_id("w5")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), WorkflowStatus::Failed);
    assert!(stored.compensated_steps().is_empty());
    assert_eq!(harness.remote.call_count("inventory-service", "undo-reserve"), 0);
}

#[tokio::test]
async fn cancel_drains_further_progress() {
    let harness = Harness::new();
    let workflow = harness.fulfillment_workflow("w6");
    harness.service.submit(workflow).await.unwrap();

    harness.service.admit("w6").await.unwrap();
    harness.service.cancel("w6", "operator abort").await.unwrap();

    // Subsequent admissions observe the terminal status and do nothing.
    assert_eq!(
        harness.service.admit("w6").await.unwrap(),
        AdmissionOutcome::Skipped
    );
    let stored = harness
        .repository
        .find_by_id("w6")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), WorkflowStatus::Cancelled);
    assert_eq!(harness.remote.call_count("robot-service", "assign"), 0);
}
