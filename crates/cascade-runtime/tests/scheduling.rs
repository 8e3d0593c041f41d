//! Waveless scheduler behavior: priority-ordered admission, load gating,
//! batching bypass, retry re-admission and the stuck-step janitor.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cascade_core::testing::WorkflowBuilder;
use cascade_core::workflow::WorkflowStatus;
use cascade_core::Clock;
use cascade_core::{
    LoadController, LoadSnapshot, LoadTracker, Priority, RemoteCallError, RetryPolicy,
    SchedulerConfig, Step, WorkflowKind, WorkflowRepository,
};
use cascade_runtime::WavelessScheduler;
use common::Harness;

fn scheduler_for(harness: &Harness, config: SchedulerConfig, tracker: Arc<LoadTracker>) -> WavelessScheduler {
    WavelessScheduler::new(
        config,
        harness.service.clone(),
        harness.repository.clone(),
        tracker,
        LoadController::default(),
        harness.clock.clone(),
        "cascade-engine",
    )
}

fn engine_snapshot(harness: &Harness, cpu: f64, memory: f64, queue: u32, errors: f64) -> LoadSnapshot {
    LoadSnapshot {
        cpu_percent: cpu,
        memory_percent: memory,
        queue_depth: queue,
        error_rate: errors,
        ..LoadSnapshot::new("cascade-engine", harness.clock.now())
    }
}

fn single_step_workflow(harness: &Harness, id: &str, priority: Priority) -> cascade_core::Workflow {
    WorkflowBuilder::new(id)
        .kind(WorkflowKind::Picking)
        .priority(priority)
        .plain_step("pick", "picking-service", "pick")
        .build(harness.clock.now())
}

#[tokio::test]
async fn tick_admits_pending_workflows() {
    let harness = Harness::new();
    let tracker = Arc::new(LoadTracker::new());
    let scheduler = scheduler_for(&harness, SchedulerConfig::default(), tracker);

    for id in ["a", "b"] {
        harness
            .service
            .submit(single_step_workflow(&harness, id, Priority::Normal))
            .await
            .unwrap();
    }

    let queue_depth = scheduler.tick().await.unwrap();
    assert_eq!(queue_depth, 0);

    for id in ["a", "b"] {
        let stored = harness.repository.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status(), WorkflowStatus::Completed);
    }
}

#[tokio::test]
async fn admission_pauses_when_engine_is_saturated() {
    let harness = Harness::new();
    let tracker = Arc::new(LoadTracker::new());
    tracker.record(engine_snapshot(&harness, 100.0, 100.0, 1000, 1.0));
    let scheduler = scheduler_for(&harness, SchedulerConfig::default(), tracker);

    harness
        .service
        .submit(single_step_workflow(&harness, "a", Priority::Normal))
        .await
        .unwrap();

    let queue_depth = scheduler.tick().await.unwrap();
    assert_eq!(queue_depth, 1);
    let stored = harness.repository.find_by_id("a").await.unwrap().unwrap();
    assert_eq!(stored.status(), WorkflowStatus::Pending);
}

#[tokio::test]
async fn high_priority_bypasses_batching() {
    let harness = Harness::new();
    let tracker = Arc::new(LoadTracker::new());
    // Score 70: batch stays at the configured default of one.
    tracker.record(engine_snapshot(&harness, 100.0, 100.0, 500, 0.0));

    let config = SchedulerConfig {
        batch_size: 1,
        ..Default::default()
    };
    let scheduler = scheduler_for(&harness, config, tracker);

    harness
        .service
        .submit(single_step_workflow(&harness, "normal-1", Priority::Normal))
        .await
        .unwrap();
    harness
        .service
        .submit(single_step_workflow(&harness, "normal-2", Priority::Normal))
        .await
        .unwrap();
    harness
        .service
        .submit(single_step_workflow(&harness, "urgent", Priority::High))
        .await
        .unwrap();

    scheduler.tick().await.unwrap();

    // The high-priority workflow ran outside the batch; the batch itself
    // admitted exactly one of the normal ones.
    let urgent = harness
        .repository
        .find_by_id("urgent")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(urgent.status(), WorkflowStatus::Completed);
    assert_eq!(
        harness
            .repository
            .count_by_status(WorkflowStatus::Pending)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn due_retries_are_readmitted() {
    let harness = Harness::new();
    let tracker = Arc::new(LoadTracker::new());
    let scheduler = scheduler_for(&harness, SchedulerConfig::default(), tracker);

    harness
        .service
        .submit(single_step_workflow(&harness, "flaky", Priority::Normal))
        .await
        .unwrap();
    harness.remote.script(
        "picking-service",
        "pick",
        Err(RemoteCallError::Unavailable("picker offline".into())),
    );

    // First tick: the step fails and schedules a retry.
    scheduler.tick().await.unwrap();
    let stored = harness
        .repository
        .find_by_id("flaky")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), WorkflowStatus::Executing);
    assert!(stored.context().contains_key("retry.due_at"));

    // Second tick before the delay elapses: nothing changes.
    scheduler.tick().await.unwrap();
    let stored = harness
        .repository
        .find_by_id("flaky")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), WorkflowStatus::Executing);

    // Once due, the retry runs and the workflow completes.
    harness.clock.advance(Duration::from_secs(2));
    scheduler.tick().await.unwrap();
    let stored = harness
        .repository
        .find_by_id("flaky")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), WorkflowStatus::Completed);
}

#[tokio::test]
async fn janitor_surfaces_stuck_steps_as_timeouts() {
    let harness = Harness::new();
    let tracker = Arc::new(LoadTracker::new());
    let scheduler = scheduler_for(&harness, SchedulerConfig::default(), tracker);

    let workflow = WorkflowBuilder::new("stuck")
        .kind(WorkflowKind::Picking)
        .custom_step(
            Step::new("pick", "pick", "picking-service", "pick", 1)
                .with_timeout(Duration::from_secs(1))
                .with_retry_policy(RetryPolicy::default()),
        )
        .build(harness.clock.now());
    harness.service.submit(workflow).await.unwrap();

    // An external driver started the step and went silent.
    harness.service.start_workflow("stuck").await.unwrap();
    harness.service.begin_step("stuck", "pick").await.unwrap();

    harness.clock.advance(Duration::from_secs(5));
    scheduler.tick().await.unwrap();

    let stored = harness
        .repository
        .find_by_id("stuck")
        .await
        .unwrap()
        .unwrap();
    // The timeout surfaced as a recoverable failure and scheduled a retry.
    assert_eq!(stored.status(), WorkflowStatus::Executing);
    assert!(stored.context().contains_key("retry.due_at"));
    let failed = harness
        .bus
        .published_for("stuck")
        .into_iter()
        .any(|e| e.event_type == "workflow.step.failed");
    assert!(failed);
}
