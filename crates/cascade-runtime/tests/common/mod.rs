use std::sync::Arc;

use cascade_core::testing::{ManualClock, ScriptedRemote, WorkflowBuilder};
use cascade_core::Clock;
use cascade_core::workflow::Workflow;
use cascade_core::{LockConfig, Priority, WorkflowKind};
use cascade_runtime::store::{MemoryEventBus, MemoryLockManager, MemoryRepository};
use cascade_runtime::WorkflowExecutionService;

/// Everything a service-level test needs, with deterministic time.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub repository: Arc<MemoryRepository>,
    pub bus: Arc<MemoryEventBus>,
    pub locks: Arc<MemoryLockManager>,
    pub remote: Arc<ScriptedRemote>,
    pub service: Arc<WorkflowExecutionService>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::fixed());
        let repository = Arc::new(MemoryRepository::new(clock.clone()));
        let bus = Arc::new(MemoryEventBus::default());
        let locks = Arc::new(MemoryLockManager::new(clock.clone()));
        let remote = Arc::new(ScriptedRemote::new());
        let service = Arc::new(WorkflowExecutionService::new(
            repository.clone(),
            bus.clone(),
            remote.clone(),
            locks.clone(),
            clock.clone(),
            LockConfig::default(),
        ));
        Self {
            clock,
            repository,
            bus,
            locks,
            remote,
            service,
        }
    }

    /// The standard three-step order-fulfillment fixture: two compensatable
    /// steps followed by a plain one.
    pub fn fulfillment_workflow(&self, id: &str) -> Workflow {
        WorkflowBuilder::new(id)
            .kind(WorkflowKind::OrderFulfillment)
            .priority(Priority::Normal)
            .step("reserve-inventory", "inventory-service", "reserve")
            .step("assign-robot", "robot-service", "assign")
            .plain_step("pick-items", "picking-service", "pick")
            .build(self.clock.now())
    }
}
