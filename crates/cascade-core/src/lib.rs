//! cascade-core - the orchestration domain for long-running warehouse
//! workflows.
//!
//! Holds the workflow aggregate and its state machine, the step lifecycle,
//! the saga coordinator, load-balancing decision logic, configuration and
//! the ports the engine consumes. No I/O happens here: adapters and the
//! background loops live in `cascade-runtime`.

pub mod config;
pub mod error;
pub mod load;
pub mod ports;
pub mod saga;
pub mod workflow;

// Testing utilities - available when the "testing" feature is enabled or in
// test mode
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{
    CascadeConfig, EngineConfig, LoadConfig, LockConfig, RetryConfig, SchedulerConfig,
};
pub use error::{CascadeError, Result};
pub use load::{HealthStatus, LoadController, LoadSnapshot, LoadThresholds, LoadTracker};
pub use ports::{
    Clock, EventPublisher, LockManager, RemoteCallError, RemoteService, SystemClock,
    WorkflowRepository,
};
pub use saga::SagaCoordinator;
pub use workflow::{
    BackoffKind, CompensationSpec, CompensationStrategy, ErrorKind, EventEnvelope, Priority,
    RetryPolicy, Step, StepOutcome, StepStatus, Workflow, WorkflowDocument, WorkflowError,
    WorkflowEvent, WorkflowKind, WorkflowStatus,
};
