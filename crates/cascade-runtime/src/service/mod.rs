//! The workflow execution service: per-step entry points and the
//! lock/load/mutate/persist/publish pipeline.

mod execution;

pub use execution::{AdmissionOutcome, FailureRouting, WorkflowExecutionService};
