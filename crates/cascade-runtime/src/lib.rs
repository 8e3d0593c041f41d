//! cascade-runtime - the multi-threaded runtime around `cascade-core`.
//!
//! Hosts the workflow execution service (per-workflow lock, load, mutate,
//! persist, publish), the waveless scheduler and load monitor loops, the
//! in-memory default adapters for the ports, and the engine that wires and
//! supervises everything.

pub mod engine;
pub mod monitor;
pub mod scheduler;
pub mod service;
pub mod store;

pub use engine::{Engine, EngineBuilder};
pub use monitor::LoadMonitor;
pub use scheduler::{order_candidates, WavelessScheduler};
pub use service::{AdmissionOutcome, FailureRouting, WorkflowExecutionService};
pub use store::{MemoryEventBus, MemoryLockManager, MemoryRepository};

/// Install a default tracing subscriber honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
