//! Ports the engine consumes from external collaborators.
//!
//! Exact transports (document store, message bus, RPC stack, distributed
//! lock) live outside the core; adapters implement these traits.

mod clock;
mod lock;
mod publisher;
mod remote;
mod repository;

pub use clock::{Clock, SystemClock};
pub use lock::LockManager;
pub use publisher::EventPublisher;
pub use remote::{RemoteCallError, RemoteService};
pub use repository::WorkflowRepository;
