//! Default in-memory adapters for the cascade ports.
//!
//! Production deployments back these ports with a document store, a
//! TTL cache and a message bus; those adapters live outside this
//! repository. The in-memory versions carry the same contracts (atomic
//! version check, TTL lease expiry, ordered publication) and serve tests
//! and single-process embeddings.

mod memory;

pub use memory::{MemoryEventBus, MemoryLockManager, MemoryRepository};
