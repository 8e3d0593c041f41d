//! Saga coordination: forward and backward recovery decisions.

mod coordinator;

pub use coordinator::SagaCoordinator;
