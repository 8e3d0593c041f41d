//! Testing utilities for cascade engines.
//!
//! Deterministic doubles for every port the core consumes:
//! - `ManualClock` pins and advances domain time by hand
//! - `ScriptedRemote` replays programmed outcomes per (service, operation)
//! - `RecordingPublisher` captures published envelopes for assertions
//! - `WorkflowBuilder` assembles workflow fixtures tersely
//!
//! Unit tests that only exercise the aggregate need none of this; these
//! doubles exist for execution-service and scheduler tests that cross the
//! port boundary.

mod builders;
mod clock;
mod publisher;
mod remote;

pub mod assertions;

pub use builders::WorkflowBuilder;
pub use clock::ManualClock;
pub use publisher::RecordingPublisher;
pub use remote::ScriptedRemote;
