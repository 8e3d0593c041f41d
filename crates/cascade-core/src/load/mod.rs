//! Load scoring, tracking and balancing decisions.

mod controller;
mod snapshot;
mod tracker;

pub use controller::{HealthStatus, LoadController};
pub use snapshot::{LoadSnapshot, LoadThresholds};
pub use tracker::LoadTracker;
