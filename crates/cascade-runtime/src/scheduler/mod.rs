//! Continuous, priority-ordered admission of pending workflows.

mod waveless;

pub use waveless::{order_candidates, WavelessScheduler};
