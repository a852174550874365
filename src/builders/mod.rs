//! Construct queues and pools from configuration.

pub mod scheduler_builder;

pub use scheduler_builder::{build_pools, build_queues, QueueSet};
