//! Concrete queues, one per resource class.
//!
//! - [`PriorityFifoQueue`]: model-inference calls.
//! - [`FairnessQueue`]: memory operations.
//! - [`CoalescingQueue`]: storage operations.

pub mod coalescing;
pub mod fairness;
pub mod priority_fifo;
pub(crate) mod selection;

pub use coalescing::{Coalescing, CoalescingQueue};
pub use fairness::{Fairness, FairnessQueue};
pub use priority_fifo::{PriorityFifo, PriorityFifoQueue, TOKEN_WINDOW};
