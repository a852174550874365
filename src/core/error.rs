//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::work_item::{WorkId, WorkState};

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The queue does not implement the requested selection policy.
    #[error("queue `{queue}` does not support policy {policy}")]
    UnsupportedPolicy {
        /// Queue kind that rejected the switch.
        queue: String,
        /// Requested policy.
        policy: String,
    },
    /// The item is not in a state that allows the requested transition.
    #[error("work item {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        /// Item identifier.
        id: WorkId,
        /// Current state.
        from: WorkState,
        /// Requested state.
        to: WorkState,
    },
    /// No pool is registered under the given name.
    #[error("pool not found: {0}")]
    PoolNotFound(String),
    /// A pool with the same name already exists.
    #[error("pool already exists: {0}")]
    DuplicatePool(String),
    /// The pool has been stopped and no longer accepts work.
    #[error("pool has been shut down: {0}")]
    PoolShutdown(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An event could not be delivered to its sink.
    #[error("event publish failed: {0}")]
    EventPublish(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Reasons a best-effort CPU pinning request could not be honoured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AffinityError {
    /// The platform does not expose core identifiers.
    #[error("core ids are not available on this platform")]
    NoCoreIds,
    /// The requested CPU is not among the available cores.
    #[error("cpu {0} is not available")]
    CoreNotAvailable(usize),
    /// The operating system refused the pinning request.
    #[error("pinning to cpu {0} was rejected")]
    Rejected(usize),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
