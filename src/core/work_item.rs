//! Work items: the request envelope every queue schedules.
//!
//! A [`WorkItem`] pairs scheduling metadata ([`WorkMeta`]) with an opaque
//! caller payload. Queues read only the metadata, with one exception: the
//! coalescing queue asks the payload for its [`StorageTag`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::error::SchedulerError;

static NEXT_WORK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique work item identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkId(pub u64);

impl WorkId {
    /// Allocate the next identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_WORK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority levels. Lower ordinal is more urgent, so `Critical < Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Must run before anything else.
    Critical = 0,
    /// Latency sensitive.
    High = 1,
    /// Default level.
    #[default]
    Normal = 2,
    /// Background work.
    Low = 3,
}

impl Priority {
    /// Numeric ordinal (0 = most urgent).
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Build a priority from its ordinal, clamping anything past `Low`.
    #[must_use]
    pub const fn from_ordinal(ordinal: u8) -> Self {
        match ordinal {
            0 => Self::Critical,
            1 => Self::High,
            2 => Self::Normal,
            _ => Self::Low,
        }
    }

    /// Promote by `levels`, clamped at `Critical`.
    #[must_use]
    pub fn promoted(self, levels: u32) -> Self {
        let levels = u8::try_from(levels).unwrap_or(u8::MAX);
        Self::from_ordinal(self.ordinal().saturating_sub(levels))
    }
}

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    /// Created, not yet handed to a queue.
    Pending,
    /// Held in a queue's pending set.
    Queued,
    /// Selected by a worker.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an execution failure.
    Failed,
    /// Execution exceeded the caller's timeout.
    Timeout,
    /// Withdrawn before it started.
    Cancelled,
}

impl WorkState {
    /// Whether the state is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }

    /// Whether the lifecycle graph allows `self -> next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Queued | Self::Cancelled)
                | (Self::Queued, Self::Running | Self::Cancelled)
                | (Self::Running, Self::Completed | Self::Failed | Self::Timeout)
        )
    }

    /// Lowercase name used in event payloads and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Metadata describing a work item. Everything a queue needs to schedule it.
#[derive(Debug, Clone)]
pub struct WorkMeta {
    /// Unique identifier, assigned at creation.
    pub id: WorkId,
    /// Human readable label. Never used for scheduling.
    pub name: String,
    /// Current (possibly aged) priority.
    pub priority: Priority,
    /// Caller-supplied cost estimate (tokens, bytes, ...).
    pub estimated_cost: u64,
    /// Absolute deadline, used by earliest-deadline-first.
    pub deadline: Option<Instant>,
    /// Advisory wait budget; the caller decides what happens when it elapses.
    pub timeout: Option<Duration>,
    /// Fairness key for round-robin.
    pub owner: Option<String>,
    /// Round-robin bookkeeping: quantum left to the owner after this item was selected.
    pub remaining_quantum: u32,
    pub(crate) base_priority: Priority,
    pub(crate) state: WorkState,
    pub(crate) created_at: Instant,
    pub(crate) created_at_pinned: bool,
    pub(crate) started_at: Option<Instant>,
    pub(crate) finished_at: Option<Instant>,
    pub(crate) result: Option<serde_json::Value>,
    pub(crate) error: Option<String>,
}

impl WorkMeta {
    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> WorkState {
        self.state
    }

    /// Priority the producer asked for, before any aging.
    #[must_use]
    pub const fn base_priority(&self) -> Priority {
        self.base_priority
    }

    /// Creation instant.
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Instant the item was dequeued.
    #[must_use]
    pub const fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Instant the item reached a terminal state.
    #[must_use]
    pub const fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    /// Result recorded by `complete`.
    #[must_use]
    pub const fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    /// Error recorded by `fail`, `cancel` or a timeout.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Time spent waiting in the queue so far (or until it started).
    #[must_use]
    pub fn waited(&self, now: Instant) -> Duration {
        self.started_at
            .unwrap_or(now)
            .saturating_duration_since(self.created_at)
    }

    /// Whether the advisory wait budget has elapsed while still pending.
    #[must_use]
    pub fn wait_expired(&self, now: Instant) -> bool {
        self.started_at.is_none()
            && self
                .timeout
                .is_some_and(|timeout| self.waited(now) >= timeout)
    }

    /// Move to `next`, enforcing the lifecycle graph.
    pub(crate) fn transition(&mut self, next: WorkState) -> Result<(), SchedulerError> {
        if !self.state.can_transition_to(next) {
            return Err(SchedulerError::InvalidTransition {
                id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// A schedulable unit of work with metadata and payload.
#[derive(Debug, Clone)]
pub struct WorkItem<P> {
    /// Metadata driving scheduling decisions.
    pub meta: WorkMeta,
    /// Payload supplied by the caller.
    pub payload: P,
}

impl<P> WorkItem<P> {
    /// Create a `Normal` priority item stamped with the current instant.
    ///
    /// The stamp is provisional: enqueueing restamps it from the queue's
    /// clock unless [`WorkItem::with_created_at`] pinned it.
    pub fn new(name: impl Into<String>, payload: P) -> Self {
        Self {
            meta: WorkMeta {
                id: WorkId::next(),
                name: name.into(),
                priority: Priority::Normal,
                estimated_cost: 0,
                deadline: None,
                timeout: None,
                owner: None,
                remaining_quantum: 0,
                base_priority: Priority::Normal,
                state: WorkState::Pending,
                created_at: Instant::now(),
                created_at_pinned: false,
                started_at: None,
                finished_at: None,
                result: None,
                error: None,
            },
            payload,
        }
    }

    /// Identifier shortcut.
    #[must_use]
    pub const fn id(&self) -> WorkId {
        self.meta.id
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.meta.priority = priority;
        self.meta.base_priority = priority;
        self
    }

    /// Set the cost estimate.
    #[must_use]
    pub fn with_cost(mut self, estimated_cost: u64) -> Self {
        self.meta.estimated_cost = estimated_cost;
        self
    }

    /// Set an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.meta.deadline = Some(deadline);
        self
    }

    /// Set the advisory wait timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.meta.timeout = Some(timeout);
        self
    }

    /// Set the fairness owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.meta.owner = Some(owner.into());
        self
    }

    /// Pin the creation instant. A pinned instant survives enqueueing.
    #[must_use]
    pub fn with_created_at(mut self, created_at: Instant) -> Self {
        self.meta.created_at = created_at;
        self.meta.created_at_pinned = true;
        self
    }
}

/// Outcome reported by a successful execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Result value stored on the item.
    pub result: serde_json::Value,
    /// Tokens consumed, counted against the inference token budget.
    pub tokens_used: Option<u64>,
}

impl Completion {
    /// Completion carrying only a result.
    #[must_use]
    pub fn new(result: serde_json::Value) -> Self {
        Self {
            result,
            tokens_used: None,
        }
    }

    /// Attach token usage.
    #[must_use]
    pub fn with_tokens(mut self, tokens_used: u64) -> Self {
        self.tokens_used = Some(tokens_used);
        self
    }
}

/// Kind of storage operation, used for read/write separation and coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoOperation {
    /// Read from the target.
    Read,
    /// Write to the target.
    Write,
}

/// Operation and target declared by a storage request's producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageTag {
    /// Operation kind.
    pub operation: IoOperation,
    /// Target identifier (path, key, table, ...).
    pub target: String,
}

impl StorageTag {
    /// Tag a read of `target`.
    pub fn read(target: impl Into<String>) -> Self {
        Self {
            operation: IoOperation::Read,
            target: target.into(),
        }
    }

    /// Tag a write of `target`.
    pub fn write(target: impl Into<String>) -> Self {
        Self {
            operation: IoOperation::Write,
            target: target.into(),
        }
    }
}

/// Payloads the coalescing queue can inspect.
pub trait StorageOperation {
    /// Operation and target of this request.
    fn storage_tag(&self) -> &StorageTag;
}

impl StorageOperation for StorageTag {
    fn storage_tag(&self) -> &StorageTag {
        self
    }
}

impl<T> StorageOperation for (StorageTag, T) {
    fn storage_tag(&self) -> &StorageTag {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_promotion_clamps_at_critical() {
        assert_eq!(Priority::Low.promoted(1), Priority::Normal);
        assert_eq!(Priority::Normal.promoted(2), Priority::Critical);
        assert_eq!(Priority::Normal.promoted(10), Priority::Critical);
        assert_eq!(Priority::High.promoted(0), Priority::High);
    }

    #[test]
    fn test_priority_ordering_most_urgent_first() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
    }

    #[test]
    fn test_lifecycle_only_moves_forward() {
        let mut item = WorkItem::new("job", ());
        assert!(item.meta.transition(WorkState::Running).is_err());
        item.meta.transition(WorkState::Queued).unwrap();
        item.meta.transition(WorkState::Running).unwrap();
        assert!(item.meta.transition(WorkState::Cancelled).is_err());
        item.meta.transition(WorkState::Completed).unwrap();
        assert!(item.meta.transition(WorkState::Failed).is_err());
        assert!(item.meta.state().is_terminal());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = WorkItem::new("a", ());
        let b = WorkItem::new("b", ());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_wait_expired() {
        let now = Instant::now();
        let item = WorkItem::new("slow", ())
            .with_created_at(now)
            .with_timeout(Duration::from_secs(1));
        assert!(!item.meta.wait_expired(now));
        assert!(item.meta.wait_expired(now + Duration::from_secs(1)));
    }
}
