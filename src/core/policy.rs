//! Extension point for algorithm-specific selection.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::core::work_item::{Completion, WorkItem, WorkMeta};

/// Selection disciplines a queue can be switched between at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Smallest estimated cost first.
    #[default]
    ShortestJobFirst,
    /// Rotate between owners.
    RoundRobin,
    /// Earliest declared deadline first.
    EarliestDeadlineFirst,
}

impl SchedulingPolicy {
    /// Snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShortestJobFirst => "shortest_job_first",
            Self::RoundRobin => "round_robin",
            Self::EarliestDeadlineFirst => "earliest_deadline_first",
        }
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// View of a queue handed to a policy while the queue lock is held.
pub struct PickContext<'a, P> {
    /// Pending items in arrival order. Policies may age or annotate them.
    pub pending: &'a mut Vec<WorkItem<P>>,
    /// Items currently running.
    pub running: usize,
    /// Concurrency bound of the queue.
    pub max_concurrency: usize,
    /// Current instant from the queue's clock.
    pub now: Instant,
}

impl<P> PickContext<'_, P> {
    /// Whether another item may start.
    #[must_use]
    pub const fn has_free_slot(&self) -> bool {
        self.running < self.max_concurrency
    }

    /// Number of items that may still start.
    #[must_use]
    pub const fn free_slots(&self) -> usize {
        self.max_concurrency.saturating_sub(self.running)
    }
}

/// Algorithm-specific part of a queue.
///
/// Every `pick_next` implementation must refuse to select when
/// [`PickContext::has_free_slot`] is false.
pub trait SelectionPolicy<P>: Send + 'static {
    /// Index into `ctx.pending` of the item to start next, or `None` to
    /// decline (empty queue, no free slot, or an admission gate).
    fn pick_next(&mut self, ctx: &mut PickContext<'_, P>) -> Option<usize>;

    /// Indices of items to start together as one batch, in execution order.
    fn pick_batch(&mut self, _ctx: &mut PickContext<'_, P>) -> Option<Vec<usize>> {
        None
    }

    /// Called under the queue lock when a running item reaches a terminal state.
    fn on_finished(&mut self, _meta: &WorkMeta, _completion: Option<&Completion>, _now: Instant) {}

    /// Active discipline, for policies that have one.
    fn current(&self) -> Option<SchedulingPolicy> {
        None
    }

    /// Switch discipline. Returns false when the policy is not supported.
    fn switch(&mut self, _policy: SchedulingPolicy) -> bool {
        false
    }
}
