//! Fairness queue for memory operations.
//!
//! Three runtime-switchable disciplines (shortest-job-first, round-robin
//! over owners, earliest-deadline-first) with priority aging applied before
//! every selection. SJF and EDF rank every pending item by cost or deadline;
//! the aged priority breaks ties, so a long-waiting item overtakes fresher
//! work of the same cost or deadline.

use std::sync::Arc;
use std::time::Duration;

use crate::config::FairnessConfig;
use crate::core::events::EventSink;
use crate::core::policy::{PickContext, SchedulingPolicy, SelectionPolicy};
use crate::core::scheduler::Scheduler;
use crate::queue::selection::{apply_aging, earliest_deadline, shortest_job, RoundRobin};
use crate::util::clock::Clock;

/// Switchable selection with aging.
#[derive(Debug, Clone)]
pub struct Fairness {
    policy: SchedulingPolicy,
    aging_threshold: Duration,
    round_robin: RoundRobin,
}

impl Fairness {
    /// Create the policy.
    #[must_use]
    pub fn new(policy: SchedulingPolicy, aging_threshold: Duration, rr_quantum: u32) -> Self {
        Self {
            policy,
            aging_threshold,
            round_robin: RoundRobin::new(rr_quantum),
        }
    }

    /// Build the policy described by `config`.
    #[must_use]
    pub fn from_config(config: &FairnessConfig) -> Self {
        Self::new(config.policy, config.aging_threshold(), config.rr_quantum)
    }

    /// Round-robin quantum.
    #[must_use]
    pub const fn rr_quantum(&self) -> u32 {
        self.round_robin.quantum()
    }
}

impl<P> SelectionPolicy<P> for Fairness {
    fn pick_next(&mut self, ctx: &mut PickContext<'_, P>) -> Option<usize> {
        if !ctx.has_free_slot() || ctx.pending.is_empty() {
            return None;
        }
        apply_aging(ctx.pending, ctx.now, self.aging_threshold);
        let candidates: Vec<usize> = (0..ctx.pending.len()).collect();
        match self.policy {
            SchedulingPolicy::ShortestJobFirst => shortest_job(ctx.pending, &candidates),
            SchedulingPolicy::EarliestDeadlineFirst => earliest_deadline(ctx.pending, &candidates),
            SchedulingPolicy::RoundRobin => self.round_robin.pick(ctx.pending, &candidates),
        }
    }

    fn current(&self) -> Option<SchedulingPolicy> {
        Some(self.policy)
    }

    fn switch(&mut self, policy: SchedulingPolicy) -> bool {
        if policy != self.policy {
            self.round_robin.reset();
            self.policy = policy;
        }
        true
    }
}

/// Queue for memory operations.
pub type FairnessQueue<P> = Scheduler<P, Fairness>;

impl<P: Send + 'static> Scheduler<P, Fairness> {
    /// Build a memory queue from its configuration.
    pub fn new(config: &FairnessConfig, events: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(
            config.kind.clone(),
            config.max_concurrency,
            Fairness::from_config(config),
            events,
            clock,
        )
        .with_history_limit(config.history_limit)
    }

    /// Round-robin quantum of this queue.
    #[must_use]
    pub fn rr_quantum(&self) -> u32 {
        self.inspect_policy(Fairness::rr_quantum)
    }
}
