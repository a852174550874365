//! Coalescing queue for storage operations.
//!
//! Payloads declare their operation and target through [`StorageOperation`].
//! Single selection uses SJF or round-robin (optionally restricted to reads
//! while any read is pending). [`Scheduler::try_batch`] groups pending
//! items by tag and starts a whole group at once once its oldest member has
//! waited out the batch window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CoalescingConfig;
use crate::core::error::SchedulerError;
use crate::core::events::EventSink;
use crate::core::policy::{PickContext, SchedulingPolicy, SelectionPolicy};
use crate::core::scheduler::Scheduler;
use crate::core::work_item::{IoOperation, StorageOperation, StorageTag, WorkItem};
use crate::queue::selection::{apply_aging, shortest_job, RoundRobin};
use crate::util::clock::Clock;

/// SJF/round-robin selection with read preference and batch coalescing.
#[derive(Debug, Clone)]
pub struct Coalescing {
    policy: SchedulingPolicy,
    reads_first: bool,
    batch_window: Duration,
    batch_size: usize,
    aging_threshold: Duration,
    round_robin: RoundRobin,
}

impl Coalescing {
    /// Build the policy described by `config`.
    ///
    /// # Errors
    ///
    /// `SchedulerError::UnsupportedPolicy` if `config` asks for
    /// earliest-deadline-first.
    pub fn from_config(config: &CoalescingConfig) -> Result<Self, SchedulerError> {
        if config.policy == SchedulingPolicy::EarliestDeadlineFirst {
            return Err(SchedulerError::UnsupportedPolicy {
                queue: config.kind.clone(),
                policy: config.policy.as_str().to_string(),
            });
        }
        Ok(Self {
            policy: config.policy,
            reads_first: config.reads_first,
            batch_window: config.batch_window(),
            batch_size: config.batch_size,
            aging_threshold: config.aging_threshold(),
            round_robin: RoundRobin::new(config.rr_quantum),
        })
    }

    /// Coalescing window.
    #[must_use]
    pub const fn batch_window(&self) -> Duration {
        self.batch_window
    }

    fn candidates<P: StorageOperation>(&self, pending: &[WorkItem<P>]) -> Vec<usize> {
        let all: Vec<usize> = (0..pending.len()).collect();
        if !self.reads_first {
            return all;
        }
        let reads: Vec<usize> = all
            .iter()
            .copied()
            .filter(|&i| pending[i].payload.storage_tag().operation == IoOperation::Read)
            .collect();
        if reads.is_empty() {
            all
        } else {
            reads
        }
    }
}

impl<P: StorageOperation> SelectionPolicy<P> for Coalescing {
    fn pick_next(&mut self, ctx: &mut PickContext<'_, P>) -> Option<usize> {
        if !ctx.has_free_slot() || ctx.pending.is_empty() {
            return None;
        }
        apply_aging(ctx.pending, ctx.now, self.aging_threshold);
        let candidates = self.candidates(ctx.pending);
        match self.policy {
            SchedulingPolicy::RoundRobin => self.round_robin.pick(ctx.pending, &candidates),
            _ => shortest_job(ctx.pending, &candidates),
        }
    }

    fn pick_batch(&mut self, ctx: &mut PickContext<'_, P>) -> Option<Vec<usize>> {
        let limit = self.batch_size.min(ctx.free_slots());
        if limit < 2 {
            return None;
        }
        let pending: &[WorkItem<P>] = ctx.pending.as_slice();
        // With reads first, writes are not coalesced while any read waits.
        let mut groups: HashMap<&StorageTag, Vec<usize>> = HashMap::new();
        for i in self.candidates(pending) {
            groups.entry(pending[i].payload.storage_tag()).or_default().push(i);
        }

        let arrival = |i: &usize| (pending[*i].meta.created_at, pending[*i].meta.id.0);
        let mut ready: Option<Vec<usize>> = None;
        for mut members in groups.into_values().filter(|m| m.len() >= 2) {
            members.sort_by_key(arrival);
            let oldest = pending[members[0]].meta.created_at;
            if ctx.now.saturating_duration_since(oldest) < self.batch_window {
                continue;
            }
            let better = ready
                .as_ref()
                .is_none_or(|best| arrival(&members[0]) < arrival(&best[0]));
            if better {
                ready = Some(members);
            }
        }

        let mut batch = ready?;
        batch.truncate(limit);
        Some(batch)
    }

    fn current(&self) -> Option<SchedulingPolicy> {
        Some(self.policy)
    }

    fn switch(&mut self, policy: SchedulingPolicy) -> bool {
        match policy {
            SchedulingPolicy::EarliestDeadlineFirst => false,
            _ => {
                if policy != self.policy {
                    self.round_robin.reset();
                    self.policy = policy;
                }
                true
            }
        }
    }
}

/// Queue for storage operations.
pub type CoalescingQueue<P> = Scheduler<P, Coalescing>;

impl<P: StorageOperation + Send + 'static> Scheduler<P, Coalescing> {
    /// Build a storage queue from its configuration.
    ///
    /// # Errors
    ///
    /// `SchedulerError::UnsupportedPolicy` for an earliest-deadline-first
    /// configuration.
    pub fn new(
        config: &CoalescingConfig,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        Ok(Self::with_policy(
            config.kind.clone(),
            config.max_concurrency,
            Coalescing::from_config(config)?,
            events,
            clock,
        )
        .with_history_limit(config.history_limit))
    }

    /// Coalescing window of this queue.
    #[must_use]
    pub fn batch_window(&self) -> Duration {
        self.inspect_policy(Coalescing::batch_window)
    }
}
