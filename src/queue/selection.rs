//! Selection helpers shared by the concrete queues.
//!
//! Every helper works on a list of candidate indices into the pending set
//! so that callers can pre-filter (reads first) before applying a
//! discipline. Aged priority only breaks ties of the discipline's own key;
//! remaining ties go to `(created_at, id)`, which keeps selection
//! deterministic for a given pending set.

use std::time::{Duration, Instant};

use crate::core::work_item::{WorkItem, WorkMeta};

fn arrival_key(meta: &WorkMeta) -> (Instant, u64) {
    (meta.created_at, meta.id.0)
}

/// Re-derive every pending item's priority from its base priority and wait
/// time: one level per full `threshold` waited, clamped at `Critical`.
pub(crate) fn apply_aging<P>(pending: &mut [WorkItem<P>], now: Instant, threshold: Duration) {
    if threshold.is_zero() {
        return;
    }
    for item in pending.iter_mut() {
        let waited = now.saturating_duration_since(item.meta.created_at);
        let levels = u32::try_from(waited.as_nanos() / threshold.as_nanos()).unwrap_or(u32::MAX);
        let aged = item.meta.base_priority.promoted(levels);
        if aged != item.meta.priority {
            tracing::debug!(
                id = %item.meta.id,
                from = ?item.meta.priority,
                to = ?aged,
                "aged pending work item"
            );
            item.meta.priority = aged;
        }
    }
}

/// Oldest candidate.
pub(crate) fn earliest_created<P>(pending: &[WorkItem<P>], candidates: &[usize]) -> Option<usize> {
    candidates
        .iter()
        .copied()
        .min_by_key(|&i| arrival_key(&pending[i].meta))
}

/// Most urgent priority first, then oldest.
pub(crate) fn priority_then_arrival<P>(
    pending: &[WorkItem<P>],
    candidates: &[usize],
) -> Option<usize> {
    candidates.iter().copied().min_by_key(|&i| {
        let meta = &pending[i].meta;
        (meta.priority, meta.created_at, meta.id.0)
    })
}

/// Smallest estimated cost across all candidates. Equal costs go to the
/// more urgent (aged) priority, then the oldest.
pub(crate) fn shortest_job<P>(pending: &[WorkItem<P>], candidates: &[usize]) -> Option<usize> {
    candidates.iter().copied().min_by_key(|&i| {
        let meta = &pending[i].meta;
        (meta.estimated_cost, meta.priority, meta.created_at, meta.id.0)
    })
}

/// Earliest deadline among candidates that declare one, whatever their
/// priority; equal deadlines go to the more urgent (aged) priority, then the
/// oldest. Oldest candidate when none declares a deadline.
pub(crate) fn earliest_deadline<P>(
    pending: &[WorkItem<P>],
    candidates: &[usize],
) -> Option<usize> {
    candidates
        .iter()
        .copied()
        .filter_map(|i| {
            let meta = &pending[i].meta;
            meta.deadline.map(|d| (d, meta.priority, meta.created_at, meta.id.0, i))
        })
        .min()
        .map(|(.., i)| i)
        .or_else(|| earliest_created(pending, candidates))
}

/// Owner rotation for round-robin selection.
///
/// The ring holds the distinct owners with pending work, in the order they
/// were first seen. Items without an owner share the `None` slot.
#[derive(Debug, Clone)]
pub(crate) struct RoundRobin {
    owners: Vec<Option<String>>,
    cursor: usize,
    served: u32,
    quantum: u32,
}

impl RoundRobin {
    pub(crate) fn new(quantum: u32) -> Self {
        Self {
            owners: Vec::new(),
            cursor: 0,
            served: 0,
            quantum: quantum.max(1),
        }
    }

    pub(crate) const fn quantum(&self) -> u32 {
        self.quantum
    }

    /// Start the rotation over from the first owner.
    pub(crate) fn reset(&mut self) {
        self.owners.clear();
        self.cursor = 0;
        self.served = 0;
    }

    fn sync_owners<P>(&mut self, pending: &[WorkItem<P>], candidates: &[usize]) {
        let mut active: Vec<&Option<String>> = Vec::new();
        for &i in candidates {
            let owner = &pending[i].meta.owner;
            if !active.contains(&owner) {
                active.push(owner);
            }
        }

        let mut i = 0;
        while i < self.owners.len() {
            if active.contains(&&self.owners[i]) {
                i += 1;
                continue;
            }
            self.owners.remove(i);
            if i < self.cursor {
                self.cursor -= 1;
            } else if i == self.cursor {
                self.served = 0;
            }
        }

        for owner in active {
            if !self.owners.contains(owner) {
                self.owners.push(owner.clone());
            }
        }

        if self.cursor >= self.owners.len() {
            self.cursor = 0;
            self.served = 0;
        }
    }

    /// Select the current owner's oldest candidate and advance the rotation.
    pub(crate) fn pick<P>(&mut self, pending: &mut [WorkItem<P>], candidates: &[usize]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        self.sync_owners(pending, candidates);
        let owner = self.owners.get(self.cursor)?;
        let idx = candidates
            .iter()
            .copied()
            .filter(|&i| &pending[i].meta.owner == owner)
            .min_by_key(|&i| arrival_key(&pending[i].meta))?;

        self.served += 1;
        pending[idx].meta.remaining_quantum = self.quantum.saturating_sub(self.served);
        if self.served >= self.quantum {
            self.cursor = (self.cursor + 1) % self.owners.len();
            self.served = 0;
        }
        Some(idx)
    }
}
