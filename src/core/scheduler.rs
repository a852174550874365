//! Generic admission, concurrency and state-tracking shell shared by all queues.
//!
//! A [`Scheduler`] owns the pending set, the running set and a bounded
//! completed history of one resource class behind a single
//! `parking_lot::Mutex`. The algorithm that decides which pending item runs
//! next is supplied as a [`SelectionPolicy`].
//!
//! `dequeue` never blocks. Bound workers that find nothing to do park on
//! [`Scheduler::wait_for_work`], which is signalled through a `Condvar`
//! whenever work arrives or a slot frees up.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::debug;

use crate::core::error::SchedulerError;
use crate::core::events::{emit, EventSink, SchedulerEvent};
use crate::core::policy::{PickContext, SchedulingPolicy, SelectionPolicy};
use crate::core::work_item::{Completion, WorkId, WorkItem, WorkMeta, WorkState};
use crate::util::clock::Clock;

/// Default number of finished items kept for statistics.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Point-in-time queue statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Queue kind.
    pub kind: String,
    /// Items waiting.
    pub pending: usize,
    /// Items running.
    pub running: usize,
    /// Items ever accepted.
    pub total_enqueued: u64,
    /// Items completed successfully.
    pub total_completed: u64,
    /// Items that failed.
    pub total_failed: u64,
    /// Items cancelled before starting.
    pub total_cancelled: u64,
    /// Items whose execution timed out.
    pub total_timed_out: u64,
    /// Mean queueing delay of finished items, in milliseconds.
    pub avg_wait_ms: f64,
    /// Concurrency bound.
    pub max_concurrency: usize,
}

#[derive(Debug, Default)]
struct Counters {
    total_enqueued: u64,
    total_completed: u64,
    total_failed: u64,
    total_cancelled: u64,
    total_timed_out: u64,
    total_wait: Duration,
}

pub(crate) struct QueueState<P, S> {
    pending: Vec<WorkItem<P>>,
    running: HashMap<WorkId, WorkMeta>,
    completed: VecDeque<WorkMeta>,
    counters: Counters,
    policy: S,
    epoch: u64,
}

impl<P, S> QueueState<P, S> {
    fn record_history(&mut self, meta: WorkMeta, limit: usize) {
        if limit == 0 {
            return;
        }
        if self.completed.len() >= limit {
            self.completed.pop_front();
        }
        self.completed.push_back(meta);
    }
}

/// A queue for one resource class.
pub struct Scheduler<P, S> {
    kind: String,
    max_concurrency: usize,
    history_limit: usize,
    state: Mutex<QueueState<P, S>>,
    work_signal: Condvar,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl<P, S> std::fmt::Debug for Scheduler<P, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("kind", &self.kind)
            .field("max_concurrency", &self.max_concurrency)
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

impl<P, S> Scheduler<P, S>
where
    P: Send + 'static,
    S: SelectionPolicy<P>,
{
    /// Create a queue from its parts.
    pub fn with_policy(
        kind: impl Into<String>,
        max_concurrency: usize,
        policy: S,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            kind: kind.into(),
            max_concurrency,
            history_limit: DEFAULT_HISTORY_LIMIT,
            state: Mutex::new(QueueState {
                pending: Vec::new(),
                running: HashMap::new(),
                completed: VecDeque::new(),
                counters: Counters::default(),
                policy,
                epoch: 0,
            }),
            work_signal: Condvar::new(),
            events,
            clock,
        }
    }

    /// Bound the completed history.
    #[must_use]
    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    /// Queue kind used in event topics.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Concurrency bound.
    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Current instant from the injected clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Accept an item into the pending set. Items without a pinned creation
    /// instant are stamped from this queue's clock.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTransition` if the item has already
    /// been through a queue.
    pub fn enqueue(&self, mut item: WorkItem<P>) -> Result<WorkId, SchedulerError> {
        item.meta.transition(WorkState::Queued)?;
        if !item.meta.created_at_pinned {
            item.meta.created_at = self.clock.now();
        }
        let id = item.meta.id;
        let event = SchedulerEvent::work(&self.kind, "enqueued", &item.meta);
        {
            let mut state = self.state.lock();
            state.pending.push(item);
            state.counters.total_enqueued += 1;
            state.epoch += 1;
        }
        self.work_signal.notify_one();
        debug!(queue = %self.kind, id = %id, "work item enqueued");
        emit(self.events.as_ref(), &event);
        Ok(id)
    }

    /// Try to start the next item. Never blocks; `None` means "try later".
    pub fn dequeue(&self) -> Option<WorkItem<P>> {
        let now = self.clock.now();
        let (item, event) = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let running = state.running.len();
            let mut ctx = PickContext {
                pending: &mut state.pending,
                running,
                max_concurrency: self.max_concurrency,
                now,
            };
            let idx = state.policy.pick_next(&mut ctx)?;
            if idx >= state.pending.len() {
                return None;
            }
            let item = Self::start(state, idx, now);
            debug_assert!(state.running.len() <= self.max_concurrency);
            let event = SchedulerEvent::work(&self.kind, "started", &item.meta);
            (item, event)
        };
        debug!(queue = %self.kind, id = %item.meta.id, "work item started");
        emit(self.events.as_ref(), &event);
        Some(item)
    }

    /// Try to start a coalesced batch. `None` for policies that do not batch
    /// or when no group is ready.
    pub fn try_batch(&self) -> Option<Vec<WorkItem<P>>> {
        let now = self.clock.now();
        let batch = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let running = state.running.len();
            let mut ctx = PickContext {
                pending: &mut state.pending,
                running,
                max_concurrency: self.max_concurrency,
                now,
            };
            let picked = state.policy.pick_batch(&mut ctx)?;
            if picked.is_empty() || picked.iter().any(|&i| i >= state.pending.len()) {
                return None;
            }

            let mut descending = picked.clone();
            descending.sort_unstable_by(|a, b| b.cmp(a));
            descending.dedup();
            let mut taken: HashMap<usize, WorkItem<P>> = HashMap::with_capacity(picked.len());
            for idx in descending {
                taken.insert(idx, state.pending.remove(idx));
            }

            let mut batch = Vec::with_capacity(taken.len());
            for idx in picked {
                if let Some(mut item) = taken.remove(&idx) {
                    Self::mark_running(&mut item.meta, now);
                    state.running.insert(item.meta.id, item.meta.clone());
                    batch.push(item);
                }
            }
            debug_assert!(state.running.len() <= self.max_concurrency);
            batch
        };
        debug!(queue = %self.kind, size = batch.len(), "coalesced batch started");
        for item in &batch {
            emit(
                self.events.as_ref(),
                &SchedulerEvent::work(&self.kind, "started", &item.meta),
            );
        }
        Some(batch)
    }

    fn start(state: &mut QueueState<P, S>, idx: usize, now: Instant) -> WorkItem<P> {
        let mut item = state.pending.remove(idx);
        Self::mark_running(&mut item.meta, now);
        state.running.insert(item.meta.id, item.meta.clone());
        item
    }

    fn mark_running(meta: &mut WorkMeta, now: Instant) {
        // Pending items are always Queued.
        if let Err(e) = meta.transition(WorkState::Running) {
            tracing::error!(error = %e, "pending item in unexpected state");
            meta.state = WorkState::Running;
        }
        meta.started_at = Some(now.max(meta.created_at));
    }

    /// Record a successful result. Unknown or already finished ids are ignored.
    pub fn complete(&self, id: WorkId, result: serde_json::Value) {
        self.finish(id, Ok(Completion::new(result)));
    }

    /// Record a successful result together with the tokens it consumed.
    pub fn complete_with_usage(&self, id: WorkId, result: serde_json::Value, tokens_used: u64) {
        self.finish(id, Ok(Completion::new(result).with_tokens(tokens_used)));
    }

    /// Record an execution failure. Unknown or already finished ids are ignored.
    pub fn fail(&self, id: WorkId, error: impl Into<String>) {
        self.finish(id, Err(error.into()));
    }

    /// Record that a running item exceeded the caller's execution timeout.
    pub fn time_out(&self, id: WorkId) {
        self.finish_as(id, WorkState::Timeout, None, Some("execution timed out".into()));
    }

    /// Record the outcome of an execution.
    pub fn finish(&self, id: WorkId, outcome: Result<Completion, String>) {
        match outcome {
            Ok(completion) => self.finish_as(id, WorkState::Completed, Some(completion), None),
            Err(error) => self.finish_as(id, WorkState::Failed, None, Some(error)),
        }
    }

    fn finish_as(
        &self,
        id: WorkId,
        terminal: WorkState,
        completion: Option<Completion>,
        error: Option<String>,
    ) {
        let now = self.clock.now();
        let event = {
            let mut state = self.state.lock();
            let Some(mut meta) = state.running.remove(&id) else {
                debug!(queue = %self.kind, id = %id, "ignoring completion for item that is not running");
                return;
            };
            if let Err(e) = meta.transition(terminal) {
                tracing::error!(error = %e, "running item in unexpected state");
                meta.state = terminal;
            }
            let started = meta.started_at.unwrap_or(meta.created_at);
            meta.finished_at = Some(now.max(started));
            state.counters.total_wait += started.saturating_duration_since(meta.created_at);
            match terminal {
                WorkState::Completed => state.counters.total_completed += 1,
                WorkState::Timeout => state.counters.total_timed_out += 1,
                _ => state.counters.total_failed += 1,
            }
            state.policy.on_finished(&meta, completion.as_ref(), now);
            meta.result = completion.map(|c| c.result);
            meta.error = error;
            let action = match terminal {
                WorkState::Completed => "completed",
                WorkState::Timeout => "timeout",
                _ => "failed",
            };
            let event = SchedulerEvent::work(&self.kind, action, &meta);
            state.record_history(meta, self.history_limit);
            state.epoch += 1;
            event
        };
        self.work_signal.notify_one();
        debug!(queue = %self.kind, id = %id, topic = %event.topic, "work item finished");
        emit(self.events.as_ref(), &event);
    }

    /// Withdraw a pending item. Returns false if it is not pending (already
    /// running, finished, or unknown).
    pub fn cancel(&self, id: WorkId) -> bool {
        let now = self.clock.now();
        let meta = {
            let mut state = self.state.lock();
            let Some(pos) = state.pending.iter().position(|i| i.meta.id == id) else {
                return false;
            };
            let item = state.pending.remove(pos);
            Self::record_cancel(&mut state, item.meta, now, "cancelled", self.history_limit)
        };
        debug!(queue = %self.kind, id = %id, "work item cancelled");
        emit(self.events.as_ref(), &SchedulerEvent::work(&self.kind, "cancelled", &meta));
        true
    }

    /// Cancel every pending item whose advisory wait timeout has elapsed.
    ///
    /// The scheduler never calls this on its own; producers that track their
    /// deadlines through the queue invoke it periodically.
    pub fn cancel_expired(&self) -> Vec<WorkId> {
        let now = self.clock.now();
        let expired = {
            let mut state = self.state.lock();
            let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|i| i.meta.wait_expired(now));
            state.pending = kept;
            expired
                .into_iter()
                .map(|item| {
                    Self::record_cancel(
                        &mut state,
                        item.meta,
                        now,
                        "wait timeout exceeded",
                        self.history_limit,
                    )
                })
                .collect::<Vec<_>>()
        };
        if !expired.is_empty() {
            tracing::warn!(queue = %self.kind, count = expired.len(), "cancelled expired work items");
        }
        expired
            .into_iter()
            .map(|meta| {
                emit(self.events.as_ref(), &SchedulerEvent::work(&self.kind, "cancelled", &meta));
                meta.id
            })
            .collect()
    }

    fn record_cancel(
        state: &mut QueueState<P, S>,
        mut meta: WorkMeta,
        now: Instant,
        reason: &str,
        history_limit: usize,
    ) -> WorkMeta {
        if let Err(e) = meta.transition(WorkState::Cancelled) {
            tracing::error!(error = %e, "pending item in unexpected state");
            meta.state = WorkState::Cancelled;
        }
        meta.finished_at = Some(now.max(meta.created_at));
        meta.error = Some(reason.to_string());
        state.counters.total_cancelled += 1;
        state.record_history(meta.clone(), history_limit);
        meta
    }

    /// Number of pending items.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of running items.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.state.lock().running.len()
    }

    /// Snapshot of the queue's counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        let state = self.state.lock();
        let c = &state.counters;
        let finished = c.total_completed + c.total_failed + c.total_timed_out;
        #[allow(clippy::cast_precision_loss)]
        let avg_wait_ms = if finished == 0 {
            0.0
        } else {
            c.total_wait.as_secs_f64() * 1000.0 / finished as f64
        };
        StatsSnapshot {
            kind: self.kind.clone(),
            pending: state.pending.len(),
            running: state.running.len(),
            total_enqueued: c.total_enqueued,
            total_completed: c.total_completed,
            total_failed: c.total_failed,
            total_cancelled: c.total_cancelled,
            total_timed_out: c.total_timed_out,
            avg_wait_ms,
            max_concurrency: self.max_concurrency,
        }
    }

    /// Finished items still held in the bounded history, oldest first.
    #[must_use]
    pub fn completed(&self) -> Vec<WorkMeta> {
        self.state.lock().completed.iter().cloned().collect()
    }

    /// Current metadata of an item known to this queue.
    #[must_use]
    pub fn get(&self, id: WorkId) -> Option<WorkMeta> {
        let state = self.state.lock();
        state
            .pending
            .iter()
            .find(|i| i.meta.id == id)
            .map(|i| i.meta.clone())
            .or_else(|| state.running.get(&id).cloned())
            .or_else(|| state.completed.iter().rev().find(|m| m.id == id).cloned())
    }

    /// Active selection discipline, if the queue has a switchable one.
    #[must_use]
    pub fn policy(&self) -> Option<SchedulingPolicy> {
        self.state.lock().policy.current()
    }

    /// Switch the selection discipline of a live queue.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::UnsupportedPolicy` if this queue does not
    /// implement `policy`.
    pub fn set_policy(&self, policy: SchedulingPolicy) -> Result<(), SchedulerError> {
        {
            let mut state = self.state.lock();
            if !state.policy.switch(policy) {
                return Err(SchedulerError::UnsupportedPolicy {
                    queue: self.kind.clone(),
                    policy: policy.to_string(),
                });
            }
            state.epoch += 1;
        }
        tracing::info!(queue = %self.kind, policy = %policy, "selection policy switched");
        self.work_signal.notify_all();
        Ok(())
    }

    /// Read policy state under the queue lock.
    pub(crate) fn inspect_policy<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.lock().policy)
    }

    /// Change counter, bumped whenever something that could unblock a
    /// worker happens.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Park until the epoch moves past `seen` or `timeout` elapses.
    /// Returns true if woken by a change.
    pub fn wait_for_work(&self, seen: u64, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.epoch != seen {
            return true;
        }
        !self.work_signal.wait_for(&mut state, timeout).timed_out()
    }

    /// Wake every parked worker.
    pub fn notify_all(&self) {
        self.state.lock().epoch += 1;
        self.work_signal.notify_all();
    }
}
