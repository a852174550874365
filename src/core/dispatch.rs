//! Glue between a queue and the worker threads that drain it.
//!
//! A [`QueueRunner`] pairs one queue with one [`WorkExecutor`]. Worker pools
//! only see the object-safe [`QueueBinding`] trait, so a pool can drain any
//! queue regardless of payload or policy type.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::executor::WorkExecutor;
use crate::core::policy::SelectionPolicy;
use crate::core::scheduler::Scheduler;
use crate::core::work_item::WorkItem;

/// What a worker pool needs from the queue it is bound to.
pub trait QueueBinding: Send + Sync {
    /// Queue kind, for logging.
    fn name(&self) -> &str;

    /// Start and run at most one unit of work (a single item or one
    /// coalesced batch) on `rt`. Returns the number of items executed;
    /// `0` means the queue declined.
    fn dispatch_one(&self, rt: &tokio::runtime::Runtime) -> usize;

    /// Current change counter of the queue.
    fn epoch(&self) -> u64;

    /// Park until the queue changes past `seen` or `timeout` elapses.
    fn wait_for_work(&self, seen: u64, timeout: Duration) -> bool;

    /// Wake every parked worker.
    fn notify_all(&self);
}

/// Drains a queue through an executor.
pub struct QueueRunner<P, S, E> {
    queue: Arc<Scheduler<P, S>>,
    executor: Arc<E>,
    batching: bool,
}

impl<P, S, E> QueueRunner<P, S, E>
where
    P: Send + Sync + 'static,
    S: SelectionPolicy<P>,
    E: WorkExecutor<P>,
{
    /// Bind `queue` to `executor`. Coalesced batches are attempted first.
    pub fn new(queue: Arc<Scheduler<P, S>>, executor: Arc<E>) -> Self {
        Self {
            queue,
            executor,
            batching: true,
        }
    }

    /// Enable or disable `try_batch` before single dequeues.
    #[must_use]
    pub const fn with_batching(mut self, batching: bool) -> Self {
        self.batching = batching;
        self
    }

    /// The bound queue.
    #[must_use]
    pub const fn queue(&self) -> &Arc<Scheduler<P, S>> {
        &self.queue
    }

    fn run_one(&self, rt: &tokio::runtime::Runtime, item: &WorkItem<P>) {
        let id = item.id();
        let outcome = catch_unwind(AssertUnwindSafe(|| rt.block_on(self.executor.execute(item))));
        match outcome {
            Ok(Ok(completion)) => self.queue.finish(id, Ok(completion)),
            Ok(Err(e)) => {
                debug!(queue = %self.queue.kind(), id = %id, error = %e, "work item failed");
                self.queue.fail(id, format!("{e:#}"));
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(queue = %self.queue.kind(), id = %id, panic = %message, "executor panicked");
                self.queue.fail(id, format!("executor panicked: {message}"));
            }
        }
    }

    fn run_batch(&self, rt: &tokio::runtime::Runtime, batch: &[WorkItem<P>]) {
        let outcome =
            catch_unwind(AssertUnwindSafe(|| rt.block_on(self.executor.execute_batch(batch))));
        match outcome {
            Ok(outcomes) => {
                let mut outcomes = outcomes.into_iter();
                for item in batch {
                    match outcomes.next() {
                        Some(Ok(completion)) => self.queue.finish(item.id(), Ok(completion)),
                        Some(Err(e)) => self.queue.fail(item.id(), format!("{e:#}")),
                        None => self.queue.fail(item.id(), "batch returned no result for item"),
                    }
                }
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(queue = %self.queue.kind(), size = batch.len(), panic = %message, "batch executor panicked");
                for item in batch {
                    self.queue.fail(item.id(), format!("executor panicked: {message}"));
                }
            }
        }
    }
}

impl<P, S, E> QueueBinding for QueueRunner<P, S, E>
where
    P: Send + Sync + 'static,
    S: SelectionPolicy<P>,
    E: WorkExecutor<P>,
{
    fn name(&self) -> &str {
        self.queue.kind()
    }

    fn dispatch_one(&self, rt: &tokio::runtime::Runtime) -> usize {
        if self.batching {
            if let Some(batch) = self.queue.try_batch() {
                self.run_batch(rt, &batch);
                return batch.len();
            }
        }
        match self.queue.dequeue() {
            Some(item) => {
                self.run_one(rt, &item);
                1
            }
            None => 0,
        }
    }

    fn epoch(&self) -> u64 {
        self.queue.epoch()
    }

    fn wait_for_work(&self, seen: u64, timeout: Duration) -> bool {
        self.queue.wait_for_work(seen, timeout)
    }

    fn notify_all(&self) {
        self.queue.notify_all();
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoalescingConfig, FairnessConfig};
    use crate::core::error::AppResult;
    use crate::core::events::NullEventSink;
    use crate::core::executor::FnExecutor;
    use crate::core::work_item::{Completion, StorageTag, WorkState};
    use crate::queue::{CoalescingQueue, FairnessQueue};
    use crate::util::clock::{Clock, ManualClock, SystemClock};
    use serde_json::json;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_dispatch_records_outcomes() {
        let queue = Arc::new(FairnessQueue::new(
            &FairnessConfig::default(),
            Arc::new(NullEventSink),
            Arc::new(SystemClock),
        ));
        let ok = queue.enqueue(WorkItem::new("ok", 1u32).with_cost(1)).unwrap();
        let bad = queue.enqueue(WorkItem::new("bad", 2u32).with_cost(2)).unwrap();
        let boom = queue.enqueue(WorkItem::new("boom", 3u32).with_cost(3)).unwrap();
        let exec = FnExecutor::new(|item: &WorkItem<u32>| match item.payload {
            1 => Ok(Completion::new(json!("done"))),
            2 => Err(anyhow::anyhow!("disk full")),
            _ => panic!("executor bug"),
        });
        let runner = QueueRunner::new(Arc::clone(&queue), Arc::new(exec));
        let rt = runtime();

        assert_eq!(runner.dispatch_one(&rt), 1);
        assert_eq!(runner.dispatch_one(&rt), 1);
        assert_eq!(runner.dispatch_one(&rt), 1);
        assert_eq!(runner.dispatch_one(&rt), 0);

        assert_eq!(queue.get(ok).unwrap().state(), WorkState::Completed);
        let failed = queue.get(bad).unwrap();
        assert_eq!(failed.state(), WorkState::Failed);
        assert_eq!(failed.error(), Some("disk full"));
        let panicked = queue.get(boom).unwrap();
        assert_eq!(panicked.error(), Some("executor panicked: executor bug"));
        assert_eq!(queue.running_count(), 0);
    }

    #[test]
    fn test_dispatch_prefers_ready_batch() {
        let clock = Arc::new(ManualClock::new());
        let queue = Arc::new(CoalescingQueue::new(
            &CoalescingConfig::default(),
            Arc::new(NullEventSink),
            clock.clone(),
        )
        .unwrap());
        for _ in 0..3 {
            queue
                .enqueue(WorkItem::new("read", StorageTag::read("k")).with_created_at(clock.now()))
                .unwrap();
        }
        clock.advance(Duration::from_secs(1));
        let exec = FnExecutor::new(|_: &WorkItem<StorageTag>| -> AppResult<Completion> {
            Ok(Completion::new(json!(null)))
        });
        let runner = QueueRunner::new(Arc::clone(&queue), Arc::new(exec));
        assert_eq!(runner.dispatch_one(&runtime()), 3);
        assert_eq!(queue.stats().total_completed, 3);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
