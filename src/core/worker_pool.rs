//! Named pools of dedicated worker threads.
//!
//! A [`WorkerPool`] runs submitted closures and, when bound to a queue
//! through a [`QueueBinding`](crate::core::dispatch::QueueBinding), drains
//! that queue. Each worker owns a single-threaded tokio runtime so async
//! executors never block the application's main runtime.
//!
//! # Example
//!
//! ```rust,ignore
//! use resource_scheduler::core::{PoolManager, TracingEventSink};
//! use std::sync::Arc;
//!
//! let manager = PoolManager::new(Arc::new(TracingEventSink));
//! let pool = manager.create_pool("io", 4, None)?;
//! manager.start_all()?;
//! pool.submit(|| println!("hello from a worker"))?;
//! manager.stop_all();
//! ```

mod affinity;
mod manager;
mod native;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

pub use affinity::{available_cpus, pin_current_thread};
pub use manager::PoolManager;
pub use native::WorkerPool;

/// A closure submitted to a pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Busy/idle accounting of one live worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerStats {
    /// Worker identifier, unique within its pool.
    pub worker_id: usize,
    /// CPU the worker was pinned to, if pinning succeeded.
    pub cpu: Option<usize>,
    /// Time spent running jobs and queue items.
    pub busy: Duration,
    /// Time spent waiting for work.
    pub idle: Duration,
    /// Jobs and queue dispatches that finished normally.
    pub tasks_completed: u64,
    /// Jobs that panicked.
    pub tasks_failed: u64,
}

impl WorkerStats {
    /// Fraction of observed time spent busy, in `[0, 1]`.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        let total = self.busy + self.idle;
        if total.is_zero() {
            0.0
        } else {
            self.busy.as_secs_f64() / total.as_secs_f64()
        }
    }
}

/// Point-in-time statistics of a pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    /// Pool name.
    pub name: String,
    /// Configured worker count.
    pub worker_count: usize,
    /// Whether workers are running.
    pub running: bool,
    /// Queue kind the pool drains, if bound.
    pub bound_queue: Option<String>,
    /// Submitted jobs not yet picked up.
    pub queued_tasks: usize,
    /// Jobs ever submitted.
    pub submitted_tasks: u64,
    /// Jobs that finished normally.
    pub completed_tasks: u64,
    /// Jobs that panicked.
    pub failed_tasks: u64,
    /// Queue items executed through the binding.
    pub dispatched_items: u64,
    /// Live workers.
    pub workers: Vec<WorkerStats>,
}

impl PoolStats {
    /// Mean utilization over live workers.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.workers.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = self.workers.len() as f64;
        self.workers.iter().map(WorkerStats::utilization).sum::<f64>() / count
    }
}

/// Pool-wide counters (lock-free atomics).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub dispatched_items: AtomicU64,
}

/// Per-worker counters, shared between the worker thread and the pool.
#[derive(Debug, Default)]
pub(crate) struct WorkerCounters {
    busy_ns: AtomicU64,
    idle_ns: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    cpu: AtomicU64,
}

const NO_CPU: u64 = u64::MAX;

fn as_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl WorkerCounters {
    pub(crate) fn new() -> Self {
        let counters = Self::default();
        counters.cpu.store(NO_CPU, Ordering::Relaxed);
        counters
    }

    pub(crate) fn record_busy(&self, elapsed: Duration, ok: bool) {
        self.busy_ns.fetch_add(as_nanos(elapsed), Ordering::Relaxed);
        if ok {
            self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_idle(&self, elapsed: Duration) {
        self.idle_ns.fetch_add(as_nanos(elapsed), Ordering::Relaxed);
    }

    pub(crate) fn set_cpu(&self, cpu: usize) {
        self.cpu.store(cpu as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, worker_id: usize) -> WorkerStats {
        let cpu = self.cpu.load(Ordering::Relaxed);
        WorkerStats {
            worker_id,
            cpu: (cpu != NO_CPU).then(|| usize::try_from(cpu).unwrap_or(usize::MAX)),
            busy: Duration::from_nanos(self.busy_ns.load(Ordering::Relaxed)),
            idle: Duration::from_nanos(self.idle_ns.load(Ordering::Relaxed)),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
        }
    }
}
