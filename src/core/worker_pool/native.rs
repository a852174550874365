//! `WorkerPool` on OS threads.
//!
//! Each worker owns a single-threaded tokio runtime and a private stop
//! channel. Submitted jobs travel over one shared crossbeam channel. A
//! worker bound to a queue alternates between the job channel and the
//! queue, parking on the queue's condition variable when both are empty.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::core::dispatch::{panic_message, QueueBinding};
use crate::core::error::SchedulerError;

use super::affinity::pin_current_thread;
use super::{Job, PoolCounters, PoolStats, WorkerCounters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

struct WorkerHandle {
    id: usize,
    stop_tx: Sender<()>,
    counters: Arc<WorkerCounters>,
    thread: JoinHandle<()>,
}

struct PoolState {
    lifecycle: Lifecycle,
    size: usize,
    next_worker_id: usize,
    workers: Vec<WorkerHandle>,
}

/// Everything a worker thread needs, cloned per worker.
#[derive(Clone)]
struct WorkerContext {
    pool: String,
    task_rx: Receiver<Job>,
    binding: Option<Arc<dyn QueueBinding>>,
    pool_counters: Arc<PoolCounters>,
    idle_wait: Duration,
}

/// Named set of worker threads.
pub struct WorkerPool {
    name: String,
    config: PoolConfig,
    task_tx: Sender<Job>,
    task_rx: Receiver<Job>,
    binding: Option<Arc<dyn QueueBinding>>,
    counters: Arc<PoolCounters>,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    /// Create a stopped pool.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if the configuration is invalid.
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Result<Self, SchedulerError> {
        let name = name.into();
        config
            .validate()
            .map_err(|e| SchedulerError::InvalidConfig(format!("pool `{name}`: {e}")))?;
        let (task_tx, task_rx) = unbounded();
        let size = config.worker_count();
        Ok(Self {
            name,
            config,
            task_tx,
            task_rx,
            binding: None,
            counters: Arc::new(PoolCounters::default()),
            state: Mutex::new(PoolState {
                lifecycle: Lifecycle::Created,
                size,
                next_worker_id: 0,
                workers: Vec::new(),
            }),
        })
    }

    /// Drain `binding`'s queue in addition to submitted jobs.
    #[must_use]
    pub fn with_binding(mut self, binding: Arc<dyn QueueBinding>) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pool configuration as created.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Target worker count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.lock().size
    }

    /// Whether workers are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().lifecycle == Lifecycle::Running
    }

    /// Spawn the workers. Starting a running pool is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Backend` if a worker thread cannot be spawned.
    /// Workers spawned before the failure are joined and the pool stays
    /// stopped.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        if state.lifecycle == Lifecycle::Running {
            return Ok(());
        }
        let size = state.size;
        let spawned = self.spawn_workers(&mut state, size)?;
        state.workers.extend(spawned);
        state.lifecycle = Lifecycle::Running;
        info!(
            pool = %self.name,
            workers = size,
            bound_queue = self.binding.as_ref().map(|b| b.name()),
            "worker pool started"
        );
        Ok(())
    }

    /// Stop and join every worker. Queued jobs stay queued; new submissions
    /// are rejected until the pool is started again.
    pub fn stop(&self) {
        let workers = {
            let mut state = self.state.lock();
            if state.lifecycle != Lifecycle::Running {
                state.lifecycle = Lifecycle::Stopped;
                return;
            }
            state.lifecycle = Lifecycle::Stopped;
            std::mem::take(&mut state.workers)
        };
        let count = workers.len();
        self.retire(workers);
        info!(pool = %self.name, workers = count, "worker pool stopped");
    }

    /// Queue a closure for execution by any worker.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::PoolShutdown` once the pool has been stopped.
    pub fn submit<F>(&self, task: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.state.lock().lifecycle == Lifecycle::Stopped {
            return Err(SchedulerError::PoolShutdown(self.name.clone()));
        }
        self.task_tx
            .send(Box::new(task))
            .map_err(|_| SchedulerError::PoolShutdown(self.name.clone()))?;
        self.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        if let Some(binding) = &self.binding {
            binding.notify_all();
        }
        Ok(())
    }

    /// Grow or shrink the pool. Shrinking stops and joins the newest
    /// workers; growing starts new ones immediately when running.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` for a size of zero and
    /// `SchedulerError::Backend` if a new worker cannot be spawned. On a
    /// spawn failure the pool keeps its previous size and workers.
    pub fn resize(&self, size: usize) -> Result<(), SchedulerError> {
        if size == 0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "pool `{}`: size must be greater than 0",
                self.name
            )));
        }
        let retired = {
            let mut state = self.state.lock();
            let previous = state.size;
            if state.lifecycle != Lifecycle::Running {
                state.size = size;
                debug!(pool = %self.name, from = previous, to = size, "resized stopped pool");
                return Ok(());
            }
            let live = state.workers.len();
            let retired = if size > live {
                let spawned = self.spawn_workers(&mut state, size - live)?;
                state.workers.extend(spawned);
                Vec::new()
            } else {
                state.workers.split_off(size)
            };
            state.size = size;
            retired
        };
        let shrunk_by = retired.len();
        self.retire(retired);
        info!(pool = %self.name, size, shrunk_by, "worker pool resized");
        Ok(())
    }

    /// Snapshot of pool and per-worker statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            name: self.name.clone(),
            worker_count: state.size,
            running: state.lifecycle == Lifecycle::Running,
            bound_queue: self.binding.as_ref().map(|b| b.name().to_string()),
            queued_tasks: self.task_rx.len(),
            submitted_tasks: self.counters.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.counters.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.counters.failed_tasks.load(Ordering::Relaxed),
            dispatched_items: self.counters.dispatched_items.load(Ordering::Relaxed),
            workers: state
                .workers
                .iter()
                .map(|w| w.counters.snapshot(w.id))
                .collect(),
        }
    }

    /// Spawn `count` workers. All or nothing: on failure the ones already
    /// spawned are stopped and joined before the error is returned.
    fn spawn_workers(
        &self,
        state: &mut PoolState,
        count: usize,
    ) -> Result<Vec<WorkerHandle>, SchedulerError> {
        let ctx = WorkerContext {
            pool: self.name.clone(),
            task_rx: self.task_rx.clone(),
            binding: self.binding.clone(),
            pool_counters: Arc::clone(&self.counters),
            idle_wait: self.config.idle_wait(),
        };
        let mut spawned = Vec::with_capacity(count);
        for _ in 0..count {
            let id = state.next_worker_id;
            state.next_worker_id += 1;
            let cpu = self
                .config
                .affinity
                .as_ref()
                .filter(|cpus| !cpus.is_empty())
                .map(|cpus| cpus[id % cpus.len()]);
            let (stop_tx, stop_rx) = bounded(1);
            let counters = Arc::new(WorkerCounters::new());
            let spawn = thread::Builder::new()
                .name(format!("{}-worker-{id}", self.name))
                .stack_size(self.config.stack_size)
                .spawn({
                    let ctx = ctx.clone();
                    let counters = Arc::clone(&counters);
                    move || worker_loop(id, cpu, &ctx, &stop_rx, &counters)
                });
            match spawn {
                Ok(thread) => spawned.push(WorkerHandle {
                    id,
                    stop_tx,
                    counters,
                    thread,
                }),
                Err(e) => {
                    error!(
                        pool = %self.name,
                        worker_id = id,
                        rolled_back = spawned.len(),
                        error = %e,
                        "failed to spawn worker"
                    );
                    self.retire(spawned);
                    return Err(SchedulerError::Backend(format!(
                        "spawn worker {id} of `{}`: {e}",
                        self.name
                    )));
                }
            }
        }
        Ok(spawned)
    }

    fn signal(&self, workers: &[WorkerHandle]) {
        for worker in workers {
            let _ = worker.stop_tx.try_send(());
        }
        if let Some(binding) = &self.binding {
            binding.notify_all();
        }
    }

    fn retire(&self, workers: Vec<WorkerHandle>) {
        self.signal(&workers);
        for worker in workers {
            if worker.thread.join().is_err() {
                warn!(pool = %self.name, worker_id = worker.id, "worker thread panicked");
            } else {
                debug!(pool = %self.name, worker_id = worker.id, "worker joined");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Signal only; joining here could hang on a long-running job.
        let state = self.state.get_mut();
        if state.lifecycle == Lifecycle::Running {
            state.lifecycle = Lifecycle::Stopped;
            let workers = std::mem::take(&mut state.workers);
            self.signal(&workers);
            debug!(pool = %self.name, "worker pool dropped without stop, detaching workers");
        }
    }
}

fn worker_loop(
    id: usize,
    cpu: Option<usize>,
    ctx: &WorkerContext,
    stop_rx: &Receiver<()>,
    counters: &WorkerCounters,
) {
    if let Some(cpu) = cpu {
        match pin_current_thread(cpu) {
            Ok(()) => counters.set_cpu(cpu),
            Err(e) => debug!(pool = %ctx.pool, worker_id = id, error = %e, "cpu pinning skipped"),
        }
    }
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(pool = %ctx.pool, worker_id = id, error = %e, "failed to create worker runtime");
            return;
        }
    };
    debug!(pool = %ctx.pool, worker_id = id, "worker started");

    loop {
        match stop_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => break,
        }
        if let Ok(job) = ctx.task_rx.try_recv() {
            run_job(id, job, ctx, counters);
            continue;
        }

        if let Some(binding) = &ctx.binding {
            let seen = binding.epoch();
            let started = Instant::now();
            let ran = binding.dispatch_one(&rt);
            if ran > 0 {
                counters.record_busy(started.elapsed(), true);
                ctx.pool_counters
                    .dispatched_items
                    .fetch_add(ran as u64, Ordering::Relaxed);
                continue;
            }
            let parked = Instant::now();
            binding.wait_for_work(seen, ctx.idle_wait);
            counters.record_idle(parked.elapsed());
        } else {
            let parked = Instant::now();
            select! {
                recv(stop_rx) -> _ => {
                    counters.record_idle(parked.elapsed());
                    break;
                }
                recv(ctx.task_rx) -> msg => {
                    counters.record_idle(parked.elapsed());
                    match msg {
                        Ok(job) => run_job(id, job, ctx, counters),
                        Err(_) => break,
                    }
                }
            }
        }
    }
    debug!(pool = %ctx.pool, worker_id = id, "worker exiting");
}

fn run_job(id: usize, job: Job, ctx: &WorkerContext, counters: &WorkerCounters) {
    let started = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(job));
    let ok = outcome.is_ok();
    counters.record_busy(started.elapsed(), ok);
    if let Err(panic) = outcome {
        warn!(
            pool = %ctx.pool,
            worker_id = id,
            panic = %panic_message(panic.as_ref()),
            "job panicked"
        );
        ctx.pool_counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
    } else {
        ctx.pool_counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
    }
}
