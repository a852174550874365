//! # Resource Scheduler
//!
//! Admission control and dispatch for three classes of agent workload:
//! model-inference calls, memory operations and storage operations. Each
//! class gets its own queue with its own selection discipline and
//! concurrency bound; named pools of worker threads drain them.
//!
//! ## Queues
//!
//! - [`queue::PriorityFifoQueue`]: most urgent priority first, FIFO within a
//!   priority, with an optional rate limiter and per-minute token budget.
//! - [`queue::FairnessQueue`]: shortest-job-first, round-robin over owners or
//!   earliest-deadline-first, switchable at runtime, with priority aging.
//! - [`queue::CoalescingQueue`]: SJF or round-robin with an optional read
//!   preference, plus [`core::Scheduler::try_batch`] to run same-target
//!   operations as one batch.
//!
//! Every queue shares the same shell ([`core::Scheduler`]): `enqueue`,
//! non-blocking `dequeue`, `complete`/`fail`, `cancel` and `stats`, all
//! behind one lock per queue. Lifecycle events go to an injected
//! [`core::EventSink`].
//!
//! ## Workers
//!
//! [`core::WorkerPool`] runs dedicated OS threads, each with a
//! single-threaded tokio runtime. A pool bound to a queue through a
//! [`core::QueueRunner`] dequeues, executes with a [`core::WorkExecutor`]
//! and reports the outcome back. [`core::PoolManager`] starts, stops and
//! resizes named pools together.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use resource_scheduler::config::FairnessConfig;
//! use resource_scheduler::core::{
//!     EventSink, FnExecutor, PoolManager, QueueRunner, SystemClock, TracingEventSink, WorkItem,
//! };
//! use resource_scheduler::config::PoolConfig;
//! use resource_scheduler::queue::FairnessQueue;
//!
//! let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
//! let memory = Arc::new(FairnessQueue::new(&FairnessConfig::default(), events.clone(), Arc::new(SystemClock)));
//! let runner = QueueRunner::new(memory.clone(), Arc::new(FnExecutor::new(store_embedding)));
//!
//! let manager = PoolManager::new(events);
//! manager.create_bound_pool("memory", PoolConfig::new().with_size(2), Arc::new(runner))?;
//! manager.start_all()?;
//! memory.enqueue(WorkItem::new("embed", doc).with_owner("agent-7").with_cost(512))?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct queues and pools from configuration.
pub mod builders;
/// Configuration models for queues and pools.
pub mod config;
/// Core scheduling abstractions, events and worker pools.
pub mod core;
/// Concrete queues for each resource class.
pub mod queue;
/// Shared utilities.
pub mod util;
