//! Core scheduling abstractions: work items, the queue shell, events,
//! executors and worker pools.

pub mod dispatch;
pub mod error;
pub mod events;
pub mod executor;
pub mod policy;
pub mod scheduler;
pub mod work_item;
pub mod worker_pool;

pub use dispatch::{QueueBinding, QueueRunner};
pub use error::{AffinityError, AppResult, SchedulerError};
pub use events::{
    EventBus, EventSink, InMemoryEventSink, NullEventSink, SchedulerEvent, TracingEventSink,
    WorkEventData,
};
pub use executor::{FnExecutor, WorkExecutor};
pub use policy::{PickContext, SchedulingPolicy, SelectionPolicy};
pub use scheduler::{Scheduler, StatsSnapshot, DEFAULT_HISTORY_LIMIT};
pub use work_item::{
    Completion, IoOperation, Priority, StorageOperation, StorageTag, WorkId, WorkItem, WorkMeta,
    WorkState,
};
pub use worker_pool::{
    available_cpus, pin_current_thread, Job, PoolManager, PoolStats, WorkerPool, WorkerStats,
};

pub use crate::util::clock::{Clock, ManualClock, SystemClock};
