//! Build queues and pools from a validated [`SchedulerConfig`].

use std::sync::Arc;

use crate::config::{PoolConfig, SchedulerConfig};
use crate::core::{
    Clock, EventSink, PoolManager, QueueBinding, SchedulerError, StorageOperation, WorkerPool,
};
use crate::queue::{CoalescingQueue, FairnessQueue, PriorityFifoQueue};

/// The three resource-class queues, shareable across producers and workers.
pub struct QueueSet<PI, PM, PS> {
    /// Model-inference queue.
    pub inference: Arc<PriorityFifoQueue<PI>>,
    /// Memory-operation queue.
    pub memory: Arc<FairnessQueue<PM>>,
    /// Storage-operation queue.
    pub storage: Arc<CoalescingQueue<PS>>,
}

/// Build the inference, memory and storage queues, all sharing one event
/// sink and one clock.
///
/// # Errors
///
/// Returns `SchedulerError::InvalidConfig` if `cfg` does not validate.
pub fn build_queues<PI, PM, PS>(
    cfg: &SchedulerConfig,
    events: &Arc<dyn EventSink>,
    clock: &Arc<dyn Clock>,
) -> Result<QueueSet<PI, PM, PS>, SchedulerError>
where
    PI: Send + 'static,
    PM: Send + 'static,
    PS: StorageOperation + Send + 'static,
{
    cfg.validate()
        .map_err(|e| SchedulerError::InvalidConfig(format!("config invalid: {e}")))?;
    Ok(QueueSet {
        inference: Arc::new(PriorityFifoQueue::new(
            &cfg.inference,
            Arc::clone(events),
            Arc::clone(clock),
        )),
        memory: Arc::new(FairnessQueue::new(
            &cfg.memory,
            Arc::clone(events),
            Arc::clone(clock),
        )),
        storage: Arc::new(CoalescingQueue::new(
            &cfg.storage,
            Arc::clone(events),
            Arc::clone(clock),
        )?),
    })
}

/// Register every configured pool with `manager`.
///
/// Pools that name a queue get a binding from `binding_factory`, called
/// with the pool name, its configuration and the queue kind.
///
/// # Errors
///
/// Invalid configuration, duplicate pool names, or a factory error.
pub fn build_pools<F>(
    cfg: &SchedulerConfig,
    manager: &PoolManager,
    mut binding_factory: F,
) -> Result<Vec<Arc<WorkerPool>>, SchedulerError>
where
    F: FnMut(&str, &PoolConfig, &str) -> Result<Arc<dyn QueueBinding>, SchedulerError>,
{
    cfg.validate()
        .map_err(|e| SchedulerError::InvalidConfig(format!("config invalid: {e}")))?;

    let mut pools = Vec::with_capacity(cfg.pools.len());
    for (name, pool_cfg) in &cfg.pools {
        let pool = match pool_cfg.queue.as_deref() {
            Some(kind) => {
                let binding = binding_factory(name, pool_cfg, kind)?;
                manager.create_bound_pool(name, pool_cfg.clone(), binding)?
            }
            None => manager.add_pool(WorkerPool::new(name.as_str(), pool_cfg.clone())?)?,
        };
        pools.push(pool);
    }
    Ok(pools)
}
