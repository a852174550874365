//! Registry of named worker pools.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::config::PoolConfig;
use crate::core::dispatch::QueueBinding;
use crate::core::error::SchedulerError;
use crate::core::events::{emit, EventSink, SchedulerEvent};

use super::{PoolStats, WorkerPool};

/// Owns named pools and starts/stops them together.
pub struct PoolManager {
    pools: RwLock<BTreeMap<String, Arc<WorkerPool>>>,
    events: Arc<dyn EventSink>,
}

impl PoolManager {
    /// Create an empty manager publishing lifecycle events to `events`.
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            pools: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    /// Create and register a stopped pool of `size` workers, optionally
    /// pinned to `affinity`.
    ///
    /// # Errors
    ///
    /// `DuplicatePool` if the name is taken, `InvalidConfig` for an invalid
    /// size or affinity list.
    pub fn create_pool(
        &self,
        name: &str,
        size: usize,
        affinity: Option<Vec<usize>>,
    ) -> Result<Arc<WorkerPool>, SchedulerError> {
        let mut config = PoolConfig::new().with_size(size);
        config.affinity = affinity;
        self.add_pool(WorkerPool::new(name, config)?)
    }

    /// Create and register a pool that drains `binding`'s queue.
    ///
    /// # Errors
    ///
    /// As [`PoolManager::create_pool`].
    pub fn create_bound_pool(
        &self,
        name: &str,
        config: PoolConfig,
        binding: Arc<dyn QueueBinding>,
    ) -> Result<Arc<WorkerPool>, SchedulerError> {
        self.add_pool(WorkerPool::new(name, config)?.with_binding(binding))
    }

    /// Register an existing pool.
    ///
    /// # Errors
    ///
    /// `DuplicatePool` if a pool with the same name is registered.
    pub fn add_pool(&self, pool: WorkerPool) -> Result<Arc<WorkerPool>, SchedulerError> {
        let mut pools = self.pools.write();
        if pools.contains_key(pool.name()) {
            return Err(SchedulerError::DuplicatePool(pool.name().to_string()));
        }
        let pool = Arc::new(pool);
        pools.insert(pool.name().to_string(), Arc::clone(&pool));
        info!(pool = %pool.name(), size = pool.size(), "worker pool registered");
        Ok(pool)
    }

    /// Look up a pool.
    #[must_use]
    pub fn get_pool(&self, name: &str) -> Option<Arc<WorkerPool>> {
        self.pools.read().get(name).cloned()
    }

    /// Stop and unregister a pool.
    pub fn remove_pool(&self, name: &str) -> Option<Arc<WorkerPool>> {
        let pool = self.pools.write().remove(name)?;
        pool.stop();
        Some(pool)
    }

    /// Registered pool names, sorted.
    #[must_use]
    pub fn pool_names(&self) -> Vec<String> {
        self.pools.read().keys().cloned().collect()
    }

    fn snapshot(&self) -> Vec<Arc<WorkerPool>> {
        self.pools.read().values().cloned().collect()
    }

    /// Start every pool, then publish `threadpool.all_started`.
    ///
    /// # Errors
    ///
    /// The first pool start failure; pools started before it keep running.
    pub fn start_all(&self) -> Result<(), SchedulerError> {
        let pools = self.snapshot();
        for pool in &pools {
            pool.start()?;
        }
        let names: Vec<String> = pools.iter().map(|p| p.name().to_string()).collect();
        info!(pools = ?names, "all worker pools started");
        emit(
            self.events.as_ref(),
            &SchedulerEvent::pools("threadpool.all_started", names),
        );
        Ok(())
    }

    /// Stop and join every pool, then publish `threadpool.all_stopped`.
    pub fn stop_all(&self) {
        let pools = self.snapshot();
        for pool in &pools {
            pool.stop();
        }
        let names: Vec<String> = pools.iter().map(|p| p.name().to_string()).collect();
        info!(pools = ?names, "all worker pools stopped");
        emit(
            self.events.as_ref(),
            &SchedulerEvent::pools("threadpool.all_stopped", names),
        );
    }

    /// Resize a pool live.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name, otherwise as [`WorkerPool::resize`].
    pub fn resize_pool(&self, name: &str, size: usize) -> Result<(), SchedulerError> {
        self.get_pool(name)
            .ok_or_else(|| SchedulerError::PoolNotFound(name.to_string()))?
            .resize(size)
    }

    /// Statistics of every pool, keyed by name.
    #[must_use]
    pub fn stats(&self) -> BTreeMap<String, PoolStats> {
        self.snapshot()
            .into_iter()
            .map(|pool| (pool.name().to_string(), pool.stats()))
            .collect()
    }
}
