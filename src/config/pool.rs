//! Worker pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one named worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads (0 = one per CPU).
    pub size: usize,
    /// CPUs to pin workers to, assigned round-robin. Best effort.
    pub affinity: Option<Vec<usize>>,
    /// Longest a bound worker parks before re-checking its queue.
    pub idle_wait_ms: u64,
    /// Worker thread stack size in bytes.
    pub stack_size: usize,
    /// Kind of the queue this pool drains, if any.
    pub queue: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 0,
            affinity: None,
            idle_wait_ms: 10,
            stack_size: 2 * 1024 * 1024,
            queue: None,
        }
    }
}

impl PoolConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Pin workers to these CPUs.
    #[must_use]
    pub fn with_affinity(mut self, cpus: Vec<usize>) -> Self {
        self.affinity = Some(cpus);
        self
    }

    /// Set the idle park interval.
    #[must_use]
    pub const fn with_idle_wait_ms(mut self, idle_wait_ms: u64) -> Self {
        self.idle_wait_ms = idle_wait_ms;
        self
    }

    /// Set the worker stack size.
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Bind the pool to a queue kind.
    #[must_use]
    pub fn with_queue(mut self, kind: impl Into<String>) -> Self {
        self.queue = Some(kind.into());
        self
    }

    /// Worker count with `0` resolved to the number of CPUs.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        if self.size == 0 {
            num_cpus::get().max(1)
        } else {
            self.size
        }
    }

    /// Idle park interval as a duration.
    #[must_use]
    pub const fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.idle_wait_ms == 0 {
            return Err("idle_wait_ms must be greater than 0".into());
        }
        if self.stack_size < 64 * 1024 {
            return Err("stack_size must be at least 64 KiB".into());
        }
        if self.affinity.as_ref().is_some_and(Vec::is_empty) {
            return Err("affinity must list at least one cpu when set".into());
        }
        Ok(())
    }
}
