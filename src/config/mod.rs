//! Configuration models for queues and worker pools.

pub mod pool;
pub mod queue;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

pub use pool::PoolConfig;
pub use queue::{CoalescingConfig, FairnessConfig, PriorityFifoConfig};

/// Environment variable holding the path of a JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "RESOURCE_SCHEDULER_CONFIG";

/// Root scheduler configuration: one queue per resource class plus named pools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Model-inference queue.
    pub inference: PriorityFifoConfig,
    /// Memory-operation queue.
    pub memory: FairnessConfig,
    /// Storage-operation queue.
    pub storage: CoalescingConfig,
    /// Map of pool name to configuration.
    pub pools: BTreeMap<String, PoolConfig>,
}

impl SchedulerConfig {
    /// Queue kinds configured here, in declaration order.
    #[must_use]
    pub fn queue_kinds(&self) -> [&str; 3] {
        [&self.inference.kind, &self.memory.kind, &self.storage.kind]
    }

    /// Validate every queue and pool.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        self.inference
            .validate()
            .map_err(|e| format!("inference queue invalid: {e}"))?;
        self.memory
            .validate()
            .map_err(|e| format!("memory queue invalid: {e}"))?;
        self.storage
            .validate()
            .map_err(|e| format!("storage queue invalid: {e}"))?;

        let kinds = self.queue_kinds();
        if kinds[0] == kinds[1] || kinds[0] == kinds[2] || kinds[1] == kinds[2] {
            return Err("queue kinds must be distinct".into());
        }

        for (name, pool) in &self.pools {
            if name.trim().is_empty() {
                return Err("pool names must not be empty".into());
            }
            pool.validate()
                .map_err(|e| format!("pool `{name}` invalid: {e}"))?;
            if let Some(queue) = &pool.queue {
                if !kinds.contains(&queue.as_str()) {
                    return Err(format!("pool `{name}` is bound to unknown queue `{queue}`"));
                }
            }
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scheduler config {}", path.display()))?;
        Self::from_json_str(&raw).map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))
    }

    /// Load configuration from the file named by `RESOURCE_SCHEDULER_CONFIG`
    /// (a `.env` file is honoured), falling back to defaults when unset.
    ///
    /// # Errors
    ///
    /// Fails if the referenced file is unreadable or invalid.
    pub fn from_env() -> AppResult<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e).context("loading .env");
            }
        }
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path),
            Err(_) => {
                tracing::debug!("{CONFIG_PATH_ENV} not set, using default scheduler config");
                Ok(Self::default())
            }
        }
    }
}
