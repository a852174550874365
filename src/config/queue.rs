//! Per-queue configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::policy::SchedulingPolicy;
use crate::core::scheduler::DEFAULT_HISTORY_LIMIT;

const DEFAULT_AGING_THRESHOLD_MS: u64 = 10_000;

fn validate_common(kind: &str, max_concurrency: usize) -> Result<(), String> {
    if kind.trim().is_empty() {
        return Err("kind must not be empty".into());
    }
    if max_concurrency == 0 {
        return Err("max_concurrency must be greater than 0".into());
    }
    Ok(())
}

/// Priority-FIFO queue for model-inference calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityFifoConfig {
    /// Kind used in event topics.
    pub kind: String,
    /// Maximum concurrently running items.
    pub max_concurrency: usize,
    /// Maximum dequeues per second.
    pub rate_limit_rps: Option<f64>,
    /// Token budget over a sliding 60 second window.
    pub tokens_per_minute: Option<u64>,
    /// Finished items kept for statistics.
    pub history_limit: usize,
}

impl Default for PriorityFifoConfig {
    fn default() -> Self {
        Self {
            kind: "inference".into(),
            max_concurrency: 4,
            rate_limit_rps: None,
            tokens_per_minute: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl PriorityFifoConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency bound.
    #[must_use]
    pub const fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Limit dequeues to `rps` per second.
    #[must_use]
    pub const fn with_rate_limit(mut self, rps: f64) -> Self {
        self.rate_limit_rps = Some(rps);
        self
    }

    /// Cap tokens used per minute.
    #[must_use]
    pub const fn with_token_budget(mut self, tokens_per_minute: u64) -> Self {
        self.tokens_per_minute = Some(tokens_per_minute);
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        validate_common(&self.kind, self.max_concurrency)?;
        if let Some(rps) = self.rate_limit_rps {
            if !rps.is_finite() || rps <= 0.0 {
                return Err("rate_limit_rps must be a positive number".into());
            }
        }
        if self.tokens_per_minute == Some(0) {
            return Err("tokens_per_minute must be greater than 0".into());
        }
        Ok(())
    }
}

/// Fairness queue for memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FairnessConfig {
    /// Kind used in event topics.
    pub kind: String,
    /// Maximum concurrently running items.
    pub max_concurrency: usize,
    /// Initial selection discipline.
    pub policy: SchedulingPolicy,
    /// Waiting time per one-level priority promotion.
    pub aging_threshold_ms: u64,
    /// Consecutive selections per owner before round-robin rotates.
    pub rr_quantum: u32,
    /// Finished items kept for statistics.
    pub history_limit: usize,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            kind: "memory".into(),
            max_concurrency: 8,
            policy: SchedulingPolicy::ShortestJobFirst,
            aging_threshold_ms: DEFAULT_AGING_THRESHOLD_MS,
            rr_quantum: 1,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl FairnessConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency bound.
    #[must_use]
    pub const fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the initial discipline.
    #[must_use]
    pub const fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the round-robin quantum.
    #[must_use]
    pub const fn with_rr_quantum(mut self, rr_quantum: u32) -> Self {
        self.rr_quantum = rr_quantum;
        self
    }

    /// Aging threshold as a duration.
    #[must_use]
    pub const fn aging_threshold(&self) -> Duration {
        Duration::from_millis(self.aging_threshold_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        validate_common(&self.kind, self.max_concurrency)?;
        if self.aging_threshold_ms == 0 {
            return Err("aging_threshold_ms must be greater than 0".into());
        }
        if self.rr_quantum == 0 {
            return Err("rr_quantum must be greater than 0".into());
        }
        Ok(())
    }
}

/// Coalescing queue for storage operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoalescingConfig {
    /// Kind used in event topics.
    pub kind: String,
    /// Maximum concurrently running items.
    pub max_concurrency: usize,
    /// Initial selection discipline (no earliest-deadline-first).
    pub policy: SchedulingPolicy,
    /// Prefer read operations over writes when both are pending.
    pub reads_first: bool,
    /// Minimum age of a group's oldest member before it may be coalesced.
    pub batch_window_ms: u64,
    /// Largest batch handed out at once.
    pub batch_size: usize,
    /// Waiting time per one-level priority promotion.
    pub aging_threshold_ms: u64,
    /// Consecutive selections per owner before round-robin rotates.
    pub rr_quantum: u32,
    /// Finished items kept for statistics.
    pub history_limit: usize,
}

impl Default for CoalescingConfig {
    fn default() -> Self {
        Self {
            kind: "storage".into(),
            max_concurrency: 4,
            policy: SchedulingPolicy::ShortestJobFirst,
            reads_first: false,
            batch_window_ms: 500,
            batch_size: 10,
            aging_threshold_ms: DEFAULT_AGING_THRESHOLD_MS,
            rr_quantum: 1,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl CoalescingConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency bound.
    #[must_use]
    pub const fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the initial discipline.
    #[must_use]
    pub const fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Prefer reads over writes.
    #[must_use]
    pub const fn with_reads_first(mut self, reads_first: bool) -> Self {
        self.reads_first = reads_first;
        self
    }

    /// Set the coalescing window.
    #[must_use]
    pub const fn with_batch_window_ms(mut self, batch_window_ms: u64) -> Self {
        self.batch_window_ms = batch_window_ms;
        self
    }

    /// Set the largest batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Coalescing window as a duration.
    #[must_use]
    pub const fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    /// Aging threshold as a duration.
    #[must_use]
    pub const fn aging_threshold(&self) -> Duration {
        Duration::from_millis(self.aging_threshold_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        validate_common(&self.kind, self.max_concurrency)?;
        if self.policy == SchedulingPolicy::EarliestDeadlineFirst {
            return Err("earliest_deadline_first is not supported for storage operations".into());
        }
        if self.batch_size < 2 {
            return Err("batch_size must be at least 2".into());
        }
        if self.aging_threshold_ms == 0 {
            return Err("aging_threshold_ms must be greater than 0".into());
        }
        if self.rr_quantum == 0 {
            return Err("rr_quantum must be greater than 0".into());
        }
        Ok(())
    }
}
