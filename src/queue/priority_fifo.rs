//! Priority-FIFO queue for model-inference calls.
//!
//! Selection takes the most urgent priority band and, within it, the oldest
//! item. Two optional admission gates run first: a minimum interval between
//! successful dequeues and a per-minute token budget fed by completions.
//! A denied gate makes `dequeue` return `None` even with work pending.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::PriorityFifoConfig;
use crate::core::events::EventSink;
use crate::core::policy::{PickContext, SelectionPolicy};
use crate::core::scheduler::Scheduler;
use crate::core::work_item::{Completion, WorkMeta};
use crate::queue::selection::priority_then_arrival;
use crate::util::clock::Clock;

/// Sliding window of the token budget.
pub const TOKEN_WINDOW: Duration = Duration::from_secs(60);

/// Priority-FIFO selection with rate-limit and token-budget gates.
#[derive(Debug, Clone, Default)]
pub struct PriorityFifo {
    min_interval: Option<Duration>,
    token_budget: Option<u64>,
    last_dequeue: Option<Instant>,
    token_usage: VecDeque<(Instant, u64)>,
}

impl PriorityFifo {
    /// Ungated priority-FIFO selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the policy described by `config`.
    #[must_use]
    pub fn from_config(config: &PriorityFifoConfig) -> Self {
        let mut policy = Self::new();
        if let Some(rps) = config.rate_limit_rps {
            policy = policy.with_rate_limit(rps);
        }
        if let Some(budget) = config.tokens_per_minute {
            policy = policy.with_token_budget(budget);
        }
        policy
    }

    /// Allow at most `rps` successful dequeues per second.
    /// Non-positive or non-finite rates leave the limiter off.
    #[must_use]
    pub fn with_rate_limit(mut self, rps: f64) -> Self {
        self.min_interval = (rps.is_finite() && rps > 0.0)
            .then(|| Duration::try_from_secs_f64(1.0 / rps).ok())
            .flatten();
        self
    }

    /// Deny dequeues while the last minute's usage meets `tokens_per_minute`.
    #[must_use]
    pub fn with_token_budget(mut self, tokens_per_minute: u64) -> Self {
        self.token_budget = Some(tokens_per_minute);
        self
    }

    /// Minimum interval between successful dequeues, if rate limited.
    #[must_use]
    pub const fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    /// Tokens recorded within the window ending at `now`.
    #[must_use]
    pub fn tokens_in_window(&self, now: Instant) -> u64 {
        self.token_usage
            .iter()
            .filter(|(at, _)| now.saturating_duration_since(*at) < TOKEN_WINDOW)
            .map(|(_, tokens)| *tokens)
            .sum()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&(at, _)) = self.token_usage.front() {
            if now.saturating_duration_since(at) < TOKEN_WINDOW {
                break;
            }
            self.token_usage.pop_front();
        }
    }

    fn rate_limited(&self, now: Instant) -> bool {
        match (self.min_interval, self.last_dequeue) {
            (Some(min), Some(last)) => now.saturating_duration_since(last) < min,
            _ => false,
        }
    }

    fn over_budget(&mut self, now: Instant) -> bool {
        let Some(budget) = self.token_budget else {
            return false;
        };
        self.prune(now);
        self.tokens_in_window(now) >= budget
    }
}

impl<P> SelectionPolicy<P> for PriorityFifo {
    fn pick_next(&mut self, ctx: &mut PickContext<'_, P>) -> Option<usize> {
        if !ctx.has_free_slot() || ctx.pending.is_empty() {
            return None;
        }
        if self.rate_limited(ctx.now) {
            tracing::trace!("dequeue denied by rate limiter");
            return None;
        }
        if self.over_budget(ctx.now) {
            tracing::debug!(
                used = self.tokens_in_window(ctx.now),
                "dequeue denied by token budget"
            );
            return None;
        }
        let candidates: Vec<usize> = (0..ctx.pending.len()).collect();
        let idx = priority_then_arrival(ctx.pending, &candidates)?;
        self.last_dequeue = Some(ctx.now);
        Some(idx)
    }

    fn on_finished(&mut self, _meta: &WorkMeta, completion: Option<&Completion>, now: Instant) {
        if let Some(tokens) = completion.and_then(|c| c.tokens_used) {
            if tokens > 0 {
                self.token_usage.push_back((now, tokens));
            }
        }
        self.prune(now);
    }
}

/// Queue for model-inference calls.
pub type PriorityFifoQueue<P> = Scheduler<P, PriorityFifo>;

impl<P: Send + 'static> Scheduler<P, PriorityFifo> {
    /// Build an inference queue from its configuration.
    pub fn new(
        config: &PriorityFifoConfig,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_policy(
            config.kind.clone(),
            config.max_concurrency,
            PriorityFifo::from_config(config),
            events,
            clock,
        )
        .with_history_limit(config.history_limit)
    }

    /// Tokens counted against the budget right now.
    #[must_use]
    pub fn tokens_in_window(&self) -> u64 {
        let now = self.now();
        self.inspect_policy(|policy| policy.tokens_in_window(now))
    }
}
