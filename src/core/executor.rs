//! Execution bodies supplied by the caller.

use async_trait::async_trait;

use crate::core::error::AppResult;
use crate::core::work_item::{Completion, WorkItem};

/// Runs dequeued work items.
///
/// Bound workers call this from a dedicated OS thread with its own
/// single-threaded tokio runtime, so CPU/GPU-bound bodies do not block the
/// application's main runtime.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use resource_scheduler::core::{AppResult, Completion, WorkExecutor, WorkItem};
///
/// struct Inference;
///
/// #[async_trait]
/// impl WorkExecutor<String> for Inference {
///     async fn execute(&self, item: &WorkItem<String>) -> AppResult<Completion> {
///         let text = run_model(&item.payload).await?;
///         Ok(Completion::new(text.into()).with_tokens(text.len() as u64))
///     }
/// }
/// ```
#[async_trait]
pub trait WorkExecutor<P>: Send + Sync + 'static
where
    P: Send + Sync + 'static,
{
    /// Execute one item. An `Err` is recorded on the item with `fail`.
    async fn execute(&self, item: &WorkItem<P>) -> AppResult<Completion>;

    /// Execute a coalesced batch, returning one outcome per item in order.
    ///
    /// The default runs the items one after another; storage executors
    /// override it to issue a single combined operation.
    async fn execute_batch(&self, items: &[WorkItem<P>]) -> Vec<AppResult<Completion>> {
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            outcomes.push(self.execute(item).await);
        }
        outcomes
    }
}

/// Adapts a synchronous closure into a [`WorkExecutor`].
pub struct FnExecutor<F> {
    body: F,
}

impl<F> FnExecutor<F> {
    /// Wrap `body`.
    pub const fn new(body: F) -> Self {
        Self { body }
    }
}

#[async_trait]
impl<P, F> WorkExecutor<P> for FnExecutor<F>
where
    P: Send + Sync + 'static,
    F: Fn(&WorkItem<P>) -> AppResult<Completion> + Send + Sync + 'static,
{
    async fn execute(&self, item: &WorkItem<P>) -> AppResult<Completion> {
        (self.body)(item)
    }
}
