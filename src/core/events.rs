//! Lifecycle events and the sinks that receive them.
//!
//! Queues and pool managers publish [`SchedulerEvent`]s to an injected
//! [`EventSink`]. Publishing is fire-and-forget: callers log and drop any
//! error so that observability can never break scheduling.

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use uuid::Uuid;

use crate::core::error::SchedulerError;
use crate::core::work_item::{Priority, WorkId, WorkMeta, WorkState};
use crate::util::clock::now_ms;

/// Per-item fields carried by queue events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkEventData {
    /// Item identifier.
    pub request_id: WorkId,
    /// Item name.
    pub request_name: String,
    /// Fairness owner, if any.
    pub owner: Option<String>,
    /// Priority at the time of the event.
    pub priority: Priority,
    /// State after the transition that produced the event.
    pub state: WorkState,
}

impl From<&WorkMeta> for WorkEventData {
    fn from(meta: &WorkMeta) -> Self {
        Self {
            request_id: meta.id,
            request_name: meta.name.clone(),
            owner: meta.owner.clone(),
            priority: meta.priority,
            state: meta.state(),
        }
    }
}

/// A published lifecycle event.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerEvent {
    /// Event identifier.
    pub event_id: Uuid,
    /// Dotted topic, e.g. `queue.memory.started`.
    pub topic: String,
    /// Wall-clock timestamp in milliseconds.
    pub created_at_ms: u128,
    /// Item the event refers to, for queue events.
    pub work: Option<WorkEventData>,
    /// Pools the event refers to, for pool events.
    pub pools: Vec<String>,
}

impl SchedulerEvent {
    /// Build a queue event for `meta` under `queue.<kind>.<action>`.
    #[must_use]
    pub fn work(kind: &str, action: &str, meta: &WorkMeta) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            topic: format!("queue.{kind}.{action}"),
            created_at_ms: now_ms(),
            work: Some(WorkEventData::from(meta)),
            pools: Vec::new(),
        }
    }

    /// Build a pool-manager event.
    #[must_use]
    pub fn pools(topic: impl Into<String>, pools: Vec<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            topic: topic.into(),
            created_at_ms: now_ms(),
            work: None,
            pools,
        }
    }
}

/// Destination for lifecycle events.
pub trait EventSink: Send + Sync {
    /// Publish one event.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::EventPublish` when the sink could not accept
    /// the event. Callers swallow this.
    fn publish(&self, event: &SchedulerEvent) -> Result<(), SchedulerError>;
}

/// Publish an event, logging and discarding any failure.
pub(crate) fn emit(sink: &dyn EventSink, event: &SchedulerEvent) {
    if let Err(e) = sink.publish(event) {
        tracing::warn!(topic = %event.topic, error = %e, "dropping scheduler event");
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _event: &SchedulerEvent) -> Result<(), SchedulerError> {
        Ok(())
    }
}

/// Sink that writes events as structured `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: &SchedulerEvent) -> Result<(), SchedulerError> {
        match &event.work {
            Some(work) => tracing::info!(
                topic = %event.topic,
                request_id = %work.request_id,
                request_name = %work.request_name,
                owner = work.owner.as_deref().unwrap_or("-"),
                priority = ?work.priority,
                state = work.state.as_str(),
                "scheduler event"
            ),
            None => tracing::info!(topic = %event.topic, pools = ?event.pools, "scheduler event"),
        }
        Ok(())
    }
}

/// In-memory sink for testing and dev, keeping the most recent events.
pub struct InMemoryEventSink {
    events: Mutex<VecDeque<SchedulerEvent>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Topics of stored events, oldest first.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.topic.clone()).collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn publish(&self, event: &SchedulerEvent) -> Result<(), SchedulerError> {
        let mut events = self.events.lock();
        if self.max_events == 0 {
            return Ok(());
        }
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }
}

struct Subscription {
    prefix: String,
    tx: Sender<SchedulerEvent>,
}

/// Publish/subscribe bus. Subscribers receive every event whose topic
/// starts with their prefix; disconnected subscribers are pruned on publish.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Subscription>>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribe to topics starting with `prefix` (empty prefix = everything).
    pub fn subscribe(&self, prefix: impl Into<String>) -> Receiver<SchedulerEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.write().push(Subscription {
            prefix: prefix.into(),
            tx,
        });
        rx
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: &SchedulerEvent) -> Result<(), SchedulerError> {
        let dead: Vec<Sender<SchedulerEvent>> = {
            let subscribers = self.subscribers.read();
            subscribers
                .iter()
                .filter(|s| event.topic.starts_with(&s.prefix))
                .filter(|s| s.tx.send(event.clone()).is_err())
                .map(|s| s.tx.clone())
                .collect()
        };
        if dead.is_empty() {
            return Ok(());
        }
        // Match by channel; indices can shift once the read lock is released.
        self.subscribers
            .write()
            .retain(|s| !dead.iter().any(|d| d.same_channel(&s.tx)));
        Err(SchedulerError::EventPublish(format!(
            "{} subscriber(s) disconnected",
            dead.len()
        )))
    }
}
