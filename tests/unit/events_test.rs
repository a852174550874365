//! Tests for lifecycle events emitted by queues

use std::sync::Arc;

use resource_scheduler::config::{FairnessConfig, PriorityFifoConfig};
use resource_scheduler::core::{
    EventBus, EventSink, InMemoryEventSink, Priority, SchedulerError, SchedulerEvent, SystemClock,
    WorkItem, WorkState,
};
use resource_scheduler::queue::{FairnessQueue, PriorityFifoQueue};
use serde_json::json;

struct BrokenSink;

impl EventSink for BrokenSink {
    fn publish(&self, _event: &SchedulerEvent) -> Result<(), SchedulerError> {
        Err(SchedulerError::EventPublish("collector unreachable".into()))
    }
}

#[test]
fn test_failed_item_emits_failed_event() {
    let sink = Arc::new(InMemoryEventSink::new(16));
    let q = FairnessQueue::new(&FairnessConfig::default(), sink.clone(), Arc::new(SystemClock));
    let id = q
        .enqueue(WorkItem::new("recall", ()).with_owner("agent-9").with_priority(Priority::High))
        .unwrap();
    q.dequeue().unwrap();
    q.fail(id, "index corrupt");

    let events = sink.events();
    let topics: Vec<_> = events.iter().map(|e| e.topic.as_str()).collect();
    assert_eq!(
        topics,
        vec!["queue.memory.enqueued", "queue.memory.started", "queue.memory.failed"]
    );
    let last = events[2].work.as_ref().unwrap();
    assert_eq!(last.request_id, id);
    assert_eq!(last.request_name, "recall");
    assert_eq!(last.owner.as_deref(), Some("agent-9"));
    assert_eq!(last.priority, Priority::High);
    assert_eq!(last.state, WorkState::Failed);
}

#[test]
fn test_broken_sink_never_breaks_scheduling() {
    let q = PriorityFifoQueue::new(
        &PriorityFifoConfig::default(),
        Arc::new(BrokenSink),
        Arc::new(SystemClock),
    );
    let id = q.enqueue(WorkItem::new("chat", 1)).unwrap();
    assert_eq!(q.dequeue().unwrap().id(), id);
    q.complete(id, json!("hi"));
    assert_eq!(q.stats().total_completed, 1);
}

#[test]
fn test_bus_subscribers_see_queue_traffic() {
    let bus = EventBus::new();
    let completed = bus.subscribe("queue.inference.completed");
    let everything = bus.subscribe("");
    let q = PriorityFifoQueue::new(&PriorityFifoConfig::default(), bus.clone(), Arc::new(SystemClock));

    let id = q.enqueue(WorkItem::new("chat", 1)).unwrap();
    q.dequeue().unwrap();
    q.complete(id, json!({"tokens": 12}));

    let evt = completed.try_recv().unwrap();
    assert_eq!(evt.work.unwrap().state, WorkState::Completed);
    assert!(completed.try_recv().is_err());
    assert_eq!(everything.try_iter().count(), 3);
}

#[test]
fn test_event_json_shape() {
    let item = WorkItem::new("chat", ()).with_owner("agent-1");
    let json = serde_json::to_value(SchedulerEvent::work("inference", "enqueued", &item.meta)).unwrap();
    assert_eq!(json["topic"], "queue.inference.enqueued");
    assert_eq!(json["work"]["owner"], "agent-1");
    assert_eq!(json["work"]["priority"], "normal");
    assert!(json["event_id"].is_string());
}
