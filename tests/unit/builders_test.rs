//! Tests for building queues and pools from configuration

use std::sync::Arc;

use resource_scheduler::builders::{build_pools, build_queues, QueueSet};
use resource_scheduler::config::{PoolConfig, SchedulerConfig};
use resource_scheduler::core::{
    AppResult, Clock, Completion, EventSink, FnExecutor, NullEventSink, PoolManager, QueueBinding,
    QueueRunner, SchedulerError, StorageTag, SystemClock, WorkItem,
};
use serde_json::json;

fn sinks() -> (Arc<dyn EventSink>, Arc<dyn Clock>) {
    (Arc::new(NullEventSink), Arc::new(SystemClock))
}

#[test]
fn test_build_queues_uses_configured_kinds() {
    let mut cfg = SchedulerConfig::default();
    cfg.inference.max_concurrency = 2;
    let (events, clock) = sinks();
    let queues: QueueSet<String, String, StorageTag> = build_queues(&cfg, &events, &clock).unwrap();

    assert_eq!(queues.inference.kind(), "inference");
    assert_eq!(queues.inference.max_concurrency(), 2);
    assert_eq!(queues.memory.kind(), "memory");
    assert_eq!(queues.storage.kind(), "storage");
    assert_eq!(queues.storage.batch_window().as_millis(), 500);
}

#[test]
fn test_build_queues_rejects_invalid_config() {
    let mut cfg = SchedulerConfig::default();
    cfg.storage.batch_size = 1;
    let (events, clock) = sinks();
    let result: Result<QueueSet<(), (), StorageTag>, _> = build_queues(&cfg, &events, &clock);
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn test_build_pools_binds_named_queue() {
    let mut cfg = SchedulerConfig::default();
    cfg.pools.insert(
        "llm".to_string(),
        PoolConfig::new().with_size(1).with_queue("inference"),
    );
    cfg.pools
        .insert("misc".to_string(), PoolConfig::new().with_size(1));

    let (events, clock) = sinks();
    let queues: QueueSet<u32, (), StorageTag> = build_queues(&cfg, &events, &clock).unwrap();
    let manager = PoolManager::new(events);
    let mut requested = Vec::new();
    let pools = build_pools(&cfg, &manager, |pool, _cfg, kind| {
        requested.push((pool.to_string(), kind.to_string()));
        let exec = FnExecutor::new(|item: &WorkItem<u32>| -> AppResult<Completion> {
            Ok(Completion::new(json!(item.payload)))
        });
        let binding: Arc<dyn QueueBinding> =
            Arc::new(QueueRunner::new(Arc::clone(&queues.inference), Arc::new(exec)));
        Ok(binding)
    })
    .unwrap();

    assert_eq!(pools.len(), 2);
    assert_eq!(requested, vec![("llm".to_string(), "inference".to_string())]);
    let stats = manager.stats();
    assert_eq!(stats["llm"].bound_queue.as_deref(), Some("inference"));
    assert_eq!(stats["misc"].bound_queue, None);
}
