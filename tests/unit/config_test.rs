//! Tests for configuration validation

use resource_scheduler::config::{
    CoalescingConfig, FairnessConfig, PoolConfig, PriorityFifoConfig, SchedulerConfig,
};
use resource_scheduler::core::SchedulingPolicy;

#[test]
fn test_default_config_is_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.queue_kinds(), ["inference", "memory", "storage"]);
}

#[test]
fn test_queue_defaults() {
    let fairness = FairnessConfig::default();
    assert_eq!(fairness.aging_threshold_ms, 10_000);
    assert_eq!(fairness.rr_quantum, 1);
    assert_eq!(fairness.policy, SchedulingPolicy::ShortestJobFirst);

    let storage = CoalescingConfig::default();
    assert_eq!(storage.batch_window_ms, 500);
    assert_eq!(storage.batch_size, 10);
    assert!(!storage.reads_first);

    let inference = PriorityFifoConfig::default();
    assert!(inference.rate_limit_rps.is_none());
    assert!(inference.tokens_per_minute.is_none());
}

#[test]
fn test_zero_concurrency_rejected() {
    let mut cfg = SchedulerConfig::default();
    cfg.memory.max_concurrency = 0;
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("memory queue invalid"), "{err}");
}

#[test]
fn test_queue_kinds_must_be_distinct() {
    let mut cfg = SchedulerConfig::default();
    cfg.storage.kind = "memory".to_string();
    assert!(cfg.validate().is_err());
}

#[test]
fn test_pool_bound_to_unknown_queue() {
    let mut cfg = SchedulerConfig::default();
    cfg.pools
        .insert("gpu".to_string(), PoolConfig::new().with_queue("video"));
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("unknown queue"), "{err}");
}

#[test]
fn test_from_json_str_partial() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "inference": { "max_concurrency": 2, "rate_limit_rps": 2.0 },
            "memory": { "policy": "round_robin", "rr_quantum": 2 },
            "storage": { "reads_first": true },
            "pools": {
                "llm": { "size": 2, "queue": "inference", "affinity": [0, 1] },
                "scratch": { "size": 1 }
            }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.inference.max_concurrency, 2);
    assert_eq!(cfg.inference.rate_limit_rps, Some(2.0));
    assert_eq!(cfg.inference.kind, "inference");
    assert_eq!(cfg.memory.policy, SchedulingPolicy::RoundRobin);
    assert_eq!(cfg.memory.rr_quantum, 2);
    assert!(cfg.storage.reads_first);
    assert_eq!(cfg.pools["llm"].queue.as_deref(), Some("inference"));
    assert_eq!(cfg.pools["llm"].affinity, Some(vec![0, 1]));
    assert_eq!(cfg.pools["scratch"].idle_wait_ms, 10);
}

#[test]
fn test_from_json_str_rejects_edf_storage() {
    let err = SchedulerConfig::from_json_str(
        r#"{ "storage": { "policy": "earliest_deadline_first" } }"#,
    )
    .unwrap_err();
    assert!(err.contains("storage queue invalid"), "{err}");
}

#[test]
fn test_from_json_str_parse_error() {
    let err = SchedulerConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"), "{err}");
}

#[test]
fn test_from_file_missing() {
    assert!(SchedulerConfig::from_file("/nonexistent/scheduler.json").is_err());
}
