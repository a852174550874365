//! Tests for utility functions

use std::time::Duration;

use resource_scheduler::core::{Priority, WorkItem, WorkState};
use resource_scheduler::util::{init_tracing, init_tracing_with, now_ms, Clock, ManualClock, SystemClock};

#[test]
fn test_priority_ordering() {
    assert!(Priority::Critical < Priority::High);
    assert!(Priority::High < Priority::Normal);
    assert!(Priority::Normal < Priority::Low);
    assert_eq!(Priority::default(), Priority::Normal);
}

#[test]
fn test_priority_serde_names() {
    assert_eq!(serde_json::to_string(&Priority::Critical).unwrap(), "\"critical\"");
    let low: Priority = serde_json::from_str("\"low\"").unwrap();
    assert_eq!(low, Priority::Low);
}

#[test]
fn test_manual_clock_only_moves_when_advanced() {
    let clock = ManualClock::new();
    let t0 = clock.now();
    assert_eq!(clock.now(), t0);
    clock.advance(Duration::from_millis(250));
    assert_eq!(clock.now() - t0, Duration::from_millis(250));
}

#[test]
fn test_system_clock_is_monotonic() {
    let a = SystemClock.now();
    let b = SystemClock.now();
    assert!(b >= a);
    assert!(now_ms() > 0);
}

#[test]
fn test_work_item_defaults() {
    let item = WorkItem::new("embed", "doc-1");
    assert_eq!(item.meta.priority, Priority::Normal);
    assert_eq!(item.meta.state(), WorkState::Pending);
    assert_eq!(item.meta.estimated_cost, 0);
    assert!(item.meta.owner.is_none());
    assert!(item.meta.started_at().is_none());
}

#[test]
fn test_init_tracing_twice() {
    init_tracing();
    init_tracing_with("resource_scheduler=debug");
    init_tracing();
    tracing::debug!("tracing initialised repeatedly without panicking");
}
