//! Behavioural properties of the three queues.
//!
//! Timing-sensitive properties drive a `ManualClock` so they are exact and
//! independent of machine load.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use resource_scheduler::config::{CoalescingConfig, FairnessConfig, PriorityFifoConfig};
use resource_scheduler::core::{
    Clock, InMemoryEventSink, ManualClock, NullEventSink, Priority, SchedulingPolicy, StorageTag,
    SystemClock, WorkItem, WorkState,
};
use resource_scheduler::queue::{CoalescingQueue, FairnessQueue, PriorityFifoQueue};
use serde_json::json;

// ============================================================================
// HELPERS
// ============================================================================

fn manual() -> Arc<ManualClock> {
    Arc::new(ManualClock::new())
}

fn fairness(config: &FairnessConfig, clock: &Arc<ManualClock>) -> FairnessQueue<u32> {
    FairnessQueue::new(config, Arc::new(NullEventSink), clock.clone())
}

// ============================================================================
// PRIORITY-FIFO
// ============================================================================

#[test]
fn test_priority_order_is_non_decreasing() {
    let clock = manual();
    let q: PriorityFifoQueue<usize> = PriorityFifoQueue::new(
        &PriorityFifoConfig::new().with_max_concurrency(1_000),
        Arc::new(NullEventSink),
        clock.clone(),
    );
    let t0 = clock.now();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut items: Vec<WorkItem<usize>> = (0..200)
        .map(|n| {
            let priority = Priority::from_ordinal(rng.random_range(0..4));
            let offset = Duration::from_millis(rng.random_range(0..50));
            WorkItem::new("call", n)
                .with_priority(priority)
                .with_created_at(t0 + offset)
        })
        .collect();
    items.shuffle(&mut rng);
    for item in items {
        q.enqueue(item).unwrap();
    }

    let mut previous = None;
    while let Some(item) = q.dequeue() {
        let key = (item.meta.priority, item.meta.created_at());
        if let Some(prev) = previous {
            assert!(prev <= key, "{prev:?} dequeued before {key:?}");
        }
        previous = Some(key);
    }
    assert_eq!(q.running_count(), 200);
}

#[test]
fn test_rate_limiter_spaces_dequeues() {
    let clock = manual();
    let q: PriorityFifoQueue<u32> = PriorityFifoQueue::new(
        &PriorityFifoConfig::new().with_rate_limit(2.0),
        Arc::new(NullEventSink),
        clock.clone(),
    );
    for n in 0..3 {
        q.enqueue(WorkItem::new("call", n).with_created_at(clock.now())).unwrap();
    }

    assert!(q.dequeue().is_some());
    assert!(q.dequeue().is_none());
    clock.advance(Duration::from_millis(499));
    assert!(q.dequeue().is_none());
    clock.advance(Duration::from_millis(1));
    assert!(q.dequeue().is_some());
    assert!(q.dequeue().is_none());
    assert_eq!(q.pending_count(), 1);
}

// ============================================================================
// FAIRNESS
// ============================================================================

#[test]
fn test_aged_item_runs_at_high_or_above() {
    let clock = manual();
    let q = fairness(&FairnessConfig::default(), &clock);
    let stale = q
        .enqueue(WorkItem::new("stale", 0).with_cost(10).with_created_at(clock.now()))
        .unwrap();
    clock.advance(Duration::from_secs(20));
    for n in 1..=3 {
        q.enqueue(WorkItem::new("fresh", n).with_cost(10).with_created_at(clock.now()))
            .unwrap();
    }

    let first = q.dequeue().unwrap();
    assert_eq!(first.id(), stale);
    assert!(first.meta.priority <= Priority::High);
}

#[test]
fn test_round_robin_five_and_five_interleaved() {
    let clock = manual();
    let q = fairness(
        &FairnessConfig::new()
            .with_policy(SchedulingPolicy::RoundRobin)
            .with_max_concurrency(10),
        &clock,
    );
    let t0 = clock.now();
    for n in 0..5 {
        q.enqueue(WorkItem::new("a", n).with_owner("A").with_created_at(t0)).unwrap();
    }
    for n in 0..5 {
        q.enqueue(WorkItem::new("b", n).with_owner("B").with_created_at(t0)).unwrap();
    }

    let owners: Vec<String> = (0..10)
        .map(|_| q.dequeue().unwrap().meta.owner.unwrap())
        .collect();
    assert_eq!(owners.iter().filter(|o| *o == "A").count(), 5);
    assert_eq!(owners.iter().filter(|o| *o == "B").count(), 5);
    assert!(owners.windows(2).all(|w| w[0] != w[1]), "{owners:?}");
}

#[test]
fn test_round_robin_serves_shared_owner() {
    let clock = manual();
    let q = fairness(
        &FairnessConfig::new().with_policy(SchedulingPolicy::RoundRobin),
        &clock,
    );
    let t0 = clock.now();
    q.enqueue(WorkItem::new("a1", 1).with_owner("A").with_created_at(t0)).unwrap();
    q.enqueue(WorkItem::new("a2", 2).with_owner("A").with_created_at(t0)).unwrap();
    q.enqueue(WorkItem::new("anon", 3).with_created_at(t0)).unwrap();

    let order: Vec<u32> = (0..3).map(|_| q.dequeue().unwrap().payload).collect();
    assert_eq!(order, vec![1, 3, 2]);
}

#[test]
fn test_edf_picks_earliest_deadline() {
    let clock = manual();
    let q = fairness(
        &FairnessConfig::new().with_policy(SchedulingPolicy::EarliestDeadlineFirst),
        &clock,
    );
    let t = clock.now() + Duration::from_secs(30);
    let mut deadlines = vec![
        (10u32, t + Duration::from_secs(10)),
        (5, t + Duration::from_secs(5)),
        (0, t),
    ];
    deadlines.shuffle(&mut StdRng::seed_from_u64(3));
    for (n, deadline) in deadlines {
        q.enqueue(WorkItem::new("op", n).with_deadline(deadline).with_created_at(clock.now()))
            .unwrap();
    }
    q.enqueue(WorkItem::new("no-deadline", 99).with_created_at(clock.now())).unwrap();

    assert_eq!(q.dequeue().unwrap().payload, 0);
    assert_eq!(q.dequeue().unwrap().payload, 5);
    assert_eq!(q.dequeue().unwrap().payload, 10);
    assert_eq!(q.dequeue().unwrap().payload, 99);
}

#[test]
fn test_concurrency_bound_under_contention() {
    let q: Arc<FairnessQueue<u32>> = Arc::new(FairnessQueue::new(
        &FairnessConfig::new().with_max_concurrency(3),
        Arc::new(NullEventSink),
        Arc::new(SystemClock),
    ));
    for n in 0..300 {
        q.enqueue(WorkItem::new("op", n).with_cost(u64::from(n % 7))).unwrap();
    }

    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let q = Arc::clone(&q);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            thread::spawn(move || loop {
                match q.dequeue() {
                    Some(item) => {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        assert!(q.running_count() <= 3);
                        thread::yield_now();
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        q.complete(item.id(), json!(null));
                    }
                    None if q.pending_count() == 0 => break,
                    None => thread::yield_now(),
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    let stats = q.stats();
    assert_eq!(stats.total_completed, 300);
    assert_eq!(stats.running, 0);
}

// ============================================================================
// COALESCING
// ============================================================================

#[test]
fn test_batch_respects_window_and_size() {
    let clock = manual();
    let q: CoalescingQueue<StorageTag> = CoalescingQueue::new(
        &CoalescingConfig::new().with_batch_size(2),
        Arc::new(NullEventSink),
        clock.clone(),
    )
    .unwrap();
    let t = clock.now();
    for _ in 0..3 {
        q.enqueue(WorkItem::new("read", StorageTag::read("docs/1")).with_created_at(t))
            .unwrap();
    }

    clock.advance(Duration::from_millis(250));
    assert!(q.try_batch().is_none());
    clock.advance(Duration::from_millis(250));
    let batch = q.try_batch().unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(q.pending_count(), 1);
    for item in &batch {
        q.complete(item.id(), json!("bytes"));
    }
    // A lone straggler is never coalesced.
    assert!(q.try_batch().is_none());
    assert!(q.dequeue().is_some());
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_cancel_running_vs_pending() {
    let clock = manual();
    let q = fairness(&FairnessConfig::new().with_max_concurrency(1), &clock);
    let running = q.enqueue(WorkItem::new("first", 1).with_cost(1)).unwrap();
    let waiting = q.enqueue(WorkItem::new("second", 2).with_cost(2)).unwrap();
    assert_eq!(q.dequeue().unwrap().id(), running);

    assert!(!q.cancel(running));
    assert!(q.cancel(waiting));
    q.complete(running, json!(null));

    let mut seen = HashSet::new();
    while let Some(item) = q.dequeue() {
        seen.insert(item.id());
    }
    assert!(!seen.contains(&waiting));
    assert_eq!(q.get(waiting).unwrap().state(), WorkState::Cancelled);
}

#[test]
fn test_double_complete_is_idempotent() {
    let sink = Arc::new(InMemoryEventSink::new(32));
    let q: PriorityFifoQueue<u32> = PriorityFifoQueue::new(
        &PriorityFifoConfig::default(),
        sink.clone(),
        Arc::new(SystemClock),
    );
    let id = q.enqueue(WorkItem::new("call", 1)).unwrap();
    q.dequeue().unwrap();

    q.complete(id, json!("first"));
    let once = (q.stats(), q.get(id).unwrap().state(), sink.events().len());
    q.complete(id, json!("second"));
    let twice = (q.stats(), q.get(id).unwrap().state(), sink.events().len());

    assert_eq!(once, twice);
    assert_eq!(q.get(id).unwrap().result(), Some(&json!("first")));
}
