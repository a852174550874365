//! Tests for error types

use resource_scheduler::core::{AffinityError, SchedulerError, WorkId, WorkState};

#[test]
fn test_pool_not_found_error() {
    let err = SchedulerError::PoolNotFound("gpu".to_string());
    assert_eq!(format!("{}", err), "pool not found: gpu");
}

#[test]
fn test_invalid_transition_error() {
    let err = SchedulerError::InvalidTransition {
        id: WorkId(7),
        from: WorkState::Running,
        to: WorkState::Queued,
    };
    assert_eq!(
        format!("{}", err),
        "work item 7 cannot move from Running to Queued"
    );
}

#[test]
fn test_pool_shutdown_error() {
    let err = SchedulerError::PoolShutdown("io".to_string());
    assert_eq!(format!("{}", err), "pool has been shut down: io");
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("spawn failed".to_string());
    assert_eq!(format!("{}", err), "backend error: spawn failed");
}

#[test]
fn test_affinity_errors() {
    assert_eq!(
        AffinityError::CoreNotAvailable(3).to_string(),
        "cpu 3 is not available"
    );
    assert_eq!(
        AffinityError::Rejected(1).to_string(),
        "pinning to cpu 1 was rejected"
    );
}
