//! Integration tests for the reconciliation flow.
//!
//! These tests drive `Scheduler::reconcile` end to end against the
//! in-memory `FakeControl`, covering convergence, idempotence, deferral on
//! transient database states, per-resource failure isolation, and the
//! retry bound.

use std::sync::Arc;
use std::time::Duration;

use envctl_control::{
    ComputeStatus, ControlError, DatabaseStatus, DbLifecycle, FakeControl, IssuedCommand,
};
use envctl_reconcile::{
    ComputeOutcome, DatabaseOutcome, EnvironmentTarget, FailureKind, TargetState,
};
use envctl_scheduler::config::Config;
use envctl_scheduler::retry::RetryPolicy;
use envctl_scheduler::scheduler::Scheduler;
use rstest::rstest;

fn test_config() -> Config {
    Config {
        environment_id: "conductor".to_string(),
        compute_id: "ConductorService".to_string(),
        database_id: "ConductorDb".to_string(),
        control_api_url: "http://localhost:8080".to_string(),
        steady_state_count: 1,
        retry: RetryPolicy {
            max_attempts: 3,
            base: Duration::from_millis(1),
            max: Duration::from_millis(10),
        },
        log_level: "debug".to_string(),
    }
}

fn fake(compute: ComputeStatus, lifecycle: DbLifecycle) -> Arc<FakeControl> {
    Arc::new(FakeControl::new(compute, DatabaseStatus { lifecycle }))
}

fn compute(desired: u32, running: u32) -> ComputeStatus {
    ComputeStatus {
        desired_count: desired,
        running_count: running,
    }
}

fn target(desired_state: TargetState) -> EnvironmentTarget {
    EnvironmentTarget {
        environment_id: "conductor".to_string(),
        desired_state,
    }
}

#[tokio::test]
async fn test_converged_environment_issues_no_commands() {
    let control = fake(compute(1, 1), DbLifecycle::Available);
    let scheduler = Scheduler::new(control.clone(), test_config());

    let result = scheduler.reconcile(&target(TargetState::Active)).await;

    assert_eq!(result.compute, ComputeOutcome::Unchanged);
    assert_eq!(result.database, DatabaseOutcome::Unchanged);
    assert!(result.success);
    assert!(control.commands().await.is_empty());
}

#[tokio::test]
async fn test_suspend_scales_down_and_stops_database() {
    let control = fake(compute(1, 1), DbLifecycle::Available);
    let scheduler = Scheduler::new(control.clone(), test_config());

    let result = scheduler.reconcile(&target(TargetState::Suspended)).await;

    assert_eq!(result.compute, ComputeOutcome::Scaled { to: 0 });
    assert_eq!(result.database, DatabaseOutcome::Stopped);
    assert!(result.success);

    let commands = control.commands().await;
    assert!(commands.contains(&IssuedCommand::SetComputeDesiredCount {
        id: "ConductorService".to_string(),
        count: 0,
    }));
    assert!(commands.contains(&IssuedCommand::StopDatabase {
        id: "ConductorDb".to_string(),
    }));
    assert_eq!(commands.len(), 2);
}

#[tokio::test]
async fn test_resume_scales_up_and_starts_database() {
    let control = fake(compute(0, 0), DbLifecycle::Stopped);
    let scheduler = Scheduler::new(control.clone(), test_config());

    let result = scheduler.reconcile(&target(TargetState::Active)).await;

    assert_eq!(result.compute, ComputeOutcome::Scaled { to: 1 });
    assert_eq!(result.database, DatabaseOutcome::Started);
    assert!(result.success);

    let commands = control.commands().await;
    assert!(commands.contains(&IssuedCommand::SetComputeDesiredCount {
        id: "ConductorService".to_string(),
        count: 1,
    }));
    assert!(commands.contains(&IssuedCommand::StartDatabase {
        id: "ConductorDb".to_string(),
    }));
}

#[tokio::test]
async fn test_mid_transition_database_is_skipped_not_commanded() {
    let control = fake(compute(1, 1), DbLifecycle::Starting);
    let scheduler = Scheduler::new(control.clone(), test_config());

    let result = scheduler.reconcile(&target(TargetState::Suspended)).await;

    // Compute still converges; the database waits for the next invocation.
    assert_eq!(result.compute, ComputeOutcome::Scaled { to: 0 });
    let DatabaseOutcome::Skipped { reason } = &result.database else {
        panic!("expected skip, got {:?}", result.database);
    };
    assert!(reason.contains("mid-transition"));
    assert!(reason.contains("starting"));
    assert!(result.success);

    let commands = control.commands().await;
    assert!(!commands
        .iter()
        .any(|c| matches!(c, IssuedCommand::StartDatabase { .. } | IssuedCommand::StopDatabase { .. })));
}

#[rstest]
#[case(DbLifecycle::Stopping)]
#[case(DbLifecycle::BackingUp)]
#[case(DbLifecycle::Modifying)]
#[case(DbLifecycle::Other("rebooting".to_string()))]
#[tokio::test]
async fn test_transient_states_defer_under_active_target(#[case] lifecycle: DbLifecycle) {
    let control = fake(compute(1, 1), lifecycle);
    let scheduler = Scheduler::new(control.clone(), test_config());

    let result = scheduler.reconcile(&target(TargetState::Active)).await;

    assert!(matches!(result.database, DatabaseOutcome::Skipped { .. }));
    assert!(control.commands().await.is_empty());
}

#[tokio::test]
async fn test_database_failure_does_not_block_compute() {
    let control = fake(compute(1, 1), DbLifecycle::Available);
    control
        .fail_next(
            "stop_database",
            ControlError::PermissionDenied("rds:StopDBInstance".to_string()),
        )
        .await;
    let scheduler = Scheduler::new(control.clone(), test_config());

    let result = scheduler.reconcile(&target(TargetState::Suspended)).await;

    assert_eq!(result.compute, ComputeOutcome::Scaled { to: 0 });
    assert_eq!(
        result.database,
        DatabaseOutcome::Failed {
            kind: FailureKind::Permanent,
            attempts: 1,
        }
    );
    assert!(!result.success);
}

#[tokio::test]
async fn test_describe_failure_isolated_to_its_resource() {
    let control = fake(compute(1, 1), DbLifecycle::Available);
    control
        .fail_next(
            "describe_compute",
            ControlError::NotFound("ConductorService".to_string()),
        )
        .await;
    let scheduler = Scheduler::new(control.clone(), test_config());

    let result = scheduler.reconcile(&target(TargetState::Suspended)).await;

    assert_eq!(
        result.compute,
        ComputeOutcome::Failed {
            kind: FailureKind::Permanent,
            attempts: 1,
        }
    );
    assert_eq!(result.database, DatabaseOutcome::Stopped);
    assert!(!result.success);
}

#[tokio::test]
async fn test_transient_errors_retried_up_to_bound() {
    let control = fake(compute(0, 0), DbLifecycle::Available);
    for _ in 0..3 {
        control
            .fail_next("stop_database", ControlError::RateLimited)
            .await;
    }
    let scheduler = Scheduler::new(control.clone(), test_config());

    let result = scheduler.reconcile(&target(TargetState::Suspended)).await;

    // Exactly max_attempts tries, then a transient failure report.
    assert_eq!(
        result.database,
        DatabaseOutcome::Failed {
            kind: FailureKind::Transient,
            attempts: 3,
        }
    );
    assert!(control.commands().await.is_empty());
}

#[tokio::test]
async fn test_transient_error_recovers_within_budget() {
    let control = fake(compute(0, 0), DbLifecycle::Available);
    control
        .fail_next("stop_database", ControlError::Unavailable("503".to_string()))
        .await;
    let scheduler = Scheduler::new(control.clone(), test_config());

    let result = scheduler.reconcile(&target(TargetState::Suspended)).await;

    assert_eq!(result.database, DatabaseOutcome::Stopped);
    assert!(result.success);
}

#[tokio::test]
async fn test_permanent_error_not_retried() {
    let control = fake(compute(0, 0), DbLifecycle::Stopped);
    control
        .fail_next(
            "start_database",
            ControlError::NotFound("ConductorDb".to_string()),
        )
        .await;
    // A second scripted error would be consumed by a retry; it must not be.
    control
        .fail_next("start_database", ControlError::RateLimited)
        .await;
    let scheduler = Scheduler::new(control.clone(), test_config());

    let result = scheduler.reconcile(&target(TargetState::Active)).await;

    assert_eq!(
        result.database,
        DatabaseOutcome::Failed {
            kind: FailureKind::Permanent,
            attempts: 1,
        }
    );
}

#[tokio::test]
async fn test_already_in_target_state_normalized_to_unchanged() {
    let control = fake(compute(1, 1), DbLifecycle::Stopped);
    control
        .fail_next("start_database", ControlError::AlreadyInTargetState)
        .await;
    let scheduler = Scheduler::new(control.clone(), test_config());

    let result = scheduler.reconcile(&target(TargetState::Active)).await;

    assert_eq!(result.database, DatabaseOutcome::Unchanged);
    assert!(result.success);
}

#[tokio::test]
async fn test_command_level_conflict_becomes_skip() {
    // State changed between describe and command: the platform rejects the
    // stop, and the invocation reports a skip rather than a failure.
    let control = fake(compute(0, 0), DbLifecycle::Available);
    control
        .fail_next(
            "stop_database",
            ControlError::ConflictingState("backing-up".to_string()),
        )
        .await;
    let scheduler = Scheduler::new(control.clone(), test_config());

    let result = scheduler.reconcile(&target(TargetState::Suspended)).await;

    let DatabaseOutcome::Skipped { reason } = &result.database else {
        panic!("expected skip, got {:?}", result.database);
    };
    assert!(reason.contains("backing-up"));
    assert!(result.success);
}

#[tokio::test]
async fn test_concurrent_reconciliations_never_conflict() {
    let control = fake(compute(1, 1), DbLifecycle::Available);
    let scheduler = Scheduler::new(control.clone(), test_config());
    let t = target(TargetState::Suspended);

    let (r1, r2) = tokio::join!(scheduler.reconcile(&t), scheduler.reconcile(&t));

    // Whichever interleaving ran, the database got exactly one stop and no
    // start, and both invocations succeeded.
    assert!(r1.success);
    assert!(r2.success);

    let commands = control.commands().await;
    let stops = commands
        .iter()
        .filter(|c| matches!(c, IssuedCommand::StopDatabase { .. }))
        .count();
    let starts = commands
        .iter()
        .filter(|c| matches!(c, IssuedCommand::StartDatabase { .. }))
        .count();
    assert_eq!(stops, 1);
    assert_eq!(starts, 0);
}

#[tokio::test]
async fn test_steady_state_count_from_config() {
    let mut config = test_config();
    config.steady_state_count = 2;

    let control = fake(compute(0, 0), DbLifecycle::Available);
    let scheduler = Scheduler::new(control.clone(), config);

    let result = scheduler.reconcile(&target(TargetState::Active)).await;
    assert_eq!(result.compute, ComputeOutcome::Scaled { to: 2 });
}
