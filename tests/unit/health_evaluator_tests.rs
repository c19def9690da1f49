//! Unit tests for the pure health evaluator.
//!
//! # Scenarios covered
//!
//! | Case | Scenario |
//! |------|----------|
//! | A    | Merge processor dead 10s with zero delay → needs respawn |
//! | B    | Monitor alive, heartbeat 11m old, threshold 10m → stuck |
//! | C    | Monitor dead 2m, delay 5m → waiting respawn |
//! | D    | Alive with no heartbeat ever → healthy grace period |

use std::time::Duration;

use chrono::Utc;

use fleet_warden::models::health::{HealthProbe, HealthStatus};
use fleet_warden::models::identity::RoleType;
use fleet_warden::models::policy::RespawnPolicy;
use fleet_warden::orchestrator::health_evaluator::{evaluate, probe_failed};
use fleet_warden::AppError;

fn alive(heartbeat_age: Duration) -> HealthProbe {
    HealthProbe {
        session_alive: true,
        last_heartbeat: Some(Utc::now()),
        heartbeat_age,
        time_since_death: None,
    }
}

fn dead(time_since_death: Option<Duration>) -> HealthProbe {
    HealthProbe {
        session_alive: false,
        time_since_death,
        ..HealthProbe::default()
    }
}

const fn mins(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

// ── Dead sessions ───────────────────────────────────────────────────────────

#[test]
fn dead_merge_processor_with_zero_delay_needs_respawn() {
    let policy = RespawnPolicy::for_role(RoleType::MergeProcessor);
    let result = evaluate(&dead(Some(Duration::from_secs(10))), &policy);

    assert_eq!(result.status, HealthStatus::NeedsRespawn);
    assert!(!result.session_alive);
}

#[test]
fn dead_without_recorded_exit_needs_respawn() {
    let policy = RespawnPolicy::for_role(RoleType::Monitor);
    let result = evaluate(&dead(None), &policy);

    assert_eq!(result.status, HealthStatus::NeedsRespawn);
    assert_eq!(result.message, "session dead, no exit recorded");
}

#[test]
fn recently_dead_monitor_waits_for_delay() {
    let policy = RespawnPolicy::for_role(RoleType::Monitor);
    let result = evaluate(&dead(Some(mins(2))), &policy);

    assert_eq!(result.status, HealthStatus::WaitingRespawn);
    assert_eq!(result.message, "session dead, respawn in 3m");
}

#[test]
fn delay_boundary_is_inclusive() {
    let policy = RespawnPolicy::for_role(RoleType::Monitor);
    assert_eq!(evaluate(&dead(Some(mins(5))), &policy).status, HealthStatus::NeedsRespawn);
}

// ── Live sessions ───────────────────────────────────────────────────────────

#[test]
fn stale_monitor_heartbeat_is_stuck() {
    let policy = RespawnPolicy::for_role(RoleType::Monitor);
    let result = evaluate(&alive(mins(11)), &policy);

    assert_eq!(result.status, HealthStatus::Stuck);
    assert!(result.message.contains("11m old"), "{}", result.message);
    assert!(result.message.contains("threshold 10m"), "{}", result.message);
}

#[test]
fn stuck_threshold_boundary_is_exclusive() {
    let policy = RespawnPolicy::for_role(RoleType::Monitor);
    assert_eq!(evaluate(&alive(mins(10)), &policy).status, HealthStatus::Healthy);
}

#[test]
fn no_heartbeat_is_startup_grace() {
    let policy = RespawnPolicy::for_role(RoleType::MergeProcessor);
    let probe = HealthProbe {
        session_alive: true,
        heartbeat_age: mins(600),
        ..HealthProbe::default()
    };

    let result = evaluate(&probe, &policy);

    assert_eq!(result.status, HealthStatus::Healthy);
    assert!(result.message.contains("grace"));
}

#[test]
fn fresh_heartbeat_is_healthy() {
    let policy = RespawnPolicy::DEFAULT;
    let result = evaluate(&alive(Duration::from_secs(45)), &policy);

    assert_eq!(result.status, HealthStatus::Healthy);
    assert_eq!(result.message, "healthy, last heartbeat 45s ago");
    assert!(result.session_alive);
}

// ── Probe failure ───────────────────────────────────────────────────────────

#[test]
fn probe_failure_reports_healthy_with_error_message() {
    let result = probe_failed(&AppError::Session("server gone".into()));

    assert_eq!(result.status, HealthStatus::Healthy);
    assert!(!result.session_alive);
    assert_eq!(result.message, "error checking session: session: server gone");
}

// ── Invariants ──────────────────────────────────────────────────────────────

#[test]
fn live_session_never_needs_respawn() {
    for role in RoleType::ALL {
        let policy = RespawnPolicy::for_role(role);
        for age in [0, 1, 4, 9, 16, 31, 120] {
            let status = evaluate(&alive(mins(age)), &policy).status;
            assert!(
                matches!(status, HealthStatus::Healthy | HealthStatus::Stuck),
                "{role} at {age}m was {status:?}"
            );
        }
    }
}

#[test]
fn dead_session_is_never_healthy_or_stuck() {
    for role in RoleType::ALL {
        let policy = RespawnPolicy::for_role(role);
        for death in [None, Some(Duration::ZERO), Some(mins(1)), Some(mins(60))] {
            let status = evaluate(&dead(death), &policy).status;
            assert!(
                matches!(status, HealthStatus::NeedsRespawn | HealthStatus::WaitingRespawn),
                "{role} dead {death:?} was {status:?}"
            );
        }
    }
}
