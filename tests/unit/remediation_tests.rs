//! Unit tests for the nudge-or-kill decision and formatting helpers.

use std::time::Duration;

use fleet_warden::models::policy::CRITICAL_STUCK_THRESHOLD;
use fleet_warden::orchestrator::format_age;
use fleet_warden::orchestrator::remediation::{decide, nudge_message, RemediationAction};

const fn mins(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

#[test]
fn first_stuck_observation_is_always_a_nudge() {
    assert_eq!(decide(mins(20), CRITICAL_STUCK_THRESHOLD, false), RemediationAction::Nudge);
    assert_eq!(decide(mins(90), CRITICAL_STUCK_THRESHOLD, false), RemediationAction::Nudge);
}

#[test]
fn nudged_agent_is_killed_only_past_critical() {
    assert_eq!(decide(mins(25), CRITICAL_STUCK_THRESHOLD, true), RemediationAction::Nudge);
    assert_eq!(decide(mins(30), CRITICAL_STUCK_THRESHOLD, true), RemediationAction::Nudge);
    assert_eq!(decide(mins(45), CRITICAL_STUCK_THRESHOLD, true), RemediationAction::Kill);
}

#[test]
fn nudge_message_names_heartbeat_age() {
    assert_eq!(
        nudge_message(mins(20)),
        "HEALTH_CHECK: heartbeat stale (20m old), please respond to confirm responsiveness"
    );
}

#[test]
fn action_names() {
    assert_eq!(RemediationAction::Nudge.as_str(), "nudge");
    assert_eq!(RemediationAction::Kill.as_str(), "kill");
}

#[test]
fn format_age_is_compact() {
    assert_eq!(format_age(Duration::ZERO), "0s");
    assert_eq!(format_age(Duration::from_secs(59)), "59s");
    assert_eq!(format_age(Duration::from_secs(60)), "1m");
    assert_eq!(format_age(mins(45)), "45m");
    assert_eq!(format_age(mins(60)), "1h");
    assert_eq!(format_age(mins(65)), "1h5m");
    assert_eq!(format_age(mins(6 * 60)), "6h");
}
