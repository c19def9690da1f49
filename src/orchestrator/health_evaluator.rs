//! Pure agent health classification.
//!
//! Rules, first match wins:
//!
//! 1. Session dead and no death recorded, or dead at least `delay` → `needs_respawn`.
//! 2. Session dead otherwise → `waiting_respawn`.
//! 3. Session alive, no heartbeat ever recorded → `healthy` (startup grace).
//! 4. Session alive, heartbeat older than `stuck_threshold` → `stuck`.
//! 5. Otherwise → `healthy`.

use std::fmt::Display;
use std::time::Duration;

use super::format_age;
use crate::models::health::{HealthCheckResult, HealthProbe, HealthStatus};
use crate::models::policy::RespawnPolicy;

/// Classify one agent. Has no side effects.
#[must_use]
pub fn evaluate(probe: &HealthProbe, policy: &RespawnPolicy) -> HealthCheckResult {
    let (status, message) = classify(probe, policy);
    HealthCheckResult {
        status,
        session_alive: probe.session_alive,
        heartbeat_age: probe.heartbeat_age,
        last_heartbeat: probe.last_heartbeat,
        message,
    }
}

fn classify(probe: &HealthProbe, policy: &RespawnPolicy) -> (HealthStatus, String) {
    if !probe.session_alive {
        return match probe.time_since_death {
            None => (
                HealthStatus::NeedsRespawn,
                "session dead, no exit recorded".to_owned(),
            ),
            Some(dead_for) if dead_for >= policy.delay => (
                HealthStatus::NeedsRespawn,
                format!(
                    "session dead for {}, respawn delay {} elapsed",
                    format_age(dead_for),
                    format_age(policy.delay)
                ),
            ),
            Some(dead_for) => (
                HealthStatus::WaitingRespawn,
                format!(
                    "session dead, respawn in {}",
                    format_age(policy.delay.saturating_sub(dead_for))
                ),
            ),
        };
    }

    if probe.last_heartbeat.is_none() {
        return (
            HealthStatus::Healthy,
            "no heartbeat yet (first startup grace period)".to_owned(),
        );
    }

    if probe.heartbeat_age > policy.stuck_threshold {
        return (
            HealthStatus::Stuck,
            format!(
                "session alive but heartbeat stale ({} old, threshold {})",
                format_age(probe.heartbeat_age),
                format_age(policy.stuck_threshold)
            ),
        );
    }

    (
        HealthStatus::Healthy,
        format!("healthy, last heartbeat {} ago", format_age(probe.heartbeat_age)),
    )
}

/// Result used when the session probe itself failed.
///
/// Reported as healthy so a flaky multiplexer never triggers kills or respawns.
#[must_use]
pub fn probe_failed(err: &impl Display) -> HealthCheckResult {
    HealthCheckResult {
        status: HealthStatus::Healthy,
        session_alive: false,
        heartbeat_age: Duration::ZERO,
        last_heartbeat: None,
        message: format!("error checking session: {err}"),
    }
}
