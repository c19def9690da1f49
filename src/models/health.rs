//! Agent health classification results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of one health evaluation.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Nothing to do.
    Healthy,
    /// Session is gone and the respawn delay has elapsed.
    NeedsRespawn,
    /// Session is gone but the respawn delay has not elapsed yet.
    WaitingRespawn,
    /// Session is alive but its heartbeat is stale.
    Stuck,
}

/// Observations fed to the health evaluator.
#[derive(Debug, Clone, Default)]
pub struct HealthProbe {
    /// Whether the terminal session exists.
    pub session_alive: bool,
    /// Last recorded heartbeat; `None` when the agent never reported one.
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Age of the last heartbeat; ignored when none was ever recorded.
    pub heartbeat_age: Duration,
    /// Time since the session was first observed dead; `None` when no
    /// death has been recorded.
    pub time_since_death: Option<Duration>,
}

/// Classification of one agent, computed fresh on every evaluation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthCheckResult {
    /// Health classification.
    pub status: HealthStatus,
    /// Whether the session existed when probed.
    pub session_alive: bool,
    /// Age of the last heartbeat.
    pub heartbeat_age: Duration,
    /// Last recorded heartbeat.
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Human-readable explanation.
    pub message: String,
}
