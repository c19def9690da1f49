//! Per-role respawn policy table.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::identity::RoleType;

/// Heartbeat age beyond which a stuck agent is killed rather than nudged,
/// regardless of its role's own stuck threshold.
pub const CRITICAL_STUCK_THRESHOLD: Duration = Duration::from_secs(30 * 60);

const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);

/// Condition that must hold before a dead agent is respawned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RespawnTrigger {
    /// Respawn unconditionally once the delay elapses.
    Always,
    /// Respawn only while the project's merge queue has pending requests.
    QueueNotEmpty,
    /// Respawn only while the project has unassigned open work.
    WorkAvailable,
}

/// Health and respawn tuning for one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RespawnPolicy {
    /// Minimum time between death and respawn.
    pub delay: Duration,
    /// Heartbeat age beyond which a live session is considered stuck.
    pub stuck_threshold: Duration,
    /// Condition gating the respawn.
    pub trigger: RespawnTrigger,
}

impl RespawnPolicy {
    /// Policy applied to any role without its own entry.
    pub const DEFAULT: Self = Self {
        delay: FIVE_MINUTES,
        stuck_threshold: Duration::from_secs(15 * 60),
        trigger: RespawnTrigger::Always,
    };

    /// Policy for `role`.
    #[must_use]
    pub fn for_role(role: RoleType) -> Self {
        match role {
            RoleType::Monitor => Self {
                delay: FIVE_MINUTES,
                stuck_threshold: Duration::from_secs(10 * 60),
                trigger: RespawnTrigger::Always,
            },
            RoleType::MergeProcessor => Self {
                delay: Duration::ZERO,
                stuck_threshold: FIVE_MINUTES,
                trigger: RespawnTrigger::QueueNotEmpty,
            },
            RoleType::TransientWorker => Self {
                trigger: RespawnTrigger::WorkAvailable,
                ..Self::DEFAULT
            },
            RoleType::Coordinator | RoleType::HealthOrchestrator | RoleType::PersistentWorker => {
                Self::DEFAULT
            }
        }
    }

    /// Policy for a role given by name; unknown names get [`Self::DEFAULT`].
    #[must_use]
    pub fn lookup(role: &str) -> Self {
        RoleType::parse(role).map_or(Self::DEFAULT, Self::for_role)
    }
}
