//! Persisted supervisor state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{AgentIdentity, RoleType};

/// Exit reason recorded when a session was found dead without being asked to stop.
pub const EXIT_REASON_CRASH: &str = "crash";

/// Exit reason recorded when a stuck session was killed by remediation.
pub const EXIT_REASON_STUCK: &str = "stuck";

/// Exit reason recorded for an honored shutdown request.
pub const EXIT_REASON_SHUTDOWN: &str = "shutdown";

/// Run state of the supervisor plus per-agent respawn bookkeeping.
///
/// Owned by the heartbeat loop; mutated only inside a tick and saved after it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupervisorState {
    /// Whether a supervisor process currently claims this state file.
    #[serde(default)]
    pub running: bool,
    /// PID of the supervisor that last wrote the file.
    #[serde(default)]
    pub pid: u32,
    /// When the current (or last) supervisor started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the last tick completed.
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Number of completed ticks.
    #[serde(default)]
    pub heartbeat_count: u64,
    /// Per-agent bookkeeping keyed by agent address.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentRuntimeState>,
}

/// Respawn bookkeeping for one agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentRuntimeState {
    /// Session name the agent last ran under.
    #[serde(default)]
    pub session: String,
    /// Role the agent was last seen in.
    #[serde(default)]
    pub role: Option<RoleType>,
    /// Last patrol completion reported for the agent.
    #[serde(default)]
    pub last_patrol_completed: Option<DateTime<Utc>>,
    /// When a respawn was scheduled.
    #[serde(default)]
    pub respawn_scheduled_at: Option<DateTime<Utc>>,
    /// When the session was first observed dead.
    #[serde(default)]
    pub last_exited_at: Option<DateTime<Utc>>,
    /// Why the session went away (`crash`, `stuck`, `shutdown`).
    #[serde(default)]
    pub exit_reason: String,
    /// When the current stuck episode was last nudged.
    #[serde(default)]
    pub last_nudged_at: Option<DateTime<Utc>>,
    /// When the supervisor last started the current session.
    ///
    /// Heartbeats are aged from this point at the earliest, so a record left
    /// behind by an earlier incarnation cannot mark a fresh session stuck.
    #[serde(default)]
    pub launched_at: Option<DateTime<Utc>>,
}

impl SupervisorState {
    /// Bookkeeping for `identity`, created on first reference.
    pub fn agent_mut(&mut self, identity: &AgentIdentity) -> &mut AgentRuntimeState {
        let entry = self.agents.entry(identity.address()).or_default();
        if entry.session.is_empty() {
            entry.session = identity.session_name();
        }
        if entry.role.is_none() {
            entry.role = Some(identity.role());
        }
        entry
    }

    /// Bookkeeping for `identity`, if it has ever been referenced.
    #[must_use]
    pub fn agent(&self, identity: &AgentIdentity) -> Option<&AgentRuntimeState> {
        self.agents.get(&identity.address())
    }

    /// Record that `identity` went away and should be respawned.
    pub fn schedule_respawn(&mut self, identity: &AgentIdentity, reason: &str, at: DateTime<Utc>) {
        let agent = self.agent_mut(identity);
        agent.session = identity.session_name();
        agent.respawn_scheduled_at = Some(at);
        agent.last_exited_at.get_or_insert(at);
        reason.clone_into(&mut agent.exit_reason);
        agent.last_nudged_at = None;
    }

    /// Record that `identity` is running again.
    pub fn clear_respawn(&mut self, identity: &AgentIdentity) {
        let agent = self.agent_mut(identity);
        agent.session = identity.session_name();
        agent.respawn_scheduled_at = None;
        agent.last_exited_at = None;
        agent.exit_reason.clear();
        agent.last_nudged_at = None;
    }

    /// Record that the supervisor started a new session for `identity` at `at`.
    pub fn record_launch(&mut self, identity: &AgentIdentity, at: DateTime<Utc>) {
        self.clear_respawn(identity);
        self.agent_mut(identity).launched_at = Some(at);
    }

    /// Record a patrol completion for `identity`.
    pub fn update_patrol_completed(&mut self, identity: &AgentIdentity, at: DateTime<Utc>) {
        self.agent_mut(identity).last_patrol_completed = Some(at);
    }
}
