//! Stuck-agent remediation.
//!
//! A stuck agent is first nudged. It is killed only once its heartbeat is
//! older than the critical threshold *and* it has already been nudged in
//! the same stuck episode; the episode ends when the agent is seen healthy.

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use super::{format_age, Collaborators};
use crate::audit::{AuditEntry, AuditEventType};
use crate::models::health::HealthCheckResult;
use crate::models::identity::AgentIdentity;
use crate::models::state::{SupervisorState, EXIT_REASON_STUCK};
use crate::Result;

/// What remediation did (or would do) to a stuck agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationAction {
    /// Sent a wake message to the live session.
    Nudge,
    /// Killed the session so it is respawned.
    Kill,
}

impl RemediationAction {
    /// Lowercase name used in observability records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nudge => "nudge",
            Self::Kill => "kill",
        }
    }
}

/// Choose the action for a stuck agent.
#[must_use]
pub fn decide(heartbeat_age: Duration, critical: Duration, already_nudged: bool) -> RemediationAction {
    if heartbeat_age > critical && already_nudged {
        RemediationAction::Kill
    } else {
        RemediationAction::Nudge
    }
}

/// Wake message typed into a stuck agent's session.
#[must_use]
pub fn nudge_message(heartbeat_age: Duration) -> String {
    format!(
        "HEALTH_CHECK: heartbeat stale ({} old), please respond to confirm responsiveness",
        format_age(heartbeat_age)
    )
}

/// Nudge or kill a stuck agent and record the outcome in `state`.
///
/// # Errors
///
/// Returns `AppError::Session` if the nudge or kill command fails; `state`
/// is left unchanged in that case so the next tick retries the same step.
pub async fn remediate_stuck(
    ctx: &Collaborators,
    state: &mut SupervisorState,
    identity: &AgentIdentity,
    result: &HealthCheckResult,
    critical: Duration,
) -> Result<RemediationAction> {
    let session = identity.session_name();
    let already_nudged = state
        .agent(identity)
        .is_some_and(|agent| agent.last_nudged_at.is_some());
    let action = decide(result.heartbeat_age, critical, already_nudged);
    let age = format_age(result.heartbeat_age);

    let outcome = match action {
        RemediationAction::Kill => {
            warn!(session, age, critical = %format_age(critical), "agent critically stuck, killing for respawn");
            ctx.sessions.kill_session_with_processes(&session).await
        }
        RemediationAction::Nudge => {
            info!(session, age, "agent stuck, nudging");
            ctx.sessions
                .nudge_session(&session, &nudge_message(result.heartbeat_age))
                .await
        }
    };

    let entry = AuditEntry::new(match action {
        RemediationAction::Kill => AuditEventType::AgentKilled,
        RemediationAction::Nudge => AuditEventType::AgentNudged,
    })
    .with_agent(identity)
    .with_heartbeat_age(result.heartbeat_age)
    .with_action(action.as_str());

    if let Err(err) = outcome {
        error!(session, action = action.as_str(), %err, "remediation failed");
        ctx.record(entry.with_detail(format!("failed: {err}")));
        return Err(err);
    }
    ctx.record(entry);

    let now = Utc::now();
    match action {
        RemediationAction::Kill => state.schedule_respawn(identity, EXIT_REASON_STUCK, now),
        RemediationAction::Nudge => state.agent_mut(identity).last_nudged_at = Some(now),
    }
    Ok(action)
}
