//! Structured observability records for supervisor actions.
//!
//! Provides the [`AuditLogger`] trait and associated types. The primary
//! implementation, [`JsonlAuditWriter`], appends JSONL records to
//! daily-rotating files in `<town>/warden/logs/`.

pub mod writer;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::identity::AgentIdentity;

/// Event type classification for observability records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Stuck agent was sent a wake nudge.
    AgentNudged,
    /// Stuck agent's session was killed.
    AgentKilled,
    /// Dead agent's session was recreated.
    AgentRespawned,
    /// Dead agent is eligible but its trigger condition does not hold.
    RespawnDeferred,
    /// Lifecycle request carried out.
    LifecycleExecuted,
    /// Lifecycle request refused because it was never staged.
    LifecycleRejected,
    /// Lifecycle request claimed but not carried out.
    LifecycleFailed,
    /// Lifecycle request past its maximum age.
    LifecycleDiscarded,
    /// Agent record marked dead by the stale-liveness sweep.
    AgentMarkedDead,
    /// Monitor notified of a stalled assignment.
    StalledAssignment,
    /// Monitor notified of orphaned work.
    OrphanedWork,
}

impl AuditEventType {
    /// Wire name, as written to the event files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgentNudged => "agent_nudged",
            Self::AgentKilled => "agent_killed",
            Self::AgentRespawned => "agent_respawned",
            Self::RespawnDeferred => "respawn_deferred",
            Self::LifecycleExecuted => "lifecycle_executed",
            Self::LifecycleRejected => "lifecycle_rejected",
            Self::LifecycleFailed => "lifecycle_failed",
            Self::LifecycleDiscarded => "lifecycle_discarded",
            Self::AgentMarkedDead => "agent_marked_dead",
            Self::StalledAssignment => "stalled_assignment",
            Self::OrphanedWork => "orphaned_work",
        }
    }
}

/// A structured record of one supervisor action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp with timezone.
    pub timestamp: DateTime<Utc>,
    /// Event classification.
    pub event_type: AuditEventType,
    /// Role of the affected agent.
    pub role: Option<String>,
    /// Project scope of the affected agent.
    pub project: Option<String>,
    /// Session of the affected agent.
    pub session: Option<String>,
    /// Heartbeat age in whole seconds when the action was taken.
    pub heartbeat_age_seconds: Option<u64>,
    /// Action taken (`nudge`, `kill`, `restart`, ...).
    pub action: Option<String>,
    /// Free-form detail.
    pub detail: Option<String>,
}

impl AuditEntry {
    /// Construct a minimal entry for the given event type.
    #[must_use]
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            role: None,
            project: None,
            session: None,
            heartbeat_age_seconds: None,
            action: None,
            detail: None,
        }
    }

    /// Fill role, project, and session from `identity`.
    #[must_use]
    pub fn with_agent(mut self, identity: &AgentIdentity) -> Self {
        self.role = Some(identity.role().as_str().to_owned());
        self.project = identity.project().map(str::to_owned);
        self.session = Some(identity.session_name());
        self
    }

    /// Set the session without a resolved identity.
    #[must_use]
    pub fn with_session(mut self, session: String) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the heartbeat age.
    #[must_use]
    pub fn with_heartbeat_age(mut self, age: Duration) -> Self {
        self.heartbeat_age_seconds = Some(age.as_secs());
        self
    }

    /// Set the action taken.
    #[must_use]
    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_owned());
        self
    }

    /// Set free-form detail.
    #[must_use]
    pub fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// One-line summary: `HH:MM:SS event session [action=..] [heartbeat_age=..s]: detail`.
impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.timestamp.format("%H:%M:%S"),
            self.event_type.as_str()
        )?;
        if let Some(session) = &self.session {
            write!(f, " {session}")?;
        }
        if let Some(action) = &self.action {
            write!(f, " action={action}")?;
        }
        if let Some(age) = self.heartbeat_age_seconds {
            write!(f, " heartbeat_age={age}s")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// Writes observability records to a persistent sink.
///
/// Implementations must be [`Send`] and [`Sync`] to allow sharing across
/// async task boundaries via [`std::sync::Arc`].
pub trait AuditLogger: Send + Sync {
    /// Record a single entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn log_entry(&self, entry: AuditEntry) -> crate::Result<()>;
}

pub use writer::JsonlAuditWriter;
