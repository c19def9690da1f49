//! Supervisor orchestration.
//!
//! Covers agent health classification, stuck-agent remediation, respawn
//! triggers, session launching, lifecycle request processing, sweep checks,
//! convoy completion detection, and the heartbeat loop composing them.

pub mod convoy_watcher;
pub mod health_evaluator;
pub mod heartbeat;
pub mod hygiene;
pub mod launcher;
pub mod lifecycle_processor;
pub mod remediation;
pub mod respawn;
pub mod sweeps;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::audit::{AuditEntry, AuditLogger};
use crate::driver::{CompletionCheck, Mailbox, SessionManager, WorkStore};

/// Shared handles to every external collaborator.
#[derive(Clone)]
pub struct Collaborators {
    /// Terminal session manager.
    pub sessions: Arc<dyn SessionManager>,
    /// Work-item store.
    pub store: Arc<dyn WorkStore>,
    /// Mailbox.
    pub mailbox: Arc<dyn Mailbox>,
    /// Aggregate completion check.
    pub completion: Arc<dyn CompletionCheck>,
    /// Optional observability sink.
    pub audit: Option<Arc<dyn AuditLogger>>,
}

impl Collaborators {
    /// Emit an observability record. Write failures are logged, never returned.
    pub fn record(&self, entry: AuditEntry) {
        if let Some(ref audit) = self.audit {
            if let Err(err) = audit.log_entry(entry) {
                warn!(%err, "failed to write event record");
            }
        }
    }
}

/// Compact human-readable duration (`45s`, `20m`, `1h5m`).
#[must_use]
pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m", secs / 60),
        _ if secs % 3600 < 60 => format!("{}h", secs / 3600),
        _ => format!("{}h{}m", secs / 3600, (secs % 3600) / 60),
    }
}

/// Non-negative wall-clock difference `later - earlier`.
#[must_use]
pub(crate) fn elapsed_between(
    earlier: chrono::DateTime<chrono::Utc>,
    later: chrono::DateTime<chrono::Utc>,
) -> Duration {
    (later - earlier).to_std().unwrap_or_default()
}
