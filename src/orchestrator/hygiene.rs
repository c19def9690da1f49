//! Cleanup of lifecycle leftovers.
//!
//! A lifecycle request that was never processed leaves two traces: the
//! message in the orchestrator inbox and the `requesting_*` flag in the
//! requester's state file. If the requester is still running, both are
//! stale and would otherwise fire on the next tick.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::GlobalConfig;
use crate::driver::{Mailbox, SessionManager};
use crate::models::identity::{AgentIdentity, RoleType};
use crate::models::lifecycle::LIFECYCLE_SUBJECT_MARKER;
use crate::models::mail::MailMessage;
use crate::persistence::agent_state::{AgentStateFile, REQUESTING_TIME_KEY};
use crate::{AppError, Result};

/// Staging flags found on one running agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFlags {
    /// The agent.
    pub agent: AgentIdentity,
    /// Its state file.
    pub path: PathBuf,
    /// Flags currently set.
    pub flags: Vec<String>,
}

/// Leftovers found by [`scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HygieneReport {
    /// Lifecycle messages still in the orchestrator inbox.
    pub messages: Vec<MailMessage>,
    /// Running agents with staging flags set.
    pub staged: Vec<StagedFlags>,
}

impl HygieneReport {
    /// Whether nothing was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.messages.is_empty() && self.staged.is_empty()
    }
}

/// What [`fix`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HygieneFix {
    /// Messages deleted.
    pub messages_deleted: usize,
    /// State files rewritten.
    pub files_cleared: usize,
}

/// Find lifecycle leftovers.
///
/// # Errors
///
/// Returns `AppError::Mail` if the orchestrator inbox cannot be read.
pub async fn scan(
    config: &GlobalConfig,
    sessions: &dyn SessionManager,
    mailbox: &dyn Mailbox,
) -> Result<HygieneReport> {
    let inbox = AgentIdentity::HealthOrchestrator.address();
    let messages: Vec<MailMessage> = mailbox
        .inbox(&inbox)
        .await?
        .into_iter()
        .filter(|message| {
            message
                .subject
                .to_ascii_lowercase()
                .starts_with(LIFECYCLE_SUBJECT_MARKER)
        })
        .collect();

    let mut staged = Vec::new();
    for agent in known_agents(config) {
        let path = agent.state_file(&config.town_root);
        let file = match AgentStateFile::load(&path) {
            Ok(file) => file,
            Err(AppError::NotFound(_)) => continue,
            Err(err) => {
                warn!(%err, "skipping unreadable agent state");
                continue;
            }
        };
        let flags = file.active_requests();
        if flags.is_empty() {
            continue;
        }

        match sessions.has_session(&agent.session_name()).await {
            Ok(true) => staged.push(StagedFlags { agent, path, flags }),
            Ok(false) => debug!(agent = %agent, "agent not running, leaving flags"),
            Err(err) => warn!(agent = %agent, %err, "session probe failed"),
        }
    }

    Ok(HygieneReport { messages, staged })
}

/// Delete the messages and clear the flags found by [`scan`].
///
/// Individual failures are logged and skipped.
pub async fn fix(report: &HygieneReport, mailbox: &dyn Mailbox) -> HygieneFix {
    let mut summary = HygieneFix::default();

    for message in &report.messages {
        match mailbox.delete(&message.id).await {
            Ok(()) => {
                info!(message_id = %message.id, from = %message.from, "deleted stale lifecycle message");
                summary.messages_deleted += 1;
            }
            Err(err) => warn!(message_id = %message.id, %err, "failed to delete lifecycle message"),
        }
    }

    for entry in &report.staged {
        let mut file = match AgentStateFile::load(&entry.path) {
            Ok(file) => file,
            Err(err) => {
                warn!(%err, "failed to reload agent state");
                continue;
            }
        };
        let mut keys: Vec<&str> = entry.flags.iter().map(String::as_str).collect();
        keys.push(REQUESTING_TIME_KEY);
        if !file.clear(&keys) {
            continue;
        }
        match file.save() {
            Ok(()) => {
                info!(agent = %entry.agent, flags = ?entry.flags, "cleared staging flags");
                summary.files_cleared += 1;
            }
            Err(err) => warn!(agent = %entry.agent, %err, "failed to clear staging flags"),
        }
    }

    summary
}

/// Town agents, configured patrols, and persistent workers found on disk.
fn known_agents(config: &GlobalConfig) -> Vec<AgentIdentity> {
    let mut agents = vec![AgentIdentity::Coordinator, AgentIdentity::HealthOrchestrator];
    for agent in config.patrol_agents() {
        if !agents.contains(&agent) {
            agents.push(agent);
        }
    }
    for project in &config.projects {
        agents.extend(crew_members(&config.town_root, project));
    }
    agents
}

fn crew_members(town_root: &Path, project: &str) -> Vec<AgentIdentity> {
    let Ok(entries) = fs::read_dir(town_root.join(project).join("crew")) else {
        return Vec::new();
    };
    let mut members: Vec<AgentIdentity> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            AgentIdentity::new(RoleType::PersistentWorker, Some(project), Some(&name)).ok()
        })
        .collect();
    members.sort();
    members
}
