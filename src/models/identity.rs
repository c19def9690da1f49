//! Agent identity parsing and formatting.
//!
//! Every textual form an agent is known by (terminal session name, ticket
//! id, mail address, state-file path, working directory) is derived from a
//! single [`AgentIdentity`] value here. Other modules never split identity
//! strings themselves.
//!
//! | Role                | Session name        | Ticket id            | Address          |
//! |---------------------|---------------------|----------------------|------------------|
//! | coordinator         | `fw-coordinator`    | `hq-coordinator`     | `coordinator`    |
//! | health-orchestrator | `fw-orchestrator`   | `hq-orchestrator`    | `orchestrator`   |
//! | monitor             | `fw-<p>-monitor`    | `fw-<p>-monitor`     | `<p>/monitor`    |
//! | merge-processor     | `fw-<p>-merger`     | `fw-<p>-merger`      | `<p>/merger`     |
//! | persistent-worker   | `fw-<p>-crew-<n>`   | `fw-<p>-crew-<n>`    | `<p>/crew/<n>`   |
//! | transient-worker    | `fw-<p>-<n>`        | `fw-<p>-worker-<n>`  | `<p>/workers/<n>`|
//!
//! Construction goes through [`AgentIdentity::new`], which rejects project
//! and agent names that would make any of these forms ambiguous.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Prefix shared by every terminal session and project-scoped ticket.
pub const SESSION_PREFIX: &str = "fw-";

/// Prefix for tickets belonging to town-level agents.
pub const TOWN_TICKET_PREFIX: &str = "hq-";

/// Words that act as separators in the identity grammar.
const RESERVED: &[&str] = &[
    "coordinator",
    "orchestrator",
    "monitor",
    "merger",
    "crew",
    "worker",
    "workers",
];

/// Behavioral category of an agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum RoleType {
    /// Town-level coordinator.
    Coordinator,
    /// Town-level patrol agent that receives lifecycle requests.
    HealthOrchestrator,
    /// Per-project monitor.
    Monitor,
    /// Per-project merge queue processor.
    MergeProcessor,
    /// Long-lived named worker.
    PersistentWorker,
    /// Ephemeral worker spawned for a single assignment.
    TransientWorker,
}

impl RoleType {
    /// All roles in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Coordinator,
        Self::HealthOrchestrator,
        Self::Monitor,
        Self::MergeProcessor,
        Self::PersistentWorker,
        Self::TransientWorker,
    ];

    /// Stable kebab-case name used in config keys and observability records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::HealthOrchestrator => "health-orchestrator",
            Self::Monitor => "monitor",
            Self::MergeProcessor => "merge-processor",
            Self::PersistentWorker => "persistent-worker",
            Self::TransientWorker => "transient-worker",
        }
    }

    /// Parse a kebab-case role name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == raw)
    }

    /// Whether this role is scoped to a project.
    #[must_use]
    pub fn is_project_scoped(self) -> bool {
        !matches!(self, Self::Coordinator | Self::HealthOrchestrator)
    }

    /// Whether this role carries an individual agent name.
    #[must_use]
    pub fn is_named(self) -> bool {
        matches!(self, Self::PersistentWorker | Self::TransientWorker)
    }
}

impl Display for RoleType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully-resolved identity of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentIdentity {
    /// The town coordinator.
    Coordinator,
    /// The town health orchestrator.
    HealthOrchestrator,
    /// Monitor for `project`.
    Monitor {
        /// Project scope.
        project: String,
    },
    /// Merge processor for `project`.
    MergeProcessor {
        /// Project scope.
        project: String,
    },
    /// Persistent worker `name` in `project`.
    PersistentWorker {
        /// Project scope.
        project: String,
        /// Worker name.
        name: String,
    },
    /// Transient worker `name` in `project`.
    TransientWorker {
        /// Project scope.
        project: String,
        /// Worker name.
        name: String,
    },
}

impl AgentIdentity {
    /// Build and validate an identity from its parts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` if a required part is missing, an
    /// unexpected part is supplied, or a part would make the session name,
    /// ticket id, or address ambiguous.
    pub fn new(role: RoleType, project: Option<&str>, name: Option<&str>) -> Result<Self> {
        if role.is_project_scoped() != project.is_some() {
            return Err(AppError::Identity(format!(
                "{role} {} a project scope",
                if role.is_project_scoped() { "requires" } else { "does not take" }
            )));
        }
        if role.is_named() != name.is_some() {
            return Err(AppError::Identity(format!(
                "{role} {} an agent name",
                if role.is_named() { "requires" } else { "does not take" }
            )));
        }
        if let Some(project) = project {
            validate_project(project)?;
        }
        if let Some(name) = name {
            validate_name(role, name)?;
        }

        let project = project.map(str::to_owned).unwrap_or_default();
        let name = name.map(str::to_owned).unwrap_or_default();
        Ok(match role {
            RoleType::Coordinator => Self::Coordinator,
            RoleType::HealthOrchestrator => Self::HealthOrchestrator,
            RoleType::Monitor => Self::Monitor { project },
            RoleType::MergeProcessor => Self::MergeProcessor { project },
            RoleType::PersistentWorker => Self::PersistentWorker { project, name },
            RoleType::TransientWorker => Self::TransientWorker { project, name },
        })
    }

    /// Validated monitor identity for `project`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` if `project` is not a valid scope.
    pub fn monitor(project: &str) -> Result<Self> {
        Self::new(RoleType::Monitor, Some(project), None)
    }

    /// Validated merge-processor identity for `project`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` if `project` is not a valid scope.
    pub fn merge_processor(project: &str) -> Result<Self> {
        Self::new(RoleType::MergeProcessor, Some(project), None)
    }

    /// Role of this agent.
    #[must_use]
    pub fn role(&self) -> RoleType {
        match self {
            Self::Coordinator => RoleType::Coordinator,
            Self::HealthOrchestrator => RoleType::HealthOrchestrator,
            Self::Monitor { .. } => RoleType::Monitor,
            Self::MergeProcessor { .. } => RoleType::MergeProcessor,
            Self::PersistentWorker { .. } => RoleType::PersistentWorker,
            Self::TransientWorker { .. } => RoleType::TransientWorker,
        }
    }

    /// Project scope, if the role has one.
    #[must_use]
    pub fn project(&self) -> Option<&str> {
        match self {
            Self::Coordinator | Self::HealthOrchestrator => None,
            Self::Monitor { project }
            | Self::MergeProcessor { project }
            | Self::PersistentWorker { project, .. }
            | Self::TransientWorker { project, .. } => Some(project),
        }
    }

    /// Agent name, if the role has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::PersistentWorker { name, .. } | Self::TransientWorker { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Terminal session name.
    #[must_use]
    pub fn session_name(&self) -> String {
        match self {
            Self::Coordinator => format!("{SESSION_PREFIX}coordinator"),
            Self::HealthOrchestrator => format!("{SESSION_PREFIX}orchestrator"),
            Self::Monitor { project } => format!("{SESSION_PREFIX}{project}-monitor"),
            Self::MergeProcessor { project } => format!("{SESSION_PREFIX}{project}-merger"),
            Self::PersistentWorker { project, name } => {
                format!("{SESSION_PREFIX}{project}-crew-{name}")
            }
            Self::TransientWorker { project, name } => format!("{SESSION_PREFIX}{project}-{name}"),
        }
    }

    /// Ticket id of the agent's own record in the work-item store.
    #[must_use]
    pub fn ticket_id(&self) -> String {
        match self {
            Self::Coordinator => format!("{TOWN_TICKET_PREFIX}coordinator"),
            Self::HealthOrchestrator => format!("{TOWN_TICKET_PREFIX}orchestrator"),
            Self::TransientWorker { project, name } => {
                format!("{SESSION_PREFIX}{project}-worker-{name}")
            }
            other => other.session_name(),
        }
    }

    /// Mail address.
    #[must_use]
    pub fn address(&self) -> String {
        match self {
            Self::Coordinator => "coordinator".into(),
            Self::HealthOrchestrator => "orchestrator".into(),
            Self::Monitor { project } => format!("{project}/monitor"),
            Self::MergeProcessor { project } => format!("{project}/merger"),
            Self::PersistentWorker { project, name } => format!("{project}/crew/{name}"),
            Self::TransientWorker { project, name } => format!("{project}/workers/{name}"),
        }
    }

    /// Default working directory under `town_root`.
    #[must_use]
    pub fn work_dir(&self, town_root: &Path) -> PathBuf {
        match self {
            Self::Coordinator | Self::HealthOrchestrator => town_root.to_path_buf(),
            Self::Monitor { project } => town_root.join(project),
            Self::MergeProcessor { project } => town_root.join(project).join("merger").join("repo"),
            Self::PersistentWorker { project, name } => {
                town_root.join(project).join("crew").join(name)
            }
            Self::TransientWorker { project, name } => {
                town_root.join(project).join("workers").join(name)
            }
        }
    }

    /// Path of the agent's own durable state file.
    #[must_use]
    pub fn state_file(&self, town_root: &Path) -> PathBuf {
        let dir = match self {
            Self::Coordinator => town_root.join("coordinator"),
            Self::HealthOrchestrator => town_root.join("orchestrator"),
            Self::Monitor { project } => town_root.join(project).join("monitor"),
            Self::MergeProcessor { project } => town_root.join(project).join("merger"),
            Self::PersistentWorker { .. } | Self::TransientWorker { .. } => {
                self.work_dir(town_root)
            }
        };
        dir.join("state.json")
    }

    /// Parse a terminal session name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` if `raw` is not a session name produced
    /// by [`session_name`](Self::session_name).
    pub fn parse_session_name(raw: &str) -> Result<Self> {
        let rest = raw
            .strip_prefix(SESSION_PREFIX)
            .ok_or_else(|| unrecognized("session name", raw))?;

        match rest {
            "coordinator" => return Ok(Self::Coordinator),
            "orchestrator" => return Ok(Self::HealthOrchestrator),
            _ => {}
        }
        if let Some((project, name)) = rest.split_once("-crew-") {
            return Self::new(RoleType::PersistentWorker, Some(project), Some(name));
        }
        if let Some(project) = rest.strip_suffix("-monitor") {
            return Self::new(RoleType::Monitor, Some(project), None);
        }
        if let Some(project) = rest.strip_suffix("-merger") {
            return Self::new(RoleType::MergeProcessor, Some(project), None);
        }
        let (project, name) = rest
            .rsplit_once('-')
            .ok_or_else(|| unrecognized("session name", raw))?;
        Self::new(RoleType::TransientWorker, Some(project), Some(name))
    }

    /// Parse a ticket id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` if `raw` is not a ticket id produced by
    /// [`ticket_id`](Self::ticket_id).
    pub fn parse_ticket_id(raw: &str) -> Result<Self> {
        if let Some(rest) = raw.strip_prefix(TOWN_TICKET_PREFIX) {
            return match rest {
                "coordinator" => Ok(Self::Coordinator),
                "orchestrator" => Ok(Self::HealthOrchestrator),
                _ => Err(unrecognized("ticket id", raw)),
            };
        }
        let rest = raw
            .strip_prefix(SESSION_PREFIX)
            .ok_or_else(|| unrecognized("ticket id", raw))?;

        if let Some((project, name)) = rest.split_once("-crew-") {
            return Self::new(RoleType::PersistentWorker, Some(project), Some(name));
        }
        if let Some((project, name)) = rest.split_once("-worker-") {
            return Self::new(RoleType::TransientWorker, Some(project), Some(name));
        }
        if let Some(project) = rest.strip_suffix("-monitor") {
            return Self::new(RoleType::Monitor, Some(project), None);
        }
        if let Some(project) = rest.strip_suffix("-merger") {
            return Self::new(RoleType::MergeProcessor, Some(project), None);
        }
        Err(unrecognized("ticket id", raw))
    }

    /// Parse a mail address. A single trailing `/` is tolerated.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` if `raw` is not an address produced by
    /// [`address`](Self::address).
    pub fn parse_address(raw: &str) -> Result<Self> {
        let trimmed = raw.strip_suffix('/').unwrap_or(raw);
        let parts: Vec<&str> = trimmed.split('/').collect();
        match parts.as_slice() {
            ["coordinator"] => Ok(Self::Coordinator),
            ["orchestrator"] => Ok(Self::HealthOrchestrator),
            [project, "monitor"] => Self::new(RoleType::Monitor, Some(project), None),
            [project, "merger"] => Self::new(RoleType::MergeProcessor, Some(project), None),
            [project, "crew", name] => {
                Self::new(RoleType::PersistentWorker, Some(project), Some(name))
            }
            [project, "workers", name] => {
                Self::new(RoleType::TransientWorker, Some(project), Some(name))
            }
            _ => Err(unrecognized("address", raw)),
        }
    }

    /// Parse any of the address, session-name, or ticket-id forms.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` if no form matches.
    pub fn parse_any(raw: &str) -> Result<Self> {
        if raw.contains('/') || raw == "coordinator" || raw == "orchestrator" {
            return Self::parse_address(raw);
        }
        if raw.starts_with(TOWN_TICKET_PREFIX) || raw.contains("-worker-") {
            return Self::parse_ticket_id(raw);
        }
        Self::parse_session_name(raw)
    }
}

impl Display for AgentIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address())
    }
}

fn unrecognized(form: &str, raw: &str) -> AppError {
    AppError::Identity(format!("unrecognized {form}: {raw:?}"))
}

fn valid_chars(raw: &str) -> bool {
    !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn validate_project(project: &str) -> Result<()> {
    if !valid_chars(project) {
        return Err(AppError::Identity(format!(
            "invalid project scope: {project:?}"
        )));
    }
    for segment in project.split('-') {
        if segment.is_empty() || RESERVED.contains(&segment) {
            return Err(AppError::Identity(format!(
                "project scope {project:?} contains reserved or empty segment {segment:?}"
            )));
        }
    }
    Ok(())
}

fn validate_name(role: RoleType, name: &str) -> Result<()> {
    if !valid_chars(name) || name.starts_with('-') || name.ends_with('-') {
        return Err(AppError::Identity(format!("invalid agent name: {name:?}")));
    }
    if role == RoleType::TransientWorker && (name.contains('-') || RESERVED.contains(&name)) {
        return Err(AppError::Identity(format!(
            "transient worker name {name:?} must be a single non-reserved word"
        )));
    }
    Ok(())
}
