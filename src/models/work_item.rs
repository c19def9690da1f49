//! Work-item store records and the agent fields embedded in them.
//!
//! Agent records are ordinary work items of type `agent` whose description
//! carries `key: value` lines (`role_type`, `project`, `agent_state`,
//! `current_work`, `role_ticket`). The store may also expose `agent_state`
//! and `current_work` as columns; columns win when non-empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Item type of agent records.
pub const AGENT_ITEM_TYPE: &str = "agent";

/// Item type of aggregate trackers.
pub const CONVOY_ITEM_TYPE: &str = "convoy";

/// Item type of merge queue entries.
pub const MERGE_REQUEST_ITEM_TYPE: &str = "merge-request";

/// Item type of assignable work.
pub const TASK_ITEM_TYPE: &str = "task";

/// Status of a finished item.
pub const STATUS_CLOSED: &str = "closed";

/// Status of an unfinished item.
pub const STATUS_OPEN: &str = "open";

/// Label prefix carrying an agent's last heartbeat.
pub const LAST_ACTIVITY_LABEL: &str = "last_activity:";

/// Label prefix carrying an item's project scope.
pub const PROJECT_LABEL: &str = "project:";

/// Agent states that count as actively working.
pub const ACTIVE_AGENT_STATES: &[&str] = &["running", "working"];

/// Agent state written by the stale-liveness sweep.
pub const AGENT_STATE_DEAD: &str = "dead";

/// One record from the work-item store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkItem {
    /// Item id.
    pub id: String,
    /// Short title.
    #[serde(default)]
    pub title: String,
    /// Item type (`agent`, `convoy`, `task`, ...).
    #[serde(default)]
    pub issue_type: String,
    /// Current status.
    #[serde(default)]
    pub status: String,
    /// Assigned agent address, if any.
    #[serde(default)]
    pub assignee: String,
    /// Free-form labels.
    #[serde(default)]
    pub labels: Vec<String>,
    /// RFC 3339 time of the last update.
    #[serde(default)]
    pub updated_at: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Current work column (agent records only).
    #[serde(default)]
    pub current_work: String,
    /// Agent state column (agent records only).
    #[serde(default)]
    pub agent_state: String,
}

/// Agent sub-fields parsed from an agent record's description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentFields {
    /// Role name.
    pub role_type: String,
    /// Project scope (empty for town-level agents).
    pub project: String,
    /// Self-reported state (`idle`, `running`, `working`, `dead`, ...).
    pub agent_state: String,
    /// Id of the item the agent is working on.
    pub current_work: String,
    /// Id of the role definition item.
    pub role_ticket: String,
}

impl AgentFields {
    /// Parse `key: value` lines out of a description. Unknown keys are ignored.
    #[must_use]
    pub fn parse(description: &str) -> Self {
        let mut fields = Self::default();
        for line in description.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            let value = if value == "null" { "" } else { value };
            match key.trim() {
                "role_type" => value.clone_into(&mut fields.role_type),
                "project" => value.clone_into(&mut fields.project),
                "agent_state" => value.clone_into(&mut fields.agent_state),
                "current_work" => value.clone_into(&mut fields.current_work),
                "role_ticket" => value.clone_into(&mut fields.role_ticket),
                _ => {}
            }
        }
        fields
    }

    /// Render back to description lines, followed by an optional note paragraph.
    #[must_use]
    pub fn to_description(&self, note: Option<&str>) -> String {
        let mut out = format!(
            "role_type: {}\nproject: {}\nagent_state: {}\ncurrent_work: {}\nrole_ticket: {}\n",
            self.role_type, self.project, self.agent_state, self.current_work, self.role_ticket
        );
        if let Some(note) = note {
            out.push('\n');
            out.push_str(note);
        }
        out
    }
}

impl WorkItem {
    /// Agent sub-fields, with store columns taking precedence over the description.
    #[must_use]
    pub fn agent_fields(&self) -> AgentFields {
        let mut fields = AgentFields::parse(&self.description);
        if !self.agent_state.is_empty() {
            self.agent_state.clone_into(&mut fields.agent_state);
        }
        if !self.current_work.is_empty() {
            self.current_work.clone_into(&mut fields.current_work);
        }
        fields
    }

    /// Whether the item is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status == STATUS_CLOSED
    }

    /// Parsed `updated_at`, if valid RFC 3339.
    #[must_use]
    pub fn updated_at_time(&self) -> Option<DateTime<Utc>> {
        parse_rfc3339(&self.updated_at)
    }

    /// Heartbeat recorded in the `last_activity:` label, if present and valid.
    #[must_use]
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.labels
            .iter()
            .find_map(|label| label.strip_prefix(LAST_ACTIVITY_LABEL))
            .and_then(parse_rfc3339)
    }

    /// Whether the item carries the `project:<project>` label.
    #[must_use]
    pub fn in_project(&self, project: &str) -> bool {
        self.labels
            .iter()
            .filter_map(|label| label.strip_prefix(PROJECT_LABEL))
            .any(|value| value == project)
    }
}

/// Query for [`WorkStore::list`](crate::driver::WorkStore::list).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkFilter {
    /// Restrict to this item type.
    pub issue_type: Option<String>,
    /// Restrict to this status.
    pub status: Option<String>,
    /// Restrict to items labelled with this project.
    pub project: Option<String>,
    /// Restrict to items without an assignee.
    pub unassigned: bool,
}

impl WorkFilter {
    /// Filter on item type only.
    #[must_use]
    pub fn of_type(issue_type: &str) -> Self {
        Self {
            issue_type: Some(issue_type.to_owned()),
            ..Self::default()
        }
    }

    /// Restrict to open items.
    #[must_use]
    pub fn open(mut self) -> Self {
        self.status = Some(STATUS_OPEN.to_owned());
        self
    }

    /// Restrict to `project`.
    #[must_use]
    pub fn in_project(mut self, project: &str) -> Self {
        self.project = Some(project.to_owned());
        self
    }

    /// Restrict to unassigned items.
    #[must_use]
    pub fn unassigned(mut self) -> Self {
        self.unassigned = true;
        self
    }

    /// Whether `item` satisfies every constraint.
    #[must_use]
    pub fn matches(&self, item: &WorkItem) -> bool {
        self.issue_type.as_ref().is_none_or(|t| *t == item.issue_type)
            && self.status.as_ref().is_none_or(|s| *s == item.status)
            && self.project.as_ref().is_none_or(|p| item.in_project(p))
            && (!self.unassigned || item.assignee.is_empty())
    }
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
