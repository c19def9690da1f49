//! Lifecycle request decoding.
//!
//! Agents ask the supervisor to restart or stop them by mailing the health
//! orchestrator a message whose subject starts with `LIFECYCLE:` and whose
//! body is `{"action": "<action>"}`. A handful of plain-text bodies are
//! accepted for agents that cannot produce JSON.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::mail::MailMessage;

/// Subject marker identifying lifecycle requests (matched case-insensitively).
pub const LIFECYCLE_SUBJECT_MARKER: &str = "lifecycle:";

/// Requested transition.
///
/// `Cycle` and `Restart` currently execute identically but stay distinct so
/// a handoff step can later be attached to `Cycle` alone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    /// Hand off and start a fresh session.
    Cycle,
    /// Kill and start a fresh session.
    Restart,
    /// Kill without restarting.
    Shutdown,
}

impl LifecycleAction {
    /// Lowercase action name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cycle => "cycle",
            Self::Restart => "restart",
            Self::Shutdown => "shutdown",
        }
    }

    /// Key the requester sets in its own state file before asking.
    #[must_use]
    pub fn requesting_flag(self) -> String {
        format!("requesting_{}", self.as_str())
    }

    /// Parse an action name; `stop` is accepted as `shutdown`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cycle" => Some(Self::Cycle),
            "restart" => Some(Self::Restart),
            "shutdown" | "stop" => Some(Self::Shutdown),
            _ => None,
        }
    }
}

impl Display for LifecycleAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded lifecycle request. Lives only while its message is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleRequest {
    /// Mailbox id of the carrying message.
    pub message_id: String,
    /// Sender address.
    pub from: String,
    /// Requested transition.
    pub action: LifecycleAction,
    /// Send time, when the message carried a valid timestamp.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct LifecycleBody {
    action: String,
}

impl LifecycleRequest {
    /// Decode `message`, returning `None` when it is not a lifecycle request.
    #[must_use]
    pub fn from_message(message: &MailMessage) -> Option<Self> {
        if !message
            .subject
            .to_ascii_lowercase()
            .starts_with(LIFECYCLE_SUBJECT_MARKER)
        {
            return None;
        }

        let action = match serde_json::from_str::<LifecycleBody>(&message.body) {
            Ok(body) => LifecycleAction::parse(&body.action)?,
            Err(_) => parse_plain_body(&message.body)?,
        };

        Some(Self {
            message_id: message.id.clone(),
            from: message.from.clone(),
            action,
            timestamp: message.sent_at(),
        })
    }
}

fn parse_plain_body(body: &str) -> Option<LifecycleAction> {
    match body.trim().to_ascii_lowercase().as_str() {
        "restart" | "action: restart" => Some(LifecycleAction::Restart),
        "shutdown" | "action: shutdown" | "stop" => Some(LifecycleAction::Shutdown),
        "cycle" | "action: cycle" => Some(LifecycleAction::Cycle),
        _ => None,
    }
}

/// Terminal state of one processed lifecycle message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// Older than the maximum age; deleted without acting.
    Discarded {
        /// Message id.
        message_id: String,
    },
    /// Claimed, but the requester had not staged the request.
    Rejected {
        /// Message id.
        message_id: String,
        /// Why the request was refused.
        reason: String,
    },
    /// Claimed (or claim attempted) but the action did not complete.
    Failed {
        /// Message id.
        message_id: String,
        /// Failure description.
        reason: String,
    },
    /// Claimed and carried out.
    Executed {
        /// Message id.
        message_id: String,
        /// Action performed.
        action: LifecycleAction,
        /// Session acted on.
        session: String,
    },
}

impl LifecycleOutcome {
    /// Id of the message this outcome belongs to.
    #[must_use]
    pub fn message_id(&self) -> &str {
        match self {
            Self::Discarded { message_id }
            | Self::Rejected { message_id, .. }
            | Self::Failed { message_id, .. }
            | Self::Executed { message_id, .. } => message_id,
        }
    }
}
