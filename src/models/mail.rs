//! Mailbox message record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message as returned by the mailbox inbox listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailMessage {
    /// Mailbox-assigned message id.
    pub id: String,
    /// Sender address.
    #[serde(default)]
    pub from: String,
    /// Recipient address.
    #[serde(default)]
    pub to: String,
    /// Subject line.
    #[serde(default)]
    pub subject: String,
    /// Body text.
    #[serde(default)]
    pub body: String,
    /// RFC 3339 send time as recorded by the mailbox.
    #[serde(default)]
    pub timestamp: String,
    /// Whether the message has been read.
    #[serde(default)]
    pub read: bool,
    /// Delivery priority.
    #[serde(default)]
    pub priority: String,
    /// Message type tag.
    #[serde(default, rename = "type")]
    pub message_type: String,
}

impl MailMessage {
    /// Parsed send time, if the timestamp is valid RFC 3339.
    #[must_use]
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}
