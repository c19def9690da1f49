//! Change-event feed records.

use serde::{Deserialize, Serialize};

use super::work_item::STATUS_CLOSED;
use crate::{AppError, Result};

/// Feed record type for status transitions.
pub const STATUS_EVENT_TYPE: &str = "status";

/// One line of the work-item store's activity feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    /// RFC 3339 time of the change.
    #[serde(default)]
    pub timestamp: String,
    /// Record type (`status`, `create`, `comment`, ...).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Id of the changed item.
    pub issue_id: String,
    /// Display symbol used by the store's own formatter.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Human-readable summary.
    #[serde(default)]
    pub message: Option<String>,
    /// Status before the change.
    #[serde(default)]
    pub old_status: Option<String>,
    /// Status after the change.
    #[serde(default)]
    pub new_status: Option<String>,
}

impl ChangeEvent {
    /// Parse one NDJSON line.
    ///
    /// Returns `Ok(None)` for blank lines.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Feed` when the line is not a valid record.
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line)
            .map(Some)
            .map_err(|err| AppError::Feed(format!("malformed feed record: {err}")))
    }

    /// Whether this record reports an item moving to `closed`.
    #[must_use]
    pub fn is_closure(&self) -> bool {
        self.event_type == STATUS_EVENT_TYPE && self.new_status.as_deref() == Some(STATUS_CLOSED)
    }
}
