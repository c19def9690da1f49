//! Per-agent durable state files.
//!
//! Each agent owns a small JSON object on disk. Before asking for a
//! lifecycle transition it sets `requesting_<action>: true` (and usually
//! `requesting_time`); the supervisor checks the flag before acting and
//! clears both keys afterwards. Other keys belong to the agent and are
//! preserved untouched.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::write_atomic;
use crate::{AppError, Result};

/// Key holding the time a lifecycle request was staged.
pub const REQUESTING_TIME_KEY: &str = "requesting_time";

/// Prefix shared by all staging flags.
pub const REQUESTING_PREFIX: &str = "requesting_";

/// In-memory view of one agent state file.
#[derive(Debug, Clone)]
pub struct AgentStateFile {
    path: PathBuf,
    fields: Map<String, Value>,
}

impl AgentStateFile {
    /// Load the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the file does not exist and
    /// `AppError::Io` if it cannot be read or is not a JSON object.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                AppError::NotFound(format!("agent state file {}", path.display()))
            } else {
                AppError::Io(format!("cannot read {}: {err}", path.display()))
            }
        })?;
        let fields: Map<String, Value> = serde_json::from_str(&raw)
            .map_err(|err| AppError::Io(format!("invalid agent state {}: {err}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            fields,
        })
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fail unless `key` holds boolean `true`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Precondition` describing what was found instead.
    pub fn require_flag(&self, key: &str) -> Result<()> {
        match self.fields.get(key) {
            Some(Value::Bool(true)) => Ok(()),
            Some(other) => Err(AppError::Precondition(format!(
                "{key} is {other} in {}",
                self.path.display()
            ))),
            None => Err(AppError::Precondition(format!(
                "{key} not set in {}",
                self.path.display()
            ))),
        }
    }

    /// Staging flags currently set to `true`.
    #[must_use]
    pub fn active_requests(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(key, value)| {
                key.starts_with(REQUESTING_PREFIX)
                    && key.as_str() != REQUESTING_TIME_KEY
                    && matches!(value, Value::Bool(true))
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Remove `keys`, returning whether anything was removed.
    pub fn clear(&mut self, keys: &[&str]) -> bool {
        keys.iter()
            .fold(false, |changed, key| self.fields.remove(*key).is_some() || changed)
    }

    /// Atomically write the file back.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if serialization or the write fails.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.fields)
            .map_err(|err| AppError::Io(format!("cannot serialize agent state: {err}")))?;
        write_atomic(&self.path, &json)
            .map_err(|err| AppError::Io(format!("cannot write {}: {err}", self.path.display())))
    }
}
