//! Supervisor state file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::write_atomic;
use crate::models::state::SupervisorState;
use crate::{AppError, Result};

/// Loads and saves [`SupervisorState`] at a fixed path.
///
/// There is exactly one writer (the heartbeat loop), so no locking is done.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store backed by `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, returning a fresh default when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<SupervisorState> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|err| {
                AppError::State(format!("corrupt state file {}: {err}", self.path.display()))
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file yet, starting fresh");
                Ok(SupervisorState::default())
            }
            Err(err) => Err(AppError::State(format!(
                "cannot read state file {}: {err}",
                self.path.display()
            ))),
        }
    }

    /// Atomically replace the state file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if serialization or the write fails.
    pub fn save(&self, state: &SupervisorState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)
            .map_err(|err| AppError::State(format!("cannot serialize state: {err}")))?;
        write_atomic(&self.path, &json).map_err(|err| {
            AppError::State(format!(
                "cannot write state file {}: {err}",
                self.path.display()
            ))
        })
    }
}

/// Whether a process with `pid` currently exists.
#[cfg(unix)]
#[must_use]
pub fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    // EPERM still means the process exists.
    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}

/// Whether a process with `pid` currently exists.
#[cfg(not(unix))]
#[must_use]
pub fn is_process_alive(_pid: u32) -> bool {
    false
}
