//! tmux-backed [`SessionManager`].

use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use super::command::Cli;
use super::{DriverFuture, SessionManager};
use crate::AppError;

/// Pause between typing a nudge and pressing Enter, so the agent's input
/// box has settled before submission.
const NUDGE_SUBMIT_DELAY: Duration = Duration::from_millis(500);

/// Drives sessions through the `tmux` command line.
#[derive(Debug, Clone)]
pub struct TmuxSessions {
    cli: Cli,
}

impl TmuxSessions {
    /// Adapter invoking `program` (normally `tmux`).
    #[must_use]
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    async fn exec(&self, args: &[&str]) -> crate::Result<()> {
        self.cli
            .stdout(args)
            .await
            .map(|_| ())
            .map_err(AppError::Session)
    }

    async fn pane_pids(&self, name: &str) -> crate::Result<Vec<i32>> {
        let target = exact(name);
        let out = self
            .cli
            .stdout(&["list-panes", "-s", "-t", &target, "-F", "#{pane_pid}"])
            .await
            .map_err(AppError::Session)?;
        Ok(out
            .lines()
            .filter_map(|line| line.trim().parse::<i32>().ok())
            .collect())
    }
}

/// Exact-match target so `fw-a` never resolves to `fw-alpha-monitor`.
fn exact(name: &str) -> String {
    format!("={name}")
}

#[cfg(unix)]
fn terminate_group(pid: i32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, %err, "process group already gone");
    }
}

#[cfg(not(unix))]
fn terminate_group(_pid: i32) {}

impl SessionManager for TmuxSessions {
    fn has_session(&self, name: &str) -> DriverFuture<'_, bool> {
        let target = exact(name);
        Box::pin(async move {
            let output = self
                .cli
                .run(&["has-session", "-t", &target])
                .await
                .map_err(AppError::Session)?;
            Ok(output.success)
        })
    }

    fn new_session(&self, name: &str, work_dir: &Path) -> DriverFuture<'_, ()> {
        let name = name.to_owned();
        let work_dir = work_dir.to_string_lossy().into_owned();
        Box::pin(async move {
            self.exec(&["new-session", "-d", "-s", &name, "-c", &work_dir])
                .await
        })
    }

    fn kill_session(&self, name: &str) -> DriverFuture<'_, ()> {
        let target = exact(name);
        Box::pin(async move { self.exec(&["kill-session", "-t", &target]).await })
    }

    fn kill_session_with_processes(&self, name: &str) -> DriverFuture<'_, ()> {
        let name = name.to_owned();
        Box::pin(async move {
            match self.pane_pids(&name).await {
                Ok(pids) => pids.into_iter().for_each(terminate_group),
                Err(err) => warn!(session = %name, %err, "could not list pane processes"),
            }
            self.exec(&["kill-session", "-t", &exact(&name)]).await
        })
    }

    fn send_keys(&self, name: &str, keys: &str) -> DriverFuture<'_, ()> {
        let name = name.to_owned();
        let keys = keys.to_owned();
        Box::pin(async move {
            self.exec(&["send-keys", "-t", &name, "-l", &keys]).await?;
            self.exec(&["send-keys", "-t", &name, "Enter"]).await
        })
    }

    fn nudge_session(&self, name: &str, message: &str) -> DriverFuture<'_, ()> {
        let name = name.to_owned();
        let message = message.to_owned();
        Box::pin(async move {
            self.exec(&["send-keys", "-t", &name, "-l", &message])
                .await?;
            tokio::time::sleep(NUDGE_SUBMIT_DELAY).await;
            self.exec(&["send-keys", "-t", &name, "Enter"]).await
        })
    }

    fn set_environment(&self, name: &str, key: &str, value: &str) -> DriverFuture<'_, ()> {
        let name = name.to_owned();
        let key = key.to_owned();
        let value = value.to_owned();
        Box::pin(async move {
            self.exec(&["set-environment", "-t", &name, &key, &value])
                .await
        })
    }
}
