//! Bounded invocation of external CLI programs.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// A program run with a fixed working directory and timeout.
///
/// Errors are returned as plain strings so each adapter can wrap them in
/// its own [`AppError`](crate::AppError) variant.
#[derive(Debug, Clone)]
pub struct Cli {
    program: String,
    work_dir: PathBuf,
    timeout: Duration,
}

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CliOutput {
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl Cli {
    /// Describe `program` run from `work_dir`, killed after `timeout`.
    #[must_use]
    pub fn new(program: impl Into<String>, work_dir: &Path, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            work_dir: work_dir.to_path_buf(),
            timeout,
        }
    }

    /// Run with `args` and capture output regardless of exit status.
    ///
    /// # Errors
    ///
    /// Returns a description if the program cannot be spawned or times out.
    pub async fn run(&self, args: &[&str]) -> std::result::Result<CliOutput, String> {
        debug!(program = %self.program, ?args, "running external command");
        let child = Command::new(&self.program)
            .args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(format!("failed to run {}: {err}", self.program)),
            Err(_elapsed) => {
                return Err(format!(
                    "{} {} timed out after {:?}",
                    self.program,
                    args.join(" "),
                    self.timeout
                ))
            }
        };

        Ok(CliOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run with `args` and return stdout, failing on a non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns a description including stderr on spawn failure, timeout, or
    /// non-zero exit.
    pub async fn stdout(&self, args: &[&str]) -> std::result::Result<String, String> {
        let output = self.run(args).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(format!(
                "{} {} failed: {}",
                self.program,
                args.first().copied().unwrap_or_default(),
                output.stderr.trim()
            ))
        }
    }
}
