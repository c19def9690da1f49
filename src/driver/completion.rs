//! Aggregate completion check via `<town> convoy check <id>`.

use tracing::{debug, info};

use super::command::Cli;
use super::{CompletionCheck, DriverFuture};
use crate::AppError;

/// Output printed by the town CLI when nothing was closed.
const NOTHING_READY: &str = "No convoys ready";

/// Delegates the completion decision to the town CLI.
#[derive(Debug, Clone)]
pub struct CliCompletionCheck {
    cli: Cli,
}

impl CliCompletionCheck {
    /// Adapter invoking the town CLI described by `cli`.
    #[must_use]
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }
}

impl CompletionCheck for CliCompletionCheck {
    fn check(&self, aggregate_id: &str) -> DriverFuture<'_, ()> {
        let aggregate_id = aggregate_id.to_owned();
        Box::pin(async move {
            let out = self
                .cli
                .stdout(&["convoy", "check", &aggregate_id])
                .await
                .map_err(AppError::Store)?;
            let out = out.trim();
            if out.is_empty() || out.contains(NOTHING_READY) {
                debug!(aggregate_id, "completion check: nothing to close");
            } else {
                info!(aggregate_id, output = out, "completion check reported changes");
            }
            Ok(())
        })
    }
}
