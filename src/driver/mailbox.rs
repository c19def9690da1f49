//! Mailbox adapter over the town CLI's `mail` subcommand.

use super::command::Cli;
use super::{DriverFuture, Mailbox};
use crate::models::mail::MailMessage;
use crate::AppError;

/// Reads, deletes, and sends mail through `<town> mail ...`.
#[derive(Debug, Clone)]
pub struct CliMailbox {
    cli: Cli,
}

impl CliMailbox {
    /// Adapter invoking the town CLI described by `cli`.
    #[must_use]
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }
}

impl Mailbox for CliMailbox {
    fn inbox(&self, address: &str) -> DriverFuture<'_, Vec<MailMessage>> {
        let address = address.to_owned();
        Box::pin(async move {
            let out = self
                .cli
                .stdout(&["mail", "inbox", "--identity", &address, "--json"])
                .await
                .map_err(AppError::Mail)?;
            let trimmed = out.trim();
            if trimmed.is_empty() {
                return Ok(Vec::new());
            }
            serde_json::from_str(trimmed)
                .map_err(|err| AppError::Mail(format!("unexpected inbox output: {err}")))
        })
    }

    fn delete(&self, id: &str) -> DriverFuture<'_, ()> {
        let id = id.to_owned();
        Box::pin(async move {
            self.cli
                .stdout(&["mail", "delete", &id])
                .await
                .map(|_| ())
                .map_err(AppError::Mail)
        })
    }

    fn send(&self, to: &str, subject: &str, body: &str) -> DriverFuture<'_, ()> {
        let to = to.to_owned();
        let subject = subject.to_owned();
        let body = body.to_owned();
        Box::pin(async move {
            self.cli
                .stdout(&["mail", "send", &to, "-s", &subject, "-m", &body])
                .await
                .map(|_| ())
                .map_err(AppError::Mail)
        })
    }
}
