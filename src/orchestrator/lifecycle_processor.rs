//! Lifecycle request processing.
//!
//! Each qualifying inbox message moves through
//! `received → validated → claimed → {executed | rejected | failed}` within
//! a single tick. The message is deleted (claimed) *before* anything is
//! done to the requester's session, so a request is executed at most once:
//! if the action fails, or the supervisor dies mid-action, the request is
//! gone and the agent has to ask again. A claim that cannot be made means
//! the action is not attempted at all.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::launcher::SessionLauncher;
use super::{elapsed_between, format_age, Collaborators};
use crate::audit::{AuditEntry, AuditEventType};
use crate::models::identity::AgentIdentity;
use crate::models::lifecycle::{LifecycleAction, LifecycleOutcome, LifecycleRequest};
use crate::models::mail::MailMessage;
use crate::models::state::{SupervisorState, EXIT_REASON_SHUTDOWN};
use crate::persistence::agent_state::{AgentStateFile, REQUESTING_TIME_KEY};
use crate::{AppError, Result};

/// Consumes lifecycle requests from the health orchestrator's inbox.
pub struct LifecycleProcessor {
    ctx: Collaborators,
    launcher: Arc<SessionLauncher>,
    town_root: PathBuf,
    max_age: Duration,
    restart_pause: Duration,
}

impl LifecycleProcessor {
    /// Construct a processor.
    ///
    /// `max_age` bounds how old a request may be and still run;
    /// `restart_pause` separates killing a session from recreating it.
    #[must_use]
    pub fn new(
        ctx: Collaborators,
        launcher: Arc<SessionLauncher>,
        town_root: PathBuf,
        max_age: Duration,
        restart_pause: Duration,
    ) -> Self {
        Self {
            ctx,
            launcher,
            town_root,
            max_age,
            restart_pause,
        }
    }

    /// Process every unread lifecycle request in inbox order.
    ///
    /// Non-lifecycle and already-read messages are left alone and produce
    /// no outcome.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Mail` only if the inbox itself cannot be read.
    pub async fn process_inbox(&self, state: &mut SupervisorState) -> Result<Vec<LifecycleOutcome>> {
        let inbox = AgentIdentity::HealthOrchestrator.address();
        let messages = self.ctx.mailbox.inbox(&inbox).await?;

        let mut outcomes = Vec::new();
        for message in messages.iter().filter(|m| !m.read) {
            if let Some(outcome) = self.process_message(state, message, Utc::now()).await {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    /// Process one message as of `now`. Returns `None` if it is not a lifecycle request.
    pub async fn process_message(
        &self,
        state: &mut SupervisorState,
        message: &MailMessage,
        now: DateTime<Utc>,
    ) -> Option<LifecycleOutcome> {
        let Some(request) = LifecycleRequest::from_message(message) else {
            debug!(message_id = %message.id, subject = %message.subject, "not a lifecycle request");
            return None;
        };

        let span = info_span!(
            "lifecycle_request",
            message_id = %request.message_id,
            from = %request.from,
            action = request.action.as_str()
        );
        Some(self.handle(state, &request, now).instrument(span).await)
    }

    async fn handle(
        &self,
        state: &mut SupervisorState,
        request: &LifecycleRequest,
        now: DateTime<Utc>,
    ) -> LifecycleOutcome {
        let message_id = request.message_id.clone();

        if let Some(sent_at) = request.timestamp {
            let age = elapsed_between(sent_at, now);
            if age > self.max_age {
                warn!(age = %format_age(age), max = %format_age(self.max_age), "discarding stale lifecycle request");
                if let Err(err) = self.ctx.mailbox.delete(&message_id).await {
                    warn!(%err, "failed to delete stale lifecycle request");
                }
                self.ctx.record(
                    AuditEntry::new(AuditEventType::LifecycleDiscarded)
                        .with_action(request.action.as_str())
                        .with_detail(format!("from {} aged {}", request.from, format_age(age))),
                );
                return LifecycleOutcome::Discarded { message_id };
            }
        }

        // Claim.
        if let Err(err) = self.ctx.mailbox.delete(&message_id).await {
            error!(%err, "could not claim lifecycle request, not executing");
            self.ctx.record(
                AuditEntry::new(AuditEventType::LifecycleFailed)
                    .with_action(request.action.as_str())
                    .with_detail(format!("claim failed: {err}")),
            );
            return LifecycleOutcome::Failed {
                message_id,
                reason: format!("claim failed: {err}"),
            };
        }

        info!("processing lifecycle request");
        match self.execute(state, request, now).await {
            Ok(identity) => {
                self.ctx.record(
                    AuditEntry::new(AuditEventType::LifecycleExecuted)
                        .with_agent(&identity)
                        .with_action(request.action.as_str()),
                );
                LifecycleOutcome::Executed {
                    message_id,
                    action: request.action,
                    session: identity.session_name(),
                }
            }
            Err(AppError::Precondition(reason)) => {
                warn!(reason, "lifecycle request rejected");
                self.ctx.record(
                    AuditEntry::new(AuditEventType::LifecycleRejected)
                        .with_action(request.action.as_str())
                        .with_detail(format!("from {}: {reason}", request.from)),
                );
                LifecycleOutcome::Rejected { message_id, reason }
            }
            Err(err) => {
                error!(%err, "lifecycle request failed");
                self.ctx.record(
                    AuditEntry::new(AuditEventType::LifecycleFailed)
                        .with_action(request.action.as_str())
                        .with_detail(format!("from {}: {err}", request.from)),
                );
                LifecycleOutcome::Failed {
                    message_id,
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn execute(
        &self,
        state: &mut SupervisorState,
        request: &LifecycleRequest,
        now: DateTime<Utc>,
    ) -> Result<AgentIdentity> {
        let identity = AgentIdentity::parse_any(&request.from)?;
        let flag = request.action.requesting_flag();

        let mut staged = match AgentStateFile::load(&identity.state_file(&self.town_root)) {
            Ok(file) => file,
            Err(AppError::NotFound(what)) => {
                return Err(AppError::Precondition(format!("{flag} not staged: no {what}")))
            }
            Err(err) => return Err(err),
        };
        staged.require_flag(&flag)?;

        let session = identity.session_name();
        let running = self.ctx.sessions.has_session(&session).await?;
        if running {
            self.ctx.sessions.kill_session(&session).await?;
            info!(session, "killed session");
        }

        match request.action {
            LifecycleAction::Shutdown => {
                let agent = state.agent_mut(&identity);
                agent.last_exited_at = Some(now);
                EXIT_REASON_SHUTDOWN.clone_into(&mut agent.exit_reason);
            }
            LifecycleAction::Cycle | LifecycleAction::Restart => {
                // Give the killed session time to release its terminal.
                if running {
                    tokio::time::sleep(self.restart_pause).await;
                }
                self.launcher
                    .launch(self.ctx.sessions.as_ref(), &identity, request.action.as_str())
                    .await?;
                state.record_launch(&identity, Utc::now());
            }
        }

        if staged.clear(&[flag.as_str(), REQUESTING_TIME_KEY]) {
            if let Err(err) = staged.save() {
                warn!(path = %staged.path().display(), %err, "failed to clear staging flag");
            }
        }

        Ok(identity)
    }
}
