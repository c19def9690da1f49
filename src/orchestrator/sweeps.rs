//! Once-per-tick consistency sweeps over agent records.
//!
//! - Stale liveness: patrol and town agents claiming to run without any
//!   update for `dead_agent_timeout` are marked dead.
//! - Stalled assignment: workers in a configured project holding work
//!   without any update for `stalled_assignment_timeout` are reported to
//!   the project's monitor.
//! - Orphaned work: dead agents still holding work are reported to their
//!   project's monitor.
//!
//! The two reports are advisory mail only; nothing is reassigned here.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{elapsed_between, format_age, Collaborators};
use crate::audit::{AuditEntry, AuditEventType};
use crate::config::GlobalConfig;
use crate::driver::WorkUpdate;
use crate::models::identity::{AgentIdentity, RoleType};
use crate::models::work_item::{
    WorkFilter, WorkItem, ACTIVE_AGENT_STATES, AGENT_ITEM_TYPE, AGENT_STATE_DEAD,
};
use crate::Result;

/// Timeouts used by the sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepThresholds {
    /// Silence after which a running patrol or town agent is marked dead.
    pub dead_agent_timeout: Duration,
    /// Silence after which a working agent is reported as stalled.
    pub stalled_assignment_timeout: Duration,
}

impl SweepThresholds {
    /// Thresholds from `config.thresholds`.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            dead_agent_timeout: Duration::from_secs(config.thresholds.dead_agent_timeout_seconds),
            stalled_assignment_timeout: Duration::from_secs(
                config.thresholds.stalled_assignment_timeout_seconds,
            ),
        }
    }
}

impl Default for SweepThresholds {
    fn default() -> Self {
        Self {
            dead_agent_timeout: Duration::from_secs(15 * 60),
            stalled_assignment_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Agent record ids acted on by one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records marked dead.
    pub marked_dead: Vec<String>,
    /// Records reported as stalled.
    pub stalled: Vec<String>,
    /// Records reported as orphaned.
    pub orphaned: Vec<String>,
}

/// Run all three sweeps over one listing of agent records.
///
/// Records marked dead by the liveness sweep are seen as dead by the orphan
/// sweep in the same pass.
///
/// # Errors
///
/// Returns `AppError::Store` if agent records cannot be listed. Failures
/// on individual records are logged and skipped.
pub async fn run_sweeps(
    ctx: &Collaborators,
    projects: &[String],
    thresholds: SweepThresholds,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let mut agents = ctx.store.list(&WorkFilter::of_type(AGENT_ITEM_TYPE)).await?;

    let marked_dead =
        sweep_stale_liveness(ctx, &mut agents, thresholds.dead_agent_timeout, now).await;
    let stalled = sweep_stalled_assignments(
        ctx,
        &agents,
        projects,
        thresholds.stalled_assignment_timeout,
        now,
    )
    .await;
    let orphaned = sweep_orphaned_work(ctx, &agents).await;

    if !(marked_dead.is_empty() && stalled.is_empty() && orphaned.is_empty()) {
        info!(
            marked_dead = marked_dead.len(),
            stalled = stalled.len(),
            orphaned = orphaned.len(),
            "sweeps found problems"
        );
    }

    Ok(SweepReport {
        marked_dead,
        stalled,
        orphaned,
    })
}

/// Mark silent patrol and town agents dead. Updates `agents` in place for
/// every record successfully marked.
pub async fn sweep_stale_liveness(
    ctx: &Collaborators,
    agents: &mut [WorkItem],
    timeout: Duration,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut marked = Vec::new();
    for item in agents.iter_mut() {
        if is_worker(item) {
            continue;
        }
        let mut fields = item.agent_fields();
        if !ACTIVE_AGENT_STATES.contains(&fields.agent_state.as_str()) {
            continue;
        }
        let Some(age) = silence(item, now) else {
            continue;
        };
        if age <= timeout {
            continue;
        }

        let note = format!(
            "Marked dead by warden: no update for {} while {}.",
            format_age(age),
            fields.agent_state
        );
        AGENT_STATE_DEAD.clone_into(&mut fields.agent_state);
        let update = WorkUpdate {
            description: Some(fields.to_description(Some(&note))),
            agent_state: Some(AGENT_STATE_DEAD.to_owned()),
        };
        if let Err(err) = ctx.store.update(&item.id, &update).await {
            warn!(agent = %item.id, %err, "failed to mark agent dead");
            continue;
        }

        warn!(agent = %item.id, age = %format_age(age), "agent silent, marked dead");
        ctx.record(
            audit_entry(AuditEventType::AgentMarkedDead, item)
                .with_heartbeat_age(age)
                .with_detail(note),
        );
        if let Some(description) = update.description {
            item.description = description;
        }
        AGENT_STATE_DEAD.clone_into(&mut item.agent_state);
        marked.push(item.id.clone());
    }
    marked
}

/// Report workers in `projects` that hold work without recent updates.
pub async fn sweep_stalled_assignments(
    ctx: &Collaborators,
    agents: &[WorkItem],
    projects: &[String],
    timeout: Duration,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut stalled = Vec::new();
    for project in projects {
        for item in agents.iter().filter(|item| is_worker(item)) {
            if project_of(item).as_deref() != Some(project.as_str()) {
                continue;
            }
            let fields = item.agent_fields();
            if fields.current_work.is_empty()
                || !ACTIVE_AGENT_STATES.contains(&fields.agent_state.as_str())
            {
                continue;
            }
            let Some(age) = silence(item, now) else {
                continue;
            };
            if age <= timeout {
                continue;
            }

            let subject = format!("STALLED_ASSIGNMENT: {} stuck for {}", item.id, format_age(age));
            let body = format!(
                "Agent {} has been {} on {} with no update for {}.\n\
                 Check the session and reassign the work if it is not progressing.",
                item.id,
                fields.agent_state,
                fields.current_work,
                format_age(age)
            );
            if notify_monitor(ctx, project, &subject, &body).await {
                ctx.record(
                    audit_entry(AuditEventType::StalledAssignment, item)
                        .with_heartbeat_age(age)
                        .with_detail(format!("work {}", fields.current_work)),
                );
                stalled.push(item.id.clone());
            }
        }
    }
    stalled
}

/// Report dead agents that still hold work.
pub async fn sweep_orphaned_work(ctx: &Collaborators, agents: &[WorkItem]) -> Vec<String> {
    let mut orphaned = Vec::new();
    for item in agents {
        let fields = item.agent_fields();
        if fields.agent_state != AGENT_STATE_DEAD || fields.current_work.is_empty() {
            continue;
        }

        let Some(project) = project_of(item) else {
            warn!(agent = %item.id, work = %fields.current_work, "town agent is dead with assigned work");
            continue;
        };

        let subject = format!("ORPHANED_WORK: {} has assigned work but is dead", item.id);
        let body = format!(
            "Agent {} is dead but still assigned {}.\n\
             Reassign the work or respawn the agent.",
            item.id, fields.current_work
        );
        if notify_monitor(ctx, &project, &subject, &body).await {
            ctx.record(
                audit_entry(AuditEventType::OrphanedWork, item)
                    .with_detail(format!("work {}", fields.current_work)),
            );
            orphaned.push(item.id.clone());
        }
    }
    orphaned
}

async fn notify_monitor(ctx: &Collaborators, project: &str, subject: &str, body: &str) -> bool {
    let monitor = match AgentIdentity::monitor(project) {
        Ok(identity) => identity.address(),
        Err(err) => {
            warn!(project, %err, "cannot address project monitor");
            return false;
        }
    };
    match ctx.mailbox.send(&monitor, subject, body).await {
        Ok(()) => {
            debug!(to = %monitor, subject, "notified monitor");
            true
        }
        Err(err) => {
            warn!(to = %monitor, subject, %err, "failed to notify monitor");
            false
        }
    }
}

fn silence(item: &WorkItem, now: DateTime<Utc>) -> Option<Duration> {
    item.updated_at_time().map(|at| elapsed_between(at, now))
}

fn identity_of(item: &WorkItem) -> Option<AgentIdentity> {
    AgentIdentity::parse_ticket_id(&item.id).ok()
}

fn role_of(item: &WorkItem) -> Option<RoleType> {
    identity_of(item)
        .map(|identity| identity.role())
        .or_else(|| RoleType::parse(&item.agent_fields().role_type))
}

fn project_of(item: &WorkItem) -> Option<String> {
    identity_of(item)
        .and_then(|identity| identity.project().map(str::to_owned))
        .or_else(|| {
            let project = item.agent_fields().project;
            (!project.is_empty()).then_some(project)
        })
}

fn is_worker(item: &WorkItem) -> bool {
    matches!(
        role_of(item),
        Some(RoleType::PersistentWorker | RoleType::TransientWorker)
    )
}

fn audit_entry(event_type: AuditEventType, item: &WorkItem) -> AuditEntry {
    match identity_of(item) {
        Some(identity) => AuditEntry::new(event_type).with_agent(&identity),
        None => AuditEntry::new(event_type).with_session(item.id.clone()),
    }
}
