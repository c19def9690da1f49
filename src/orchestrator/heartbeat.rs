//! Heartbeat supervisor.
//!
//! One [`Supervisor`] owns the persisted [`SupervisorState`] and runs a
//! tick on a fixed interval. A tick checks the health of every patrol
//! agent, processes lifecycle requests, runs the sweeps, optionally polls
//! open convoys, and then persists state. Ticks never overlap and a stop
//! request is only honored between ticks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::convoy_watcher::check_open_aggregates;
use super::health_evaluator::{evaluate, probe_failed};
use super::launcher::SessionLauncher;
use super::lifecycle_processor::LifecycleProcessor;
use super::remediation::{remediate_stuck, RemediationAction};
use super::respawn::trigger_satisfied;
use super::sweeps::{run_sweeps, SweepReport, SweepThresholds};
use super::{elapsed_between, format_age, Collaborators};
use crate::audit::{AuditEntry, AuditEventType};
use crate::config::GlobalConfig;
use crate::driver::SessionManager;
use crate::models::health::{HealthCheckResult, HealthProbe, HealthStatus};
use crate::models::identity::AgentIdentity;
use crate::models::lifecycle::LifecycleOutcome;
use crate::models::policy::RespawnPolicy;
use crate::models::state::{SupervisorState, EXIT_REASON_CRASH};
use crate::persistence::state_store::{is_process_alive, StateStore};
use crate::{AppError, Result};

/// Topic carried by the startup beacon of a respawned session.
const RESPAWN_TOPIC: &str = "respawn";

/// What one tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Health of each patrol agent, in check order.
    pub health: Vec<(AgentIdentity, HealthCheckResult)>,
    /// Lifecycle outcomes, in inbox order.
    pub lifecycle: Vec<LifecycleOutcome>,
    /// Sweep findings.
    pub sweeps: SweepReport,
    /// Number of convoy completion checks run by the poll.
    pub convoys_checked: usize,
}

/// Owns supervisor state and drives the heartbeat loop.
pub struct Supervisor {
    config: Arc<GlobalConfig>,
    ctx: Collaborators,
    launcher: Arc<SessionLauncher>,
    lifecycle: LifecycleProcessor,
    store: StateStore,
    state: SupervisorState,
    /// In-process record of when each session was first seen dead.
    death_seen: HashMap<AgentIdentity, Instant>,
}

impl Supervisor {
    /// Build a supervisor persisting to `config.state_path()`.
    ///
    /// State is not read until [`start`](Self::start).
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, ctx: Collaborators) -> Self {
        let launcher = Arc::new(SessionLauncher::new(&config));
        let lifecycle = LifecycleProcessor::new(
            ctx.clone(),
            Arc::clone(&launcher),
            config.town_root.clone(),
            Duration::from_secs(config.thresholds.lifecycle_max_age_seconds),
            Duration::from_millis(config.thresholds.restart_pause_millis),
        );
        let store = StateStore::new(config.state_path());
        Self {
            config,
            ctx,
            launcher,
            lifecycle,
            store,
            state: SupervisorState::default(),
            death_seen: HashMap::new(),
        }
    }

    /// Current in-memory state.
    #[must_use]
    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// Load persisted state and claim it for this process.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if the state cannot be loaded or saved, or
    /// if another live supervisor process already claims it.
    pub fn start(&mut self) -> Result<()> {
        let mut state = self.store.load()?;
        let pid = std::process::id();
        if state.running && state.pid != pid && is_process_alive(state.pid) {
            return Err(AppError::State(format!(
                "supervisor already running (pid {})",
                state.pid
            )));
        }

        state.running = true;
        state.pid = pid;
        state.started_at = Some(Utc::now());
        self.store.save(&state)?;
        self.state = state;

        info!(pid, path = %self.store.path().display(), "supervisor started");
        Ok(())
    }

    /// Mark the supervisor stopped and persist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if the state cannot be saved.
    pub fn stop(&mut self) -> Result<()> {
        self.state.running = false;
        self.store.save(&self.state)?;
        info!(heartbeats = self.state.heartbeat_count, "supervisor stopped");
        Ok(())
    }

    /// Tick until `cancel` fires, then [`stop`](Self::stop).
    ///
    /// The first tick runs immediately. Cancellation is observed between
    /// ticks; a tick in progress always completes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if state cannot be persisted.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("heartbeat loop shutting down");
                    break Ok(());
                }
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(%err, "heartbeat tick failed");
                        break Err(err);
                    }
                }
            }
        };

        let stopped = self.stop();
        outcome.and(stopped)
    }

    /// Run one heartbeat tick.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if state cannot be persisted. Every other
    /// failure is logged and the tick carries on.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let span = info_span!("heartbeat_tick", count = self.state.heartbeat_count + 1);
        self.run_tick().instrument(span).await
    }

    async fn run_tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();

        for identity in self.config.patrol_agents() {
            let result = self.check_agent(&identity).await;
            report.health.push((identity, result));
        }

        match self.lifecycle.process_inbox(&mut self.state).await {
            Ok(outcomes) => report.lifecycle = outcomes,
            Err(err) => warn!(%err, "failed to read lifecycle requests"),
        }

        match run_sweeps(
            &self.ctx,
            &self.config.projects,
            SweepThresholds::from_config(&self.config),
            Utc::now(),
        )
        .await
        {
            Ok(sweeps) => report.sweeps = sweeps,
            Err(err) => warn!(%err, "sweeps skipped"),
        }

        if self.config.convoy.poll_on_heartbeat {
            match check_open_aggregates(self.ctx.store.as_ref(), self.ctx.completion.as_ref()).await
            {
                Ok(checked) => report.convoys_checked = checked,
                Err(err) => warn!(%err, "convoy poll skipped"),
            }
        }

        self.state.last_heartbeat = Some(Utc::now());
        self.state.heartbeat_count += 1;
        self.store.save(&self.state)?;

        debug!(
            agents = report.health.len(),
            lifecycle = report.lifecycle.len(),
            "heartbeat tick complete"
        );
        Ok(report)
    }

    /// Probe, classify, and act on one agent.
    pub async fn check_agent(&mut self, identity: &AgentIdentity) -> HealthCheckResult {
        let session = identity.session_name();
        let policy = RespawnPolicy::for_role(identity.role());

        let alive = match self.ctx.sessions.has_session(&session).await {
            Ok(alive) => alive,
            Err(err) => {
                warn!(session, %err, "session probe failed");
                return probe_failed(&err);
            }
        };

        let now = Utc::now();
        let last_heartbeat = self.heartbeat(identity).await;
        let time_since_death = if alive {
            None
        } else {
            self.time_since_death(identity, now)
        };
        let probe = HealthProbe {
            session_alive: alive,
            last_heartbeat,
            heartbeat_age: last_heartbeat
                .map(|at| elapsed_between(at, now))
                .unwrap_or_default(),
            time_since_death,
        };
        let result = evaluate(&probe, &policy);

        if alive {
            self.record_alive(identity);
        } else {
            self.record_death(identity, time_since_death, now);
        }

        match result.status {
            HealthStatus::Healthy => {
                debug!(session, message = %result.message, "agent healthy");
                if alive {
                    if let Some(agent) = self.state.agents.get_mut(&identity.address()) {
                        agent.last_nudged_at = None;
                    }
                }
            }
            HealthStatus::WaitingRespawn => {
                debug!(session, message = %result.message, "waiting to respawn");
            }
            HealthStatus::Stuck => {
                let critical = Duration::from_secs(self.config.thresholds.critical_stuck_seconds);
                if let Ok(RemediationAction::Kill) =
                    remediate_stuck(&self.ctx, &mut self.state, identity, &result, critical).await
                {
                    self.death_seen.insert(identity.clone(), Instant::now());
                }
            }
            HealthStatus::NeedsRespawn => {
                info!(session, message = %result.message, "agent needs respawn");
                self.respawn(identity, &policy, now).await;
            }
        }

        result
    }

    /// Heartbeat from the store's `last_activity` label, else the persisted
    /// patrol completion. A store heartbeat is persisted.
    ///
    /// Never earlier than the supervisor's last launch of the session.
    async fn heartbeat(&mut self, identity: &AgentIdentity) -> Option<DateTime<Utc>> {
        let from_store = match self.ctx.store.show(&identity.ticket_id()).await {
            Ok(item) => item.last_activity(),
            Err(err) => {
                debug!(agent = %identity, %err, "no agent record heartbeat");
                None
            }
        };
        let observed = match from_store {
            Some(at) => {
                self.state.update_patrol_completed(identity, at);
                Some(at)
            }
            None => self
                .state
                .agent(identity)
                .and_then(|agent| agent.last_patrol_completed),
        };
        let launched_at = self.state.agent(identity).and_then(|agent| agent.launched_at);
        // None orders below Some, so this is the later of the two when both exist.
        observed.max(launched_at)
    }

    fn time_since_death(&self, identity: &AgentIdentity, now: DateTime<Utc>) -> Option<Duration> {
        self.death_seen.get(identity).map(Instant::elapsed).or_else(|| {
            self.state
                .agent(identity)
                .and_then(|agent| agent.last_exited_at)
                .map(|at| elapsed_between(at, now))
        })
    }

    fn record_alive(&mut self, identity: &AgentIdentity) {
        self.death_seen.remove(identity);
        let has_bookkeeping = self.state.agent(identity).is_some_and(|agent| {
            agent.respawn_scheduled_at.is_some() || agent.last_exited_at.is_some()
        });
        if has_bookkeeping {
            self.state.clear_respawn(identity);
        }
    }

    fn record_death(
        &mut self,
        identity: &AgentIdentity,
        time_since_death: Option<Duration>,
        now: DateTime<Utc>,
    ) {
        // Back-date so a death recovered from disk keeps its original age.
        let seen_at = time_since_death
            .and_then(|age| Instant::now().checked_sub(age))
            .unwrap_or_else(Instant::now);
        self.death_seen.entry(identity.clone()).or_insert(seen_at);

        let agent = self.state.agent_mut(identity);
        if agent.last_exited_at.is_none() {
            agent.last_exited_at = Some(now);
            warn!(session = %agent.session, "agent session found dead");
        }
        if agent.exit_reason.is_empty() {
            EXIT_REASON_CRASH.clone_into(&mut agent.exit_reason);
        }
    }

    async fn respawn(&mut self, identity: &AgentIdentity, policy: &RespawnPolicy, now: DateTime<Utc>) {
        match trigger_satisfied(self.ctx.store.as_ref(), identity, policy.trigger).await {
            Ok(true) => {}
            Ok(false) => {
                info!(agent = %identity, trigger = ?policy.trigger, "respawn deferred, nothing to do");
                self.ctx.record(
                    AuditEntry::new(AuditEventType::RespawnDeferred)
                        .with_agent(identity)
                        .with_detail(format!("trigger {:?} not satisfied", policy.trigger)),
                );
                return;
            }
            Err(err) => {
                warn!(agent = %identity, %err, "could not evaluate respawn trigger");
                return;
            }
        }

        let reason = self
            .state
            .agent(identity)
            .map(|agent| agent.exit_reason.clone())
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| EXIT_REASON_CRASH.to_owned());

        match self
            .launcher
            .launch(self.ctx.sessions.as_ref(), identity, RESPAWN_TOPIC)
            .await
        {
            Ok(plan) => {
                self.state.record_launch(identity, Utc::now());
                self.death_seen.remove(identity);
                info!(session = %plan.session, reason, "agent respawned");
                self.ctx.record(
                    AuditEntry::new(AuditEventType::AgentRespawned)
                        .with_agent(identity)
                        .with_action(RESPAWN_TOPIC)
                        .with_detail(format!("previous exit: {reason}")),
                );
            }
            Err(err) => {
                error!(agent = %identity, %err, "respawn failed");
                self.state.schedule_respawn(identity, &reason, now);
            }
        }
    }
}

/// Kill the live sessions of `agents` together with their processes.
///
/// The next heartbeat tick finds them dead and respawns them. Returns the
/// sessions that were killed; agents without a live session are skipped.
pub async fn restart_patrols(sessions: &dyn SessionManager, agents: &[AgentIdentity]) -> Vec<String> {
    let mut killed = Vec::new();
    for identity in agents {
        let session = identity.session_name();
        match sessions.has_session(&session).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(session, "patrol not running");
                continue;
            }
            Err(err) => {
                warn!(session, %err, "session probe failed");
                continue;
            }
        }
        match sessions.kill_session_with_processes(&session).await {
            Ok(()) => {
                info!(session, "patrol session killed");
                killed.push(session);
            }
            Err(err) => warn!(session, %err, "failed to kill patrol session"),
        }
    }
    killed
}

/// Human summary of `state` for the `status` subcommand.
#[must_use]
pub fn describe_state(state: &SupervisorState, now: DateTime<Utc>) -> String {
    let mut lines = vec![format!(
        "running: {} (pid {})",
        state.running && is_process_alive(state.pid),
        state.pid
    )];
    if let Some(at) = state.last_heartbeat {
        lines.push(format!(
            "last heartbeat: {} ago (#{})",
            format_age(elapsed_between(at, now)),
            state.heartbeat_count
        ));
    }
    for (address, agent) in &state.agents {
        let mut line = format!("{address} [{}]", agent.session);
        if let Some(at) = agent.last_exited_at {
            line.push_str(&format!(
                " dead {} ({})",
                format_age(elapsed_between(at, now)),
                if agent.exit_reason.is_empty() { "unknown" } else { &agent.exit_reason }
            ));
        }
        if agent.last_nudged_at.is_some() {
            line.push_str(" nudged");
        }
        lines.push(line);
    }
    lines.join("\n")
}
