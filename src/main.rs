#![forbid(unsafe_code)]

//! `fleet-warden` agent fleet supervisor binary.
//!
//! Loads configuration, wires the tmux, store, and mail adapters, and runs
//! the heartbeat supervisor alongside the convoy watcher until SIGINT or
//! SIGTERM. One-shot subcommands report status, restart patrols, and clean
//! up lifecycle leftovers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use fleet_warden::audit::{AuditLogger, JsonlAuditWriter};
use fleet_warden::driver::activity_feed::ActivityFeed;
use fleet_warden::driver::command::Cli as CommandLine;
use fleet_warden::driver::completion::CliCompletionCheck;
use fleet_warden::driver::mailbox::CliMailbox;
use fleet_warden::driver::tmux::TmuxSessions;
use fleet_warden::driver::work_store::{open_store_database, CliWorkStore};
use fleet_warden::models::identity::AgentIdentity;
use fleet_warden::orchestrator::convoy_watcher::ConvoyWatcher;
use fleet_warden::orchestrator::heartbeat::{describe_state, restart_patrols, Supervisor};
use fleet_warden::orchestrator::{hygiene, Collaborators};
use fleet_warden::persistence::state_store::StateStore;
use fleet_warden::{AppError, GlobalConfig, Result};

/// Audit entries shown by `status`.
const RECENT_ACTIONS: usize = 10;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "fleet-warden", about = "Agent fleet supervisor", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "warden.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the town root from the configuration file.
    #[arg(long, global = true)]
    town_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the supervisor in the foreground.
    Run,
    /// Print the persisted supervisor state.
    Status,
    /// Kill running patrol sessions so the next heartbeat respawns them.
    RestartPatrols {
        /// Only restart patrols of this project.
        #[arg(long, conflicts_with = "orchestrator_only")]
        project: Option<String>,
        /// Only restart the health orchestrator.
        #[arg(long)]
        orchestrator_only: bool,
    },
    /// Report lifecycle messages and staging flags left behind.
    Hygiene {
        /// Delete the messages and clear the flags.
        #[arg(long)]
        fix: bool,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(town_root) = args.town_root {
        config.override_town_root(town_root)?;
    }
    info!(town_root = %config.town_root.display(), "configuration loaded");

    match args.command {
        Command::Run => serve(Arc::new(config)).await,
        Command::Status => {
            let now = Utc::now();
            let state = StateStore::new(config.state_path()).load()?;
            println!("{}", describe_state(&state, now));
            let today = JsonlAuditWriter::read_day(&config.audit_dir(), now.date_naive())?;
            if !today.is_empty() {
                println!("\nrecent actions ({} today):", today.len());
                for entry in &today[today.len().saturating_sub(RECENT_ACTIONS)..] {
                    println!("  {entry}");
                }
            }
            Ok(())
        }
        Command::RestartPatrols {
            project,
            orchestrator_only,
        } => {
            let agents: Vec<AgentIdentity> = config
                .patrol_agents()
                .into_iter()
                .filter(|agent| {
                    if orchestrator_only {
                        return *agent == AgentIdentity::HealthOrchestrator;
                    }
                    project
                        .as_deref()
                        .is_none_or(|project| agent.project() == Some(project))
                })
                .collect();
            let ctx = build_collaborators(&config, None);
            let killed = restart_patrols(ctx.sessions.as_ref(), &agents).await;
            println!("killed {} patrol session(s): {}", killed.len(), killed.join(", "));
            Ok(())
        }
        Command::Hygiene { fix } => {
            let ctx = build_collaborators(&config, None);
            let report =
                hygiene::scan(&config, ctx.sessions.as_ref(), ctx.mailbox.as_ref()).await?;
            if report.is_clean() {
                println!("no lifecycle leftovers");
                return Ok(());
            }
            for message in &report.messages {
                println!("message {} from {}: {}", message.id, message.from, message.subject);
            }
            for staged in &report.staged {
                println!("{}: {}", staged.agent, staged.flags.join(", "));
            }
            if fix {
                let summary = hygiene::fix(&report, ctx.mailbox.as_ref()).await;
                println!(
                    "deleted {} message(s), cleared {} state file(s)",
                    summary.messages_deleted, summary.files_cleared
                );
            }
            Ok(())
        }
    }
}

async fn serve(config: Arc<GlobalConfig>) -> Result<()> {
    let audit: Arc<dyn AuditLogger> = Arc::new(JsonlAuditWriter::new(config.audit_dir())?);
    let ctx = build_collaborators(&config, Some(audit));

    let mut supervisor = Supervisor::new(Arc::clone(&config), ctx.clone());
    supervisor.start()?;

    let ct = CancellationToken::new();

    let watcher_handle = config.convoy.watch.then(|| {
        let feed = Arc::new(ActivityFeed::new(
            config.commands.store.clone(),
            &config.town_root,
        ));
        let watcher = ConvoyWatcher::new(
            feed,
            Arc::clone(&ctx.store),
            Arc::clone(&ctx.completion),
            Duration::from_secs(config.thresholds.feed_backoff_seconds),
        );
        info!("convoy watcher starting");
        watcher.spawn(ct.clone())
    });

    let signal_ct = ct.clone();
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    info!(
        interval_secs = config.heartbeat_interval_seconds,
        projects = config.projects.len(),
        "fleet-warden running"
    );
    let outcome = supervisor.run(ct.clone()).await;
    if let Err(ref err) = outcome {
        error!(%err, "supervisor stopped with error");
    }

    ct.cancel();
    signal_handle.abort();
    if let Some(handle) = watcher_handle {
        if let Err(err) = handle.await {
            warn!(%err, "convoy watcher task failed");
        }
    }
    info!("fleet-warden shut down");

    outcome
}

fn build_collaborators(
    config: &GlobalConfig,
    audit: Option<Arc<dyn AuditLogger>>,
) -> Collaborators {
    let town = &config.town_root;
    let timeout = Duration::from_secs(config.commands.timeout_seconds);
    let store = CliWorkStore::new(
        CommandLine::new(config.commands.store.clone(), town, timeout),
        open_store_database(&config.store_database_path()),
    );

    Collaborators {
        sessions: Arc::new(TmuxSessions::new(CommandLine::new(
            config.commands.terminal.clone(),
            town,
            timeout,
        ))),
        store: Arc::new(store),
        mailbox: Arc::new(CliMailbox::new(CommandLine::new(
            config.commands.town.clone(),
            town,
            timeout,
        ))),
        completion: Arc::new(CliCompletionCheck::new(CommandLine::new(
            config.commands.town.clone(),
            town,
            timeout,
        ))),
        audit,
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
