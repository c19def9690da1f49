//! Global configuration parsing and validation.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::identity::{AgentIdentity, RoleType};
use crate::{AppError, Result};

/// Which patrol agents the heartbeat keeps alive.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PatrolConfig {
    /// Health-orchestrator patrol.
    #[serde(default = "default_true")]
    pub orchestrator: bool,
    /// Per-project monitor patrols.
    #[serde(default = "default_true")]
    pub monitor: bool,
    /// Per-project merge-processor patrols.
    #[serde(default = "default_true")]
    pub merge_processor: bool,
}

impl Default for PatrolConfig {
    fn default() -> Self {
        Self {
            orchestrator: true,
            monitor: true,
            merge_processor: true,
        }
    }
}

/// Fixed timeouts driving remediation and sweeps.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ThresholdConfig {
    /// Heartbeat age past which a stuck agent is killed instead of nudged.
    #[serde(default = "default_critical_stuck")]
    pub critical_stuck_seconds: u64,
    /// Silence after which a self-reported running agent is marked dead.
    #[serde(default = "default_dead_agent_timeout")]
    pub dead_agent_timeout_seconds: u64,
    /// Silence after which an agent holding work is reported as stalled.
    #[serde(default = "default_stalled_assignment_timeout")]
    pub stalled_assignment_timeout_seconds: u64,
    /// Lifecycle requests older than this are discarded unexecuted.
    #[serde(default = "default_lifecycle_max_age")]
    pub lifecycle_max_age_seconds: u64,
    /// Pause between killing a session and recreating it.
    #[serde(default = "default_restart_pause")]
    pub restart_pause_millis: u64,
    /// Backoff before resubscribing to a failed change feed.
    #[serde(default = "default_feed_backoff")]
    pub feed_backoff_seconds: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            critical_stuck_seconds: default_critical_stuck(),
            dead_agent_timeout_seconds: default_dead_agent_timeout(),
            stalled_assignment_timeout_seconds: default_stalled_assignment_timeout(),
            lifecycle_max_age_seconds: default_lifecycle_max_age(),
            restart_pause_millis: default_restart_pause(),
            feed_backoff_seconds: default_feed_backoff(),
        }
    }
}

/// External programs the supervisor shells out to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommandConfig {
    /// Terminal multiplexer binary.
    #[serde(default = "default_terminal")]
    pub terminal: String,
    /// Work-item store CLI.
    #[serde(default = "default_store")]
    pub store: String,
    /// Town CLI providing `mail` and `convoy check`.
    #[serde(default = "default_town_cli")]
    pub town: String,
    /// Store database file; defaults to `<town_root>/.store/store.db`.
    #[serde(default)]
    pub store_database: Option<PathBuf>,
    /// Command typed into new agent sessions when no role override exists.
    #[serde(default = "default_agent_runtime")]
    pub agent_runtime: String,
    /// Upper bound on any single external command.
    #[serde(default = "default_command_timeout")]
    pub timeout_seconds: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            terminal: default_terminal(),
            store: default_store(),
            town: default_town_cli(),
            store_database: None,
            agent_runtime: default_agent_runtime(),
            timeout_seconds: default_command_timeout(),
        }
    }
}

/// Convoy completion detection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ConvoyConfig {
    /// Run the streaming watcher alongside the heartbeat.
    #[serde(default = "default_true")]
    pub watch: bool,
    /// Also check every open convoy on each heartbeat tick.
    #[serde(default = "default_true")]
    pub poll_on_heartbeat: bool,
}

impl Default for ConvoyConfig {
    fn default() -> Self {
        Self {
            watch: true,
            poll_on_heartbeat: true,
        }
    }
}

/// Per-role session overrides.
///
/// String values may use `{town}`, `{project}`, `{name}`, and `{role}`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RoleConfig {
    /// Working directory pattern.
    #[serde(default)]
    pub work_dir: Option<String>,
    /// Startup command pattern.
    #[serde(default)]
    pub start_command: Option<String>,
    /// Extra session environment; values are patterns.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval() -> u64 {
    300
}

fn default_critical_stuck() -> u64 {
    30 * 60
}

fn default_dead_agent_timeout() -> u64 {
    15 * 60
}

fn default_stalled_assignment_timeout() -> u64 {
    30 * 60
}

fn default_lifecycle_max_age() -> u64 {
    6 * 60 * 60
}

fn default_restart_pause() -> u64 {
    500
}

fn default_feed_backoff() -> u64 {
    5
}

fn default_terminal() -> String {
    "tmux".into()
}

fn default_store() -> String {
    "bd".into()
}

fn default_town_cli() -> String {
    "gt".into()
}

fn default_agent_runtime() -> String {
    "claude".into()
}

fn default_command_timeout() -> u64 {
    30
}

/// Global configuration parsed from `warden.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Root directory of the town all agents live under.
    pub town_root: PathBuf,
    /// Seconds between heartbeat ticks.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Project scopes whose patrol agents are supervised.
    #[serde(default)]
    pub projects: Vec<String>,
    /// Patrol enablement.
    #[serde(default)]
    pub patrols: PatrolConfig,
    /// Remediation and sweep timeouts.
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    /// External programs.
    #[serde(default)]
    pub commands: CommandConfig,
    /// Convoy completion detection.
    #[serde(default)]
    pub convoy: ConvoyConfig,
    /// Session overrides keyed by role name (`monitor`, `merge-processor`, ...).
    #[serde(default)]
    pub roles: HashMap<String, RoleConfig>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the town root and re-validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the new root does not exist.
    pub fn override_town_root(&mut self, town_root: PathBuf) -> Result<()> {
        self.town_root = town_root;
        self.validate()
    }

    /// Interval between heartbeat ticks.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Path of the supervisor state file.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.town_root.join("warden").join("state.json")
    }

    /// Directory for observability records.
    #[must_use]
    pub fn audit_dir(&self) -> PathBuf {
        self.town_root.join("warden").join("logs")
    }

    /// Store database used for tracking-link queries.
    #[must_use]
    pub fn store_database_path(&self) -> PathBuf {
        self.commands
            .store_database
            .clone()
            .unwrap_or_else(|| self.town_root.join(".store").join("store.db"))
    }

    /// Session override for `role`, if configured.
    #[must_use]
    pub fn role(&self, role: RoleType) -> Option<&RoleConfig> {
        self.roles.get(role.as_str())
    }

    /// Patrol agents the heartbeat supervises, in check order.
    #[must_use]
    pub fn patrol_agents(&self) -> Vec<AgentIdentity> {
        let mut agents = Vec::new();
        if self.patrols.orchestrator {
            agents.push(AgentIdentity::HealthOrchestrator);
        }
        for project in &self.projects {
            if self.patrols.monitor {
                agents.push(AgentIdentity::Monitor {
                    project: project.clone(),
                });
            }
            if self.patrols.merge_processor {
                agents.push(AgentIdentity::MergeProcessor {
                    project: project.clone(),
                });
            }
        }
        agents
    }

    fn validate(&mut self) -> Result<()> {
        if self.heartbeat_interval_seconds == 0 {
            return Err(AppError::Config(
                "heartbeat_interval_seconds must be greater than zero".into(),
            ));
        }

        for project in &self.projects {
            AgentIdentity::monitor(project)
                .map_err(|err| AppError::Config(format!("projects: {err}")))?;
        }

        if let Some(unknown) = self.roles.keys().find(|key| RoleType::parse(key).is_none()) {
            return Err(AppError::Config(format!("roles: unknown role {unknown:?}")));
        }

        let canonical_root = self
            .town_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("town_root invalid: {err}")))?;
        self.town_root = canonical_root;

        Ok(())
    }
}
