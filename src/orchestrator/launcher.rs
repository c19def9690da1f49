//! Role-resolved session creation.
//!
//! Used both for respawning dead patrol agents and for honoring restart
//! and cycle requests. Role overrides from `[roles.<role>]` win over the
//! built-in layout; string values may use `{town}`, `{project}`, `{name}`,
//! and `{role}` placeholders.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use tracing::{info, warn};

use crate::config::{GlobalConfig, RoleConfig};
use crate::driver::SessionManager;
use crate::models::identity::AgentIdentity;
use crate::Result;

/// Environment variable carrying the agent's address.
pub const ENV_ROLE: &str = "FLEET_ROLE";

/// Environment variable carrying the agent's session name.
pub const ENV_SESSION: &str = "FLEET_SESSION";

/// Environment variable carrying the town root.
pub const ENV_TOWN_ROOT: &str = "FLEET_TOWN_ROOT";

/// Sender name shown in startup beacons.
const BEACON_SENDER: &str = "warden";

/// Everything needed to start one agent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Session name.
    pub session: String,
    /// Working directory.
    pub work_dir: PathBuf,
    /// Startup command typed into the session (without environment prefix).
    pub command: String,
    /// Session environment, including the fixed `FLEET_*` variables.
    pub env: BTreeMap<String, String>,
}

impl LaunchPlan {
    /// Startup command with the environment exported inline, so the shell
    /// that is already running in the new session sees it.
    #[must_use]
    pub fn shell_command(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(key, value)| format!("{key}={}", shell_quote(value)))
            .collect();
        parts.push(self.command.clone());
        parts.join(" ")
    }
}

/// Builds and executes [`LaunchPlan`]s.
#[derive(Debug, Clone)]
pub struct SessionLauncher {
    town_root: PathBuf,
    default_command: String,
    roles: HashMap<String, RoleConfig>,
}

impl SessionLauncher {
    /// Launcher using the town root, default command, and role overrides from `config`.
    #[must_use]
    pub fn new(config: &GlobalConfig) -> Self {
        Self {
            town_root: config.town_root.clone(),
            default_command: config.commands.agent_runtime.clone(),
            roles: config.roles.clone(),
        }
    }

    /// Resolve the session layout for `identity`.
    #[must_use]
    pub fn plan(&self, identity: &AgentIdentity) -> LaunchPlan {
        let role = self.roles.get(identity.role().as_str());

        let work_dir = role
            .and_then(|r| r.work_dir.as_deref())
            .map_or_else(
                || identity.work_dir(&self.town_root),
                |pattern| PathBuf::from(expand_pattern(pattern, &self.town_root, identity)),
            );
        let command = role
            .and_then(|r| r.start_command.as_deref())
            .map_or_else(
                || self.default_command.clone(),
                |pattern| expand_pattern(pattern, &self.town_root, identity),
            );

        let mut env = BTreeMap::new();
        env.insert(ENV_ROLE.to_owned(), identity.address());
        env.insert(ENV_SESSION.to_owned(), identity.session_name());
        env.insert(
            ENV_TOWN_ROOT.to_owned(),
            self.town_root.to_string_lossy().into_owned(),
        );
        if let Some(role) = role {
            for (key, pattern) in &role.env {
                env.insert(key.clone(), expand_pattern(pattern, &self.town_root, identity));
            }
        }

        LaunchPlan {
            session: identity.session_name(),
            work_dir,
            command,
            env,
        }
    }

    /// Create the session for `identity`, start its agent, and send the
    /// startup beacon tagged with `topic`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if the session cannot be created or the
    /// startup command cannot be sent. Environment and beacon failures are
    /// logged only.
    pub async fn launch(
        &self,
        sessions: &dyn SessionManager,
        identity: &AgentIdentity,
        topic: &str,
    ) -> Result<LaunchPlan> {
        let plan = self.plan(identity);
        sessions.new_session(&plan.session, &plan.work_dir).await?;

        for (key, value) in &plan.env {
            if let Err(err) = sessions.set_environment(&plan.session, key, value).await {
                warn!(session = %plan.session, key, %err, "failed to set session environment");
            }
        }

        sessions.send_keys(&plan.session, &plan.shell_command()).await?;

        let beacon = startup_beacon(identity, topic, Local::now().naive_local());
        if let Err(err) = sessions.nudge_session(&plan.session, &beacon).await {
            warn!(session = %plan.session, %err, "failed to send startup beacon");
        }

        info!(session = %plan.session, work_dir = %plan.work_dir.display(), topic, "agent session started");
        Ok(plan)
    }
}

/// Replace `{town}`, `{project}`, `{name}`, and `{role}` in `pattern`.
#[must_use]
pub fn expand_pattern(pattern: &str, town_root: &Path, identity: &AgentIdentity) -> String {
    pattern
        .replace("{town}", &town_root.to_string_lossy())
        .replace("{project}", identity.project().unwrap_or_default())
        .replace("{name}", identity.name().unwrap_or_default())
        .replace("{role}", identity.role().as_str())
}

/// First message an agent sees in a fresh session.
///
/// `[FLEET] <address> <- warden • <YYYY-MM-DDTHH:MM> • <topic>` followed by
/// fallback instructions in case the agent's own startup hooks did not run.
#[must_use]
pub fn startup_beacon(identity: &AgentIdentity, topic: &str, at: NaiveDateTime) -> String {
    format!(
        "[FLEET] {} <- {BEACON_SENDER} • {} • {topic}\n\n\
         Load your role context, then check your assigned work and mail.",
        identity.address(),
        at.format("%Y-%m-%dT%H:%M"),
    )
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
