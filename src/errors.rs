//! Error types shared across the supervisor.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all supervisor failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Supervisor state could not be loaded or persisted.
    State(String),
    /// Terminal session manager command failed.
    Session(String),
    /// Work-item store query or update failed.
    Store(String),
    /// Mailbox read, delete, or send failed.
    Mail(String),
    /// Agent identity string did not match any known form.
    Identity(String),
    /// Lifecycle request rejected because the requester never staged it.
    Precondition(String),
    /// Change-event feed subscription failure.
    Feed(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::State(msg) => write!(f, "state: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
            Self::Store(msg) => write!(f, "store: {msg}"),
            Self::Mail(msg) => write!(f, "mail: {msg}"),
            Self::Identity(msg) => write!(f, "identity: {msg}"),
            Self::Precondition(msg) => write!(f, "precondition: {msg}"),
            Self::Feed(msg) => write!(f, "feed: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(format!("invalid json: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
