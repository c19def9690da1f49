#![forbid(unsafe_code)]

//! Supervisor for a town of long-lived coding agents running in tmux.

pub mod audit;
pub mod config;
pub mod driver;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod persistence;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
