//! External collaborator interfaces and their process-backed adapters.
//!
//! The supervisor never talks to tmux, the work-item store, or the mailbox
//! directly. Every call goes through one of the traits below so the
//! heartbeat, lifecycle processor, sweeps, and convoy watcher can be driven
//! by in-memory fakes in tests.
//!
//! | Trait               | Adapter                  | Backing program        |
//! |---------------------|--------------------------|------------------------|
//! | [`SessionManager`]  | [`tmux::TmuxSessions`]   | `tmux`                 |
//! | [`WorkStore`]       | [`work_store::CliWorkStore`] | store CLI + store database |
//! | [`Mailbox`]         | [`mailbox::CliMailbox`]  | town CLI `mail`        |
//! | [`ChangeFeed`]      | [`activity_feed::ActivityFeed`] | store CLI `activity --follow` |
//! | [`CompletionCheck`] | [`completion::CliCompletionCheck`] | town CLI `convoy check` |

pub mod activity_feed;
pub mod command;
pub mod completion;
pub mod mailbox;
pub mod tmux;
pub mod work_store;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use futures_util::Stream;

use crate::models::mail::MailMessage;
use crate::models::work_item::{WorkFilter, WorkItem};
use crate::Result;

/// Boxed future returned by every collaborator call.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Stream of raw feed lines. Dropping it ends the subscription.
pub type FeedStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Terminal session manager. Commands only; no terminal I/O.
pub trait SessionManager: Send + Sync {
    /// Whether session `name` exists.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) if the
    /// multiplexer could not be queried.
    fn has_session(&self, name: &str) -> DriverFuture<'_, bool>;

    /// Create a detached session `name` starting in `work_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) on failure.
    fn new_session(&self, name: &str, work_dir: &Path) -> DriverFuture<'_, ()>;

    /// Kill session `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) on failure.
    fn kill_session(&self, name: &str) -> DriverFuture<'_, ()>;

    /// Kill session `name` and terminate the process groups running in it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) on failure.
    fn kill_session_with_processes(&self, name: &str) -> DriverFuture<'_, ()>;

    /// Type `keys` into session `name` followed by Enter.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) on failure.
    fn send_keys(&self, name: &str, keys: &str) -> DriverFuture<'_, ()>;

    /// Deliver `message` to the agent running in session `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) on failure.
    fn nudge_session(&self, name: &str, message: &str) -> DriverFuture<'_, ()>;

    /// Set `key=value` in session `name`'s environment.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) on failure.
    fn set_environment(&self, name: &str, key: &str, value: &str) -> DriverFuture<'_, ()>;
}

/// Fields changed by [`WorkStore::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkUpdate {
    /// New description.
    pub description: Option<String>,
    /// New agent state column value.
    pub agent_state: Option<String>,
}

/// Work-item store.
pub trait WorkStore: Send + Sync {
    /// Fetch one item.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`](crate::AppError::NotFound) if `id`
    /// does not exist and [`AppError::Store`](crate::AppError::Store) on
    /// any other failure.
    fn show(&self, id: &str) -> DriverFuture<'_, WorkItem>;

    /// List items matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`](crate::AppError::Store) on failure.
    fn list(&self, filter: &WorkFilter) -> DriverFuture<'_, Vec<WorkItem>>;

    /// Apply `update` to item `id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`](crate::AppError::Store) on failure.
    fn update(&self, id: &str, update: &WorkUpdate) -> DriverFuture<'_, ()>;

    /// Ids of aggregates holding a `tracks` link to `item_id`, whether the
    /// link stores the bare id or a namespaced `<source>:<id>` reference.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`](crate::AppError::Store) on failure.
    fn tracking_aggregates(&self, item_id: &str) -> DriverFuture<'_, Vec<String>>;
}

/// Agent mailbox.
pub trait Mailbox: Send + Sync {
    /// Messages addressed to `address`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Mail`](crate::AppError::Mail) on failure.
    fn inbox(&self, address: &str) -> DriverFuture<'_, Vec<MailMessage>>;

    /// Delete message `id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Mail`](crate::AppError::Mail) on failure.
    fn delete(&self, id: &str) -> DriverFuture<'_, ()>;

    /// Send a message.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Mail`](crate::AppError::Mail) on failure.
    fn send(&self, to: &str, subject: &str, body: &str) -> DriverFuture<'_, ()>;
}

/// Continuous change-event feed of the work-item store.
pub trait ChangeFeed: Send + Sync {
    /// Open a new subscription.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Feed`](crate::AppError::Feed) if the feed
    /// cannot be opened.
    fn subscribe(&self) -> DriverFuture<'_, FeedStream>;
}

/// Idempotent aggregate completion check.
///
/// Re-verifies that every item tracked by the aggregate is closed and, if
/// so, closes the aggregate. Calling it on an incomplete or already-closed
/// aggregate changes nothing.
pub trait CompletionCheck: Send + Sync {
    /// Run the check for `aggregate_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`](crate::AppError::Store) on failure.
    fn check(&self, aggregate_id: &str) -> DriverFuture<'_, ()>;
}
