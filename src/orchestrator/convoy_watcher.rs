//! Convoy completion detection.
//!
//! Two independent entry points invoke the same idempotent completion
//! check: the streaming [`ConvoyWatcher`], which reacts to closure events
//! on the store's change feed, and [`check_open_aggregates`], which the
//! heartbeat runs as a poll. They share no mutable state; running the
//! check twice for the same convoy is harmless.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver::{ChangeFeed, CompletionCheck, WorkStore};
use crate::models::feed::ChangeEvent;
use crate::models::work_item::{WorkFilter, CONVOY_ITEM_TYPE};
use crate::Result;

/// Run the completion check for every open aggregate tracking `item_id`.
///
/// Aggregates that are already closed, or whose status cannot be read, are
/// skipped. Returns the number of checks invoked.
pub async fn check_aggregates_for_item(
    store: &dyn WorkStore,
    completion: &dyn CompletionCheck,
    item_id: &str,
) -> usize {
    let aggregates = match store.tracking_aggregates(item_id).await {
        Ok(ids) => ids,
        Err(err) => {
            warn!(item_id, %err, "failed to look up tracking convoys");
            return 0;
        }
    };

    let mut checked = 0;
    for aggregate in aggregates {
        match store.show(&aggregate).await {
            Ok(item) if item.is_closed() => {
                debug!(convoy = %aggregate, "convoy already closed");
                continue;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(convoy = %aggregate, %err, "failed to read convoy, skipping");
                continue;
            }
        }

        if let Err(err) = completion.check(&aggregate).await {
            warn!(convoy = %aggregate, item_id, %err, "convoy completion check failed");
        }
        checked += 1;
    }
    checked
}

/// Run the completion check for every open convoy in the store.
///
/// Returns the number of checks invoked.
///
/// # Errors
///
/// Returns `AppError::Store` if the open convoys cannot be listed.
/// Individual check failures are logged only.
pub async fn check_open_aggregates(
    store: &dyn WorkStore,
    completion: &dyn CompletionCheck,
) -> Result<usize> {
    let convoys = store.list(&WorkFilter::of_type(CONVOY_ITEM_TYPE).open()).await?;
    for convoy in &convoys {
        if let Err(err) = completion.check(&convoy.id).await {
            warn!(convoy = %convoy.id, %err, "convoy completion check failed");
        }
    }
    Ok(convoys.len())
}

/// Long-lived task reacting to item closures on the change feed.
pub struct ConvoyWatcher {
    feed: Arc<dyn ChangeFeed>,
    store: Arc<dyn WorkStore>,
    completion: Arc<dyn CompletionCheck>,
    backoff: Duration,
}

impl ConvoyWatcher {
    /// Watcher resubscribing after `backoff` whenever the feed fails or ends.
    #[must_use]
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        store: Arc<dyn WorkStore>,
        completion: Arc<dyn CompletionCheck>,
        backoff: Duration,
    ) -> Self {
        Self {
            feed,
            store,
            completion,
            backoff,
        }
    }

    /// Spawn [`run`](Self::run) as a background task.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Watch until `cancel` fires. Subscription failures are retried forever.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("convoy watcher started");
        loop {
            match self.feed.subscribe().await {
                Ok(mut stream) => {
                    debug!("subscribed to change feed");
                    loop {
                        tokio::select! {
                            () = cancel.cancelled() => {
                                info!("convoy watcher shutting down");
                                return;
                            }
                            next = stream.next() => match next {
                                Some(Ok(line)) => self.handle_line(&line).await,
                                Some(Err(err)) => {
                                    warn!(%err, "change feed read failed");
                                    break;
                                }
                                None => {
                                    warn!("change feed ended");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(err) => warn!(%err, "change feed subscription failed"),
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    info!("convoy watcher shutting down");
                    return;
                }
                () = tokio::time::sleep(self.backoff) => {
                    debug!(backoff_secs = self.backoff.as_secs(), "resubscribing to change feed");
                }
            }
        }
    }

    async fn handle_line(&self, line: &str) {
        let event = match ChangeEvent::parse_line(line) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(err) => {
                debug!(%err, "skipping feed record");
                return;
            }
        };
        if !event.is_closure() {
            return;
        }

        info!(item_id = %event.issue_id, "item closed, checking tracking convoys");
        check_aggregates_for_item(self.store.as_ref(), self.completion.as_ref(), &event.issue_id)
            .await;
    }
}
