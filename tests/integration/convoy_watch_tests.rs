//! Integration tests for convoy completion detection.
//!
//! Covers the streaming watcher (closure events, malformed records,
//! resubscription, cancellation) and the heartbeat poll entry point.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use fleet_warden::driver::CompletionCheck;
use fleet_warden::models::work_item::{CONVOY_ITEM_TYPE, STATUS_CLOSED, STATUS_OPEN, TASK_ITEM_TYPE};
use fleet_warden::orchestrator::convoy_watcher::{
    check_aggregates_for_item, check_open_aggregates, ConvoyWatcher,
};
use fleet_warden::AppError;

use super::test_helpers::{item, FakeFeed, Fakes};

fn closure(id: &str) -> String {
    format!(r#"{{"type":"status","issue_id":"{id}","old_status":"open","new_status":"closed"}}"#)
}

/// X closed; C1 tracks X and closed Y; C2 tracks X and open Z.
fn two_convoys(fakes: &Fakes) {
    fakes.store.insert(item("X", TASK_ITEM_TYPE, STATUS_CLOSED));
    fakes.store.insert(item("Y", TASK_ITEM_TYPE, STATUS_CLOSED));
    fakes.store.insert(item("Z", TASK_ITEM_TYPE, STATUS_OPEN));
    fakes.store.insert(item("C1", CONVOY_ITEM_TYPE, STATUS_OPEN));
    fakes.store.insert(item("C2", CONVOY_ITEM_TYPE, STATUS_OPEN));
    fakes.store.track("C1", &["X", "Y"]);
    fakes.store.track("C2", &["X", "Z"]);
}

fn watcher(feed: Arc<FakeFeed>, fakes: &Fakes) -> ConvoyWatcher {
    ConvoyWatcher::new(
        feed,
        fakes.store.clone(),
        fakes.completion.clone(),
        Duration::from_millis(10),
    )
}

/// Poll until `done` holds or two seconds pass.
async fn wait_for(done: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

#[tokio::test]
async fn closure_checks_every_tracking_convoy() {
    let fakes = Fakes::new();
    two_convoys(&fakes);
    let feed = Arc::new(FakeFeed::with_scripts(vec![vec![Ok(closure("X"))]]));
    let cancel = CancellationToken::new();
    let handle = watcher(feed, &fakes).spawn(cancel.clone());

    wait_for(|| fakes.completion.checks().len() == 2).await;
    cancel.cancel();
    handle.await.expect("watcher exits cleanly");

    assert_eq!(fakes.completion.checks(), vec!["C1".to_owned(), "C2".to_owned()]);
    assert_eq!(fakes.completion.closed(), vec!["C1".to_owned()]);
    assert_eq!(fakes.store.item("C2").expect("C2").status, STATUS_OPEN);
}

#[tokio::test]
async fn closed_convoys_are_not_rechecked() {
    let fakes = Fakes::new();
    two_convoys(&fakes);

    let first = check_aggregates_for_item(fakes.store.as_ref(), fakes.completion.as_ref(), "X").await;
    let second = check_aggregates_for_item(fakes.store.as_ref(), fakes.completion.as_ref(), "X").await;

    assert_eq!(first, 2);
    assert_eq!(second, 1, "C1 is closed after the first pass");
    assert_eq!(fakes.completion.closed(), vec!["C1".to_owned()]);
}

#[tokio::test]
async fn completion_check_is_idempotent_on_closed_convoy() {
    let fakes = Fakes::new();
    two_convoys(&fakes);
    fakes.completion.check("C1").await.expect("first check");
    let after_first = fakes.store.item("C1");

    fakes.completion.check("C1").await.expect("second check");

    assert_eq!(fakes.store.item("C1"), after_first);
    assert_eq!(fakes.completion.closed().len(), 1);
}

#[tokio::test]
async fn malformed_and_unrelated_records_are_skipped() {
    let fakes = Fakes::new();
    two_convoys(&fakes);
    let script = vec![
        Ok("not json".to_owned()),
        Ok(String::new()),
        Ok(r#"{"type":"create","issue_id":"X"}"#.to_owned()),
        Ok(r#"{"type":"status","issue_id":"X","new_status":"in_progress"}"#.to_owned()),
        Ok(closure("X")),
    ];
    let feed = Arc::new(FakeFeed::with_scripts(vec![script]));
    let cancel = CancellationToken::new();
    let handle = watcher(feed, &fakes).spawn(cancel.clone());

    wait_for(|| fakes.completion.checks().len() == 2).await;
    cancel.cancel();
    handle.await.expect("watcher exits cleanly");

    assert_eq!(fakes.completion.checks().len(), 2);
}

#[tokio::test]
async fn feed_error_triggers_resubscribe() {
    let fakes = Fakes::new();
    two_convoys(&fakes);
    let feed = Arc::new(FakeFeed::with_scripts(vec![
        vec![Err(AppError::Feed("read failed".into()))],
        vec![Ok(closure("X"))],
    ]));
    let cancel = CancellationToken::new();
    let handle = watcher(Arc::clone(&feed), &fakes).spawn(cancel.clone());

    wait_for(|| fakes.completion.checks().len() == 2).await;
    cancel.cancel();
    handle.await.expect("watcher exits cleanly");

    assert!(feed.subscriptions() >= 2);
}

#[tokio::test]
async fn cancel_ends_idle_watcher() {
    let fakes = Fakes::new();
    let feed = Arc::new(FakeFeed::default());
    let cancel = CancellationToken::new();
    let handle = watcher(Arc::clone(&feed), &fakes).spawn(cancel.clone());

    wait_for(|| feed.subscriptions() == 1).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("watcher stops promptly")
        .expect("watcher task did not panic");
    assert!(fakes.completion.checks().is_empty());
}

#[tokio::test]
async fn poll_checks_every_open_convoy() {
    let fakes = Fakes::new();
    two_convoys(&fakes);
    fakes.store.insert(item("C3", CONVOY_ITEM_TYPE, STATUS_CLOSED));

    let checked = check_open_aggregates(fakes.store.as_ref(), fakes.completion.as_ref())
        .await
        .expect("poll");

    assert_eq!(checked, 2);
    let mut checks = fakes.completion.checks();
    checks.sort();
    assert_eq!(checks, vec!["C1".to_owned(), "C2".to_owned()]);
}
