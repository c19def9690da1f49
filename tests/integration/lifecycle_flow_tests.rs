//! Integration tests for lifecycle request processing.
//!
//! Drives `LifecycleProcessor` against in-memory sessions and mailbox with
//! real agent state files in a temporary town.
//!
//! # Scenarios covered
//!
//! | Scenario | Expectation |
//! |----------|-------------|
//! | Staged restart | session killed and recreated, flags cleared, message gone |
//! | Cycle of a stopped session | launched at once, no restart pause |
//! | Restart older than six hours | deleted, no session action |
//! | Cycle with `requesting_cycle = false` | rejected, message still gone |
//! | Claim fails | not executed, outcome `Failed` |
//! | Shutdown | session killed, not recreated, exit reason recorded |
//! | Repeat processing | executed at most once |

use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};

use fleet_warden::audit::AuditEventType;
use fleet_warden::models::identity::AgentIdentity;
use fleet_warden::models::lifecycle::{LifecycleAction, LifecycleOutcome};
use fleet_warden::models::state::SupervisorState;
use fleet_warden::orchestrator::launcher::SessionLauncher;
use fleet_warden::orchestrator::lifecycle_processor::LifecycleProcessor;

use super::test_helpers::{orchestrator_mail, test_config, Fakes};

const MONITOR: &str = "alpha/monitor";
const MONITOR_SESSION: &str = "fw-alpha-monitor";

fn processor(town: &Path, fakes: &Fakes) -> LifecycleProcessor {
    processor_with_pause(town, fakes, Duration::ZERO)
}

fn processor_with_pause(town: &Path, fakes: &Fakes, restart_pause: Duration) -> LifecycleProcessor {
    let config = test_config(town);
    LifecycleProcessor::new(
        fakes.ctx(),
        Arc::new(SessionLauncher::new(&config)),
        config.town_root.clone(),
        Duration::from_secs(6 * 60 * 60),
        restart_pause,
    )
}

fn write_monitor_state(town: &Path, fields: &Value) {
    let path = AgentIdentity::monitor("alpha")
        .expect("identity")
        .state_file(town);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, serde_json::to_vec(fields).expect("json")).expect("write state");
}

fn read_monitor_state(town: &Path) -> Value {
    let path = AgentIdentity::monitor("alpha")
        .expect("identity")
        .state_file(town);
    serde_json::from_str(&fs::read_to_string(path).expect("read state")).expect("json")
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[tokio::test]
async fn staged_restart_recreates_session_and_clears_flags() {
    let temp = tempfile::tempdir().expect("tempdir");
    let town = temp.path().canonicalize().expect("canonical");
    let fakes = Fakes::new();
    fakes.sessions.start(MONITOR_SESSION);
    write_monitor_state(
        &town,
        &json!({"requesting_restart": true, "requesting_time": "2026-10-16T10:00:00Z", "patrol": 3}),
    );
    fakes.mailbox.deliver(orchestrator_mail(
        "m1",
        MONITOR,
        "LIFECYCLE: restart",
        r#"{"action":"restart"}"#,
        &now(),
    ));

    let mut state = SupervisorState::default();
    let outcomes = processor(&town, &fakes)
        .process_inbox(&mut state)
        .await
        .expect("inbox readable");

    assert_eq!(
        outcomes,
        vec![LifecycleOutcome::Executed {
            message_id: "m1".into(),
            action: LifecycleAction::Restart,
            session: MONITOR_SESSION.into(),
        }]
    );
    assert!(!fakes.mailbox.contains("m1"), "message must be claimed");
    assert_eq!(fakes.sessions.calls_starting("kill "), vec![format!("kill {MONITOR_SESSION}")]);
    assert_eq!(fakes.sessions.calls_starting("new ").len(), 1);
    assert!(fakes.sessions.is_live(MONITOR_SESSION));

    let staged = read_monitor_state(&town);
    assert!(staged.get("requesting_restart").is_none());
    assert!(staged.get("requesting_time").is_none());
    assert_eq!(staged["patrol"], 3, "unrelated keys must survive");
    assert_eq!(fakes.audit.events(), vec![AuditEventType::LifecycleExecuted]);
}

#[tokio::test]
async fn cycle_of_stopped_session_skips_restart_pause() {
    let temp = tempfile::tempdir().expect("tempdir");
    let town = temp.path().canonicalize().expect("canonical");
    let fakes = Fakes::new();
    write_monitor_state(&town, &json!({"requesting_cycle": true}));
    fakes.mailbox.deliver(orchestrator_mail(
        "m1",
        MONITOR,
        "LIFECYCLE: cycle",
        r#"{"action":"cycle"}"#,
        &now(),
    ));

    let mut state = SupervisorState::default();
    let processor = processor_with_pause(&town, &fakes, Duration::from_secs(60 * 60));
    let outcomes = tokio::time::timeout(Duration::from_secs(5), processor.process_inbox(&mut state))
        .await
        .expect("no pause without a killed session")
        .expect("inbox readable");

    assert!(matches!(outcomes.as_slice(), [LifecycleOutcome::Executed { .. }]));
    assert!(fakes.sessions.calls_starting("kill").is_empty());
    assert!(fakes.sessions.is_live(MONITOR_SESSION));
    let monitor = AgentIdentity::monitor("alpha").expect("identity");
    assert!(state
        .agent(&monitor)
        .and_then(|agent| agent.launched_at)
        .is_some());
}

#[tokio::test]
async fn restart_older_than_max_age_is_discarded() {
    let temp = tempfile::tempdir().expect("tempdir");
    let town = temp.path().canonicalize().expect("canonical");
    let fakes = Fakes::new();
    fakes.sessions.start(MONITOR_SESSION);
    write_monitor_state(&town, &json!({"requesting_restart": true}));
    let sent = (Utc::now() - ChronoDuration::hours(7)).to_rfc3339();
    fakes.mailbox.deliver(orchestrator_mail(
        "old",
        MONITOR,
        "LIFECYCLE: restart",
        r#"{"action":"restart"}"#,
        &sent,
    ));

    let mut state = SupervisorState::default();
    let outcomes = processor(&town, &fakes)
        .process_inbox(&mut state)
        .await
        .expect("inbox readable");

    assert_eq!(
        outcomes,
        vec![LifecycleOutcome::Discarded {
            message_id: "old".into()
        }]
    );
    assert!(!fakes.mailbox.contains("old"));
    assert!(fakes.sessions.calls().is_empty(), "no session action expected");
    assert_eq!(read_monitor_state(&town)["requesting_restart"], true);
}

#[tokio::test]
async fn unstaged_cycle_is_rejected_and_still_removed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let town = temp.path().canonicalize().expect("canonical");
    let fakes = Fakes::new();
    fakes.sessions.start(MONITOR_SESSION);
    write_monitor_state(&town, &json!({"requesting_cycle": false}));
    fakes.mailbox.deliver(orchestrator_mail(
        "c1",
        MONITOR,
        "lifecycle: cycle",
        "cycle",
        &now(),
    ));

    let mut state = SupervisorState::default();
    let outcomes = processor(&town, &fakes)
        .process_inbox(&mut state)
        .await
        .expect("inbox readable");

    assert_eq!(outcomes.len(), 1);
    assert!(
        matches!(&outcomes[0], LifecycleOutcome::Rejected { message_id, .. } if message_id == "c1"),
        "expected rejection, got {:?}",
        outcomes[0]
    );
    assert!(!fakes.mailbox.contains("c1"), "rejected request must not linger");
    assert!(fakes.sessions.is_live(MONITOR_SESSION));
    assert!(fakes.sessions.calls().is_empty());
    assert_eq!(fakes.audit.events(), vec![AuditEventType::LifecycleRejected]);
}

#[tokio::test]
async fn missing_state_file_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let town = temp.path().canonicalize().expect("canonical");
    let fakes = Fakes::new();
    fakes.mailbox.deliver(orchestrator_mail(
        "r1",
        MONITOR,
        "LIFECYCLE: restart",
        r#"{"action":"restart"}"#,
        &now(),
    ));

    let mut state = SupervisorState::default();
    let outcomes = processor(&town, &fakes)
        .process_inbox(&mut state)
        .await
        .expect("inbox readable");

    assert!(matches!(outcomes[0], LifecycleOutcome::Rejected { .. }));
    assert!(!fakes.mailbox.contains("r1"));
}

#[tokio::test]
async fn failed_claim_skips_execution() {
    let temp = tempfile::tempdir().expect("tempdir");
    let town = temp.path().canonicalize().expect("canonical");
    let fakes = Fakes::new();
    fakes.sessions.start(MONITOR_SESSION);
    fakes.mailbox.fail_delete.store(true, Ordering::SeqCst);
    write_monitor_state(&town, &json!({"requesting_restart": true}));
    fakes.mailbox.deliver(orchestrator_mail(
        "m2",
        MONITOR,
        "LIFECYCLE: restart",
        r#"{"action":"restart"}"#,
        &now(),
    ));

    let mut state = SupervisorState::default();
    let outcomes = processor(&town, &fakes)
        .process_inbox(&mut state)
        .await
        .expect("inbox readable");

    assert!(
        matches!(&outcomes[0], LifecycleOutcome::Failed { reason, .. } if reason.contains("claim")),
        "expected claim failure, got {:?}",
        outcomes[0]
    );
    assert!(fakes.sessions.calls().is_empty(), "nothing may run without a claim");
    assert_eq!(read_monitor_state(&town)["requesting_restart"], true);
}

#[tokio::test]
async fn shutdown_kills_without_relaunching() {
    let temp = tempfile::tempdir().expect("tempdir");
    let town = temp.path().canonicalize().expect("canonical");
    let fakes = Fakes::new();
    fakes.sessions.start(MONITOR_SESSION);
    write_monitor_state(&town, &json!({"requesting_shutdown": true}));
    fakes.mailbox.deliver(orchestrator_mail(
        "s1",
        MONITOR,
        "LIFECYCLE: stop please",
        "stop",
        &now(),
    ));

    let mut state = SupervisorState::default();
    let outcomes = processor(&town, &fakes)
        .process_inbox(&mut state)
        .await
        .expect("inbox readable");

    assert!(matches!(
        outcomes[0],
        LifecycleOutcome::Executed {
            action: LifecycleAction::Shutdown,
            ..
        }
    ));
    assert!(!fakes.sessions.is_live(MONITOR_SESSION));
    assert!(fakes.sessions.calls_starting("new ").is_empty());

    let monitor = AgentIdentity::monitor("alpha").expect("identity");
    let agent = state.agent(&monitor).expect("bookkeeping recorded");
    assert_eq!(agent.exit_reason, "shutdown");
    assert!(agent.last_exited_at.is_some());
    assert!(read_monitor_state(&town).get("requesting_shutdown").is_none());
}

#[tokio::test]
async fn request_is_executed_at_most_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let town = temp.path().canonicalize().expect("canonical");
    let fakes = Fakes::new();
    write_monitor_state(&town, &json!({"requesting_restart": true}));
    fakes.mailbox.deliver(orchestrator_mail(
        "once",
        MONITOR,
        "LIFECYCLE: restart",
        r#"{"action":"restart"}"#,
        &now(),
    ));

    let processor = processor(&town, &fakes);
    let mut state = SupervisorState::default();
    let first = processor.process_inbox(&mut state).await.expect("first pass");
    let second = processor.process_inbox(&mut state).await.expect("second pass");

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(fakes.sessions.calls_starting("new ").len(), 1);
}

#[tokio::test]
async fn other_mail_is_left_alone() {
    let temp = tempfile::tempdir().expect("tempdir");
    let town = temp.path().canonicalize().expect("canonical");
    let fakes = Fakes::new();
    fakes
        .mailbox
        .deliver(orchestrator_mail("n1", MONITOR, "status report", "all good", &now()));
    let mut read = orchestrator_mail(
        "n2",
        MONITOR,
        "LIFECYCLE: restart",
        r#"{"action":"restart"}"#,
        &now(),
    );
    read.read = true;
    fakes.mailbox.deliver(read);
    fakes.mailbox.deliver(orchestrator_mail(
        "n3",
        MONITOR,
        "LIFECYCLE: dance",
        r#"{"action":"dance"}"#,
        &now(),
    ));

    let mut state = SupervisorState::default();
    let outcomes = processor(&town, &fakes)
        .process_inbox(&mut state)
        .await
        .expect("inbox readable");

    assert!(outcomes.is_empty());
    for id in ["n1", "n2", "n3"] {
        assert!(fakes.mailbox.contains(id), "{id} must not be touched");
    }
}
