//! Unit tests for per-agent state files and their staging flags.

use std::fs;

use serde_json::{json, Value};

use fleet_warden::persistence::agent_state::{AgentStateFile, REQUESTING_TIME_KEY};
use fleet_warden::AppError;

fn write(dir: &std::path::Path, value: &Value) -> std::path::PathBuf {
    let path = dir.join("state.json");
    fs::write(&path, serde_json::to_vec(value).expect("json")).expect("write");
    path
}

#[test]
fn missing_file_is_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let err = AgentStateFile::load(&temp.path().join("absent.json")).expect_err("missing");
    assert!(matches!(err, AppError::NotFound(_)), "{err}");
}

#[test]
fn non_object_file_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write(temp.path(), &json!([1, 2, 3]));
    assert!(matches!(AgentStateFile::load(&path), Err(AppError::Io(_))));
}

#[test]
fn require_flag_accepts_only_boolean_true() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write(
        temp.path(),
        &json!({"requesting_cycle": true, "requesting_restart": "true", "requesting_shutdown": false}),
    );
    let state = AgentStateFile::load(&path).expect("load");

    assert!(state.require_flag("requesting_cycle").is_ok());
    assert!(state.require_flag("requesting_restart").is_err());
    assert!(state.require_flag("requesting_shutdown").is_err());
    assert!(state.require_flag("requesting_other").is_err());
}

#[test]
fn require_flag_explains_what_was_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write(temp.path(), &json!({"requesting_restart": false}));
    let state = AgentStateFile::load(&path).expect("load");

    let err = state.require_flag("requesting_restart").expect_err("false flag");
    assert!(matches!(err, AppError::Precondition(ref msg) if msg.contains("is false")), "{err}");

    let err = state.require_flag("requesting_cycle").expect_err("absent flag");
    assert!(matches!(err, AppError::Precondition(ref msg) if msg.contains("not set")), "{err}");
}

#[test]
fn active_requests_skip_time_and_false_flags() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write(
        temp.path(),
        &json!({
            "requesting_cycle": true,
            "requesting_shutdown": false,
            REQUESTING_TIME_KEY: "2026-10-16T09:00:00Z",
            "role": "crew"
        }),
    );
    let state = AgentStateFile::load(&path).expect("load");

    assert_eq!(state.active_requests(), vec!["requesting_cycle".to_owned()]);
}

#[test]
fn clear_then_save_preserves_other_keys() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write(
        temp.path(),
        &json!({"requesting_restart": true, REQUESTING_TIME_KEY: "now", "notes": {"a": 1}}),
    );
    let mut state = AgentStateFile::load(&path).expect("load");

    assert!(state.clear(&["requesting_restart", REQUESTING_TIME_KEY]));
    assert!(!state.clear(&["requesting_restart"]));
    state.save().expect("save");

    let on_disk: Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    assert_eq!(on_disk, json!({"notes": {"a": 1}}));
}

