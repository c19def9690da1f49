//! Unit tests for agent identity parsing and formatting.
//!
//! Every textual form must round-trip back to the same identity, including
//! roles without a project scope or agent name.

use std::path::Path;

use proptest::prelude::*;

use fleet_warden::models::identity::{AgentIdentity, RoleType};

fn worker(role: RoleType, project: &str, name: &str) -> AgentIdentity {
    AgentIdentity::new(role, Some(project), Some(name)).expect("valid identity")
}

#[test]
fn forms_follow_naming_table() {
    let cases = [
        (AgentIdentity::Coordinator, "fw-coordinator", "hq-coordinator", "coordinator"),
        (AgentIdentity::HealthOrchestrator, "fw-orchestrator", "hq-orchestrator", "orchestrator"),
        (
            AgentIdentity::monitor("alpha").expect("monitor"),
            "fw-alpha-monitor",
            "fw-alpha-monitor",
            "alpha/monitor",
        ),
        (
            AgentIdentity::merge_processor("alpha").expect("merger"),
            "fw-alpha-merger",
            "fw-alpha-merger",
            "alpha/merger",
        ),
        (
            worker(RoleType::PersistentWorker, "alpha", "bob"),
            "fw-alpha-crew-bob",
            "fw-alpha-crew-bob",
            "alpha/crew/bob",
        ),
        (
            worker(RoleType::TransientWorker, "alpha", "rex"),
            "fw-alpha-rex",
            "fw-alpha-worker-rex",
            "alpha/workers/rex",
        ),
    ];

    for (identity, session, ticket, address) in cases {
        assert_eq!(identity.session_name(), session);
        assert_eq!(identity.ticket_id(), ticket);
        assert_eq!(identity.address(), address);
        assert_eq!(identity.to_string(), address);
    }
}

#[test]
fn hyphenated_project_round_trips() {
    let identity = worker(RoleType::PersistentWorker, "big-data", "max-power");
    assert_eq!(identity.session_name(), "fw-big-data-crew-max-power");
    assert_eq!(
        AgentIdentity::parse_session_name(&identity.session_name()).expect("parse"),
        identity
    );
}

#[test]
fn address_tolerates_trailing_slash() {
    assert_eq!(
        AgentIdentity::parse_address("alpha/monitor/").expect("parse"),
        AgentIdentity::monitor("alpha").expect("monitor")
    );
}

#[test]
fn parse_any_accepts_every_form() {
    let rex = worker(RoleType::TransientWorker, "alpha", "rex");
    for raw in ["alpha/workers/rex", "fw-alpha-rex", "fw-alpha-worker-rex"] {
        assert_eq!(AgentIdentity::parse_any(raw).expect(raw), rex);
    }
    assert_eq!(
        AgentIdentity::parse_any("orchestrator").expect("address"),
        AgentIdentity::HealthOrchestrator
    );
    assert_eq!(
        AgentIdentity::parse_any("hq-coordinator").expect("ticket"),
        AgentIdentity::Coordinator
    );
}

#[test]
fn unrecognized_forms_are_rejected() {
    for raw in ["", "alpha", "xx-alpha-monitor", "alpha/unknown", "hq-mayor", "fw-"] {
        assert!(AgentIdentity::parse_any(raw).is_err(), "{raw:?} must not parse");
    }
}

#[test]
fn ambiguous_parts_are_rejected() {
    assert!(AgentIdentity::monitor("crew").is_err());
    assert!(AgentIdentity::monitor("alpha-monitor").is_err());
    assert!(AgentIdentity::monitor("").is_err());
    assert!(AgentIdentity::monitor("al/pha").is_err());
    assert!(AgentIdentity::new(RoleType::TransientWorker, Some("alpha"), Some("two-words")).is_err());
    assert!(AgentIdentity::new(RoleType::TransientWorker, Some("alpha"), Some("monitor")).is_err());
    assert!(AgentIdentity::new(RoleType::Coordinator, Some("alpha"), None).is_err());
    assert!(AgentIdentity::new(RoleType::PersistentWorker, Some("alpha"), None).is_err());
}

#[test]
fn directories_follow_town_layout() {
    let town = Path::new("/town");
    let merger = AgentIdentity::merge_processor("alpha").expect("merger");
    assert_eq!(merger.work_dir(town), Path::new("/town/alpha/merger/repo"));
    assert_eq!(merger.state_file(town), Path::new("/town/alpha/merger/state.json"));

    let bob = worker(RoleType::PersistentWorker, "alpha", "bob");
    assert_eq!(bob.state_file(town), Path::new("/town/alpha/crew/bob/state.json"));

    assert_eq!(AgentIdentity::Coordinator.work_dir(town), Path::new("/town"));
    assert_eq!(
        AgentIdentity::HealthOrchestrator.state_file(town),
        Path::new("/town/orchestrator/state.json")
    );
}

#[test]
fn role_names_round_trip() {
    for role in RoleType::ALL {
        assert_eq!(RoleType::parse(role.as_str()), Some(role));
    }
    assert_eq!(RoleType::parse("mayor"), None);
}

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,6}".prop_filter("reserved word", |s| {
        !["coordinator", "orchestrator", "monitor", "merger", "crew", "worker", "workers"]
            .contains(&s.as_str())
    })
}

fn project() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..3).prop_map(|parts| parts.join("-"))
}

fn identity() -> impl Strategy<Value = AgentIdentity> {
    prop_oneof![
        Just(AgentIdentity::Coordinator),
        Just(AgentIdentity::HealthOrchestrator),
        project().prop_map(|p| AgentIdentity::monitor(&p).expect("monitor")),
        project().prop_map(|p| AgentIdentity::merge_processor(&p).expect("merger")),
        (project(), prop::collection::vec(segment(), 1..3)).prop_map(|(p, n)| {
            AgentIdentity::new(RoleType::PersistentWorker, Some(&p), Some(&n.join("-")))
                .expect("crew")
        }),
        (project(), segment()).prop_map(|(p, n)| {
            AgentIdentity::new(RoleType::TransientWorker, Some(&p), Some(&n)).expect("worker")
        }),
    ]
}

proptest! {
    #[test]
    fn session_name_round_trips(identity in identity()) {
        prop_assert_eq!(AgentIdentity::parse_session_name(&identity.session_name()).ok(), Some(identity));
    }

    #[test]
    fn ticket_id_round_trips(identity in identity()) {
        prop_assert_eq!(AgentIdentity::parse_ticket_id(&identity.ticket_id()).ok(), Some(identity));
    }

    #[test]
    fn address_round_trips(identity in identity()) {
        prop_assert_eq!(AgentIdentity::parse_address(&identity.address()).ok(), Some(identity));
    }
}
