// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn events_tag_with_kebab_case_names() {
    let event = Event::AgentWaiting { agent_id: AgentId::from_string("agt-a") };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "agent-waiting");
    assert_eq!(json["agent_id"], "agt-a");
}

#[test]
fn activity_event_keeps_its_wire_name() {
    let activity = crate::activity::PlanActivity::new(
        crate::plan::PlanId::from_string("pln-p"),
        crate::activity::ActivityKind::Warning,
        "missing labels",
        7,
    );
    let event = Event::PlanActivityLogged { activity };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "plan-activity");
    assert_eq!(json["type"], event.name());
}

#[test]
fn name_matches_serde_tag_for_every_variant() {
    let events = vec![
        Event::TerminalExit { terminal_id: TerminalId::generate(), code: Some(0) },
        Event::WaitingQueueChanged { queue: vec![] },
        Event::PlanDeleted { plan_id: crate::plan::PlanId::generate() },
        Event::FocusWorkspace { agent_id: AgentId::generate() },
        Event::TerminalQueueStatus { status: SpawnQueueStatus::default() },
    ];
    for event in events {
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.name(), "tag mismatch for {:?}", event);
    }
}

#[test]
fn events_round_trip() {
    let event = Event::TerminalData {
        terminal_id: TerminalId::from_string("trm-t"),
        data: "hello\u{1b}[0m".into(),
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}
