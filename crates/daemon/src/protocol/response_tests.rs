// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn error_helper_builds_a_tagged_frame() {
    let response = Response::error("not_found", "plan pln-x");
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["type"], "error");
    assert_eq!(json["kind"], "not_found");
    assert_eq!(json["message"], "plan pln-x");
}

#[test]
fn engine_errors_map_to_wire_kinds() {
    use bm_engine::EngineError;
    let cases: Vec<(EngineError, &str)> = vec![
        (EngineError::NotFound("x".into()), "not_found"),
        (EngineError::InvalidState("x".into()), "invalid_state"),
        (EngineError::AlreadyExists("x".into()), "already_exists"),
        (EngineError::ResourceUnavailable("x".into()), "resource_unavailable"),
        (EngineError::ExternalTool("x".into()), "external_tool_failed"),
        (EngineError::Timeout("x".into()), "timeout"),
        (EngineError::Parse("x".into()), "parse_error"),
        (EngineError::Auth("x".into()), "auth"),
    ];
    for (error, expected) in cases {
        match crate::protocol::error_response(&error) {
            Response::Error { kind, .. } => assert_eq!(kind, expected),
            other => panic!("not an error frame: {other:?}"),
        }
    }
}

#[test]
fn notification_frames_carry_events() {
    let response = Response::Notification {
        event: Event::PlanDeleted { plan_id: PlanId::from_string("pln-x") },
    };
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["type"], "notification");
    assert_eq!(json["event"]["type"], "plan-deleted");
}

#[test]
fn state_response_round_trips() {
    let response = Response::State { snapshot: StateSnapshot::default() };
    let json = serde_json::to_string(&response).unwrap();
    let back: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(back, response);
}
