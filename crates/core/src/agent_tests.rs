// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    standard = { AgentRole::Standard, false },
    orchestrator = { AgentRole::Orchestrator, false },
    planner = { AgentRole::Planner, false },
    task_worker = { AgentRole::TaskWorker, false },
    headless = { AgentRole::Headless, true },
    standalone = { AgentRole::StandaloneHeadless, true },
)]
fn headless_roles_never_own_a_pty(role: AgentRole, headless: bool) {
    assert_eq!(role.is_headless(), headless);
}

#[test]
fn standalone_headless_is_not_plan_owned() {
    assert!(!AgentRole::StandaloneHeadless.is_plan_owned());
    assert!(AgentRole::TaskWorker.is_plan_owned());
    assert!(!AgentRole::Standard.is_plan_owned());
}

#[test]
fn new_record_defaults() {
    let record = AgentRecord::new("reviewer", "/srv/repo");
    assert!(record.id.as_str().starts_with("agt-"));
    assert_eq!(record.role, AgentRole::Standard);
    assert!(record.session_id.is_none());
    assert!(record.task_id.is_none());
}

#[test]
fn record_serde_uses_camel_case_and_omits_empty_options() {
    let record = AgentRecord::new("w", "/srv/repo").with_role(AgentRole::TaskWorker);
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["role"], "task-worker");
    assert!(json.get("sessionId").is_none());
    assert!(json.get("parentPlanId").is_none());
}

#[test]
fn record_round_trips_with_worker_bindings() {
    let plan = crate::test_support::plan("p");
    let task = crate::task::TaskId::new("T7");
    let record = crate::test_support::worker_agent("w", &plan, &task);
    let json = serde_json::to_string(&record).unwrap();
    let back: AgentRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
    assert_eq!(back.parent_plan_id, Some(plan.id));
    assert_eq!(back.task_id, Some(task));
}
