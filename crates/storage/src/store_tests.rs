// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_core::test_support;
use bm_core::{
    ActivityKind, AgentRecord, HeadlessStatus, PlanActivity, PlanStatus, StreamEvent,
};

fn store() -> (tempfile::TempDir, ConfigStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(ConfigPaths::at(dir.path()));
    (dir, store)
}

#[test]
fn agents_round_trip() {
    let (_dir, store) = store();
    assert!(store.load_agents().is_empty());

    let agents = vec![AgentRecord::new("a", "/tmp"), AgentRecord::new("b", "/tmp")];
    store.save_agents(&agents).unwrap();
    assert_eq!(store.load_agents(), agents);
}

#[test]
fn plans_list_sorted_by_creation() {
    let (_dir, store) = store();
    let mut p1 = test_support::plan("first");
    p1.created_at_ms = 10;
    let mut p2 = test_support::plan("second");
    p2.created_at_ms = 5;
    store.save_plan(&p1).unwrap();
    store.save_plan(&p2).unwrap();

    let plans = store.list_plans();
    assert_eq!(plans.len(), 2);
    assert_eq!(plans[0].title, "second");
    assert_eq!(plans[1].title, "first");
}

#[test]
fn plan_load_and_delete() {
    let (_dir, store) = store();
    let mut plan = test_support::plan("p");
    plan.status = PlanStatus::InProgress;
    store.save_plan(&plan).unwrap();
    assert_eq!(store.load_plan(&plan.id), Some(plan.clone()));

    store.delete_plan(&plan.id);
    assert_eq!(store.load_plan(&plan.id), None);
    assert!(store.list_plans().is_empty());
}

#[test]
fn activities_append_in_order() {
    let (_dir, store) = store();
    let plan = test_support::plan("p");
    for (i, kind) in [ActivityKind::Info, ActivityKind::Warning].iter().enumerate() {
        let activity = PlanActivity::new(plan.id, *kind, format!("m{}", i), i as u64);
        store.append_activity(&plan.id, &activity).unwrap();
    }
    let activities = store.load_activities(&plan.id);
    assert_eq!(activities.len(), 2);
    assert_eq!(activities[0].message, "m0");
    assert_eq!(activities[1].kind, ActivityKind::Warning);
}

#[test]
fn token_is_trimmed_and_clearable() {
    let (_dir, store) = store();
    assert_eq!(store.read_token(), None);
    store.write_token("tok-123\n").unwrap();
    assert_eq!(store.read_token().as_deref(), Some("tok-123"));
    store.clear_token();
    assert_eq!(store.read_token(), None);
}

#[cfg(unix)]
#[test]
fn token_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let (_dir, store) = store();
    store.write_token("t").unwrap();
    let mode = std::fs::metadata(store.paths().token_file()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn headless_snapshot_and_events_rehydrate() {
    let (_dir, store) = store();
    let plan = test_support::plan("p");
    let task = bm_core::TaskId::new("T1");
    let mut info = bm_core::HeadlessAgentInfo::new(task.clone(), Some(plan.id), "/w".into(), 1);
    info.status = HeadlessStatus::Running;
    info.events.push(StreamEvent::Init {
        timestamp: "t0".into(),
        session_id: None,
        model: None,
    });

    store.save_headless_snapshot(&info).unwrap();
    store
        .append_headless_events(Some(&plan.id), &task, &info.events)
        .unwrap();

    let back = store.load_headless(Some(&plan.id), &task).unwrap();
    assert_eq!(back.status, HeadlessStatus::Running);
    assert_eq!(back.events, info.events);
    assert_eq!(store.list_headless(Some(&plan.id)), vec![task.clone()]);

    store.delete_headless(Some(&plan.id), &task);
    assert!(store.load_headless(Some(&plan.id), &task).is_none());
}

#[test]
fn standalone_headless_lives_at_the_root() {
    let (_dir, store) = store();
    let task = bm_core::TaskId::new("S1");
    let info = bm_core::HeadlessAgentInfo::new(task.clone(), None, "/w".into(), 1);
    store.save_headless_snapshot(&info).unwrap();
    assert_eq!(store.list_headless(None), vec![task]);
    assert!(store.list_headless(Some(&test_support::plan("p").id)).is_empty());
}

#[test]
fn assignments_round_trip() {
    let (_dir, store) = store();
    let plan = test_support::plan("p");
    let assignment = bm_core::TaskAssignment::new(
        bm_core::TaskId::new("T1"),
        bm_core::AgentId::generate(),
        9,
    );
    store.save_assignments(&plan.id, &[assignment.clone()]).unwrap();
    assert_eq!(store.load_assignments(&plan.id), vec![assignment]);
}

#[test]
fn app_state_round_trip() {
    let (_dir, store) = store();
    let mut state = bm_core::AppState::default();
    state.tabs.push(bm_core::Tab::new("main"));
    state.active_tab_id = Some(state.tabs[0].id);
    store.save_app_state(&state).unwrap();
    assert_eq!(store.load_app_state(), state);
}
