// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_core::AgentRole;
use bm_storage::{ConfigPaths, ConfigStore};

fn directory() -> (tempfile::TempDir, AgentDirectory) {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(ConfigPaths::at(dir.path()));
    (dir, AgentDirectory::load(store))
}

#[test]
fn save_upserts_and_persists() {
    let (dir, agents) = directory();
    let record = agents.save(AgentRecord::new("a", "/tmp"));
    assert_eq!(agents.list().len(), 1);

    let mut renamed = record.clone();
    renamed.name = "b".into();
    agents.save(renamed);
    assert_eq!(agents.list().len(), 1);
    assert_eq!(agents.get(&record.id).unwrap().name, "b");

    // A fresh directory over the same store sees the same data.
    let reloaded = AgentDirectory::load(ConfigStore::new(ConfigPaths::at(dir.path())));
    assert_eq!(reloaded.list().len(), 1);
    assert_eq!(reloaded.get(&record.id).unwrap().name, "b");
}

#[test]
fn delete_is_idempotent() {
    let (_dir, agents) = directory();
    let record = agents.save(AgentRecord::new("a", "/tmp"));
    assert!(agents.delete(&record.id));
    assert!(!agents.delete(&record.id));
    assert!(agents.get(&record.id).is_none());
}

#[test]
fn session_id_can_be_set_and_cleared() {
    let (_dir, agents) = directory();
    let record = agents.save(AgentRecord::new("a", "/tmp"));
    agents.set_session_id(&record.id, Some("sess-1".into()));
    assert_eq!(agents.get(&record.id).unwrap().session_id.as_deref(), Some("sess-1"));
    agents.set_session_id(&record.id, None);
    assert_eq!(agents.get(&record.id).unwrap().session_id, None);
}

#[test]
fn plan_and_task_lookups() {
    let (_dir, agents) = directory();
    let plan = bm_core::test_support::plan("p");
    let task = bm_core::TaskId::new("T1");

    let mut worker = AgentRecord::new("w", "/tmp").with_role(AgentRole::TaskWorker);
    worker.parent_plan_id = Some(plan.id);
    worker.task_id = Some(task.clone());
    let worker = agents.save(worker);
    agents.save(AgentRecord::new("unrelated", "/tmp"));

    assert_eq!(agents.for_plan(&plan.id).len(), 1);
    assert_eq!(agents.for_task(&plan.id, &task).unwrap().id, worker.id);
    assert!(agents.for_task(&plan.id, &bm_core::TaskId::new("T2")).is_none());
}

#[test]
fn require_reports_not_found() {
    let (_dir, agents) = directory();
    let missing = bm_core::AgentId::generate();
    assert!(matches!(
        agents.require(&missing),
        Err(crate::error::EngineError::NotFound(_))
    ));
}
