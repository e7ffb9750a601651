// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixtures shared by tests across the workspace.

use crate::agent::{AgentRecord, AgentRole};
use crate::plan::{Plan, PlanStatus};
use crate::task::{Task, TaskId, TaskStatus};

/// A standard agent rooted at `/tmp`.
pub fn agent(name: &str) -> AgentRecord {
    AgentRecord::new(name, "/tmp")
}

/// A plan-owned worker agent bound to a task.
pub fn worker_agent(name: &str, plan: &Plan, task_id: &TaskId) -> AgentRecord {
    let mut record = AgentRecord::new(name, "/tmp").with_role(AgentRole::TaskWorker);
    record.parent_plan_id = Some(plan.id);
    record.task_id = Some(task_id.clone());
    record
}

/// A draft plan created at t=1000.
pub fn plan(title: &str) -> Plan {
    Plan::new(title, 1_000)
}

/// A plan already in the given status.
pub fn plan_in(title: &str, status: PlanStatus) -> Plan {
    let mut p = plan(title);
    p.status = status;
    p
}

/// An open task with the given labels.
pub fn task(id: &str, title: &str, labels: &[&str]) -> Task {
    Task {
        id: TaskId::new(id),
        title: title.to_string(),
        status: TaskStatus::Open,
        assignee: None,
        labels: labels.iter().map(|l| l.to_string()).collect(),
    }
}
