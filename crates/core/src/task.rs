// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External task-store records and per-plan task assignments.
//!
//! Task ids are minted by the external store and treated as opaque strings.
//! Labels carry orchestration metadata by convention: `bismark-ready` marks a
//! task dispatchable, `bismark-sent` marks it dispatched, and `repo:<name>` /
//! `worktree:<slug>` name the repository and worktree slug the orchestrator
//! assigned.

use crate::agent::AgentId;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Label the orchestrator sets when a task is ready for dispatch.
pub const READY_LABEL: &str = "bismark-ready";
/// Label the engine swaps in once a task has been handed to a worker.
pub const SENT_LABEL: &str = "bismark-sent";
/// Label prefix naming the target repository.
pub const REPO_LABEL_PREFIX: &str = "repo:";
/// Label prefix naming the worktree slug.
pub const WORKTREE_LABEL_PREFIX: &str = "worktree:";

/// Identifier minted by the external task store. Opaque, variable length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TaskId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TaskId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Open,
    Closed,
}

/// Read-side view of a task in the external store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Task {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Value of the first label with the given prefix, e.g. `repo:` → `r1`.
    pub fn label_value(&self, prefix: &str) -> Option<&str> {
        self.labels.iter().find_map(|l| l.strip_prefix(prefix)).filter(|v| !v.is_empty())
    }

    pub fn repo_name(&self) -> Option<&str> {
        self.label_value(REPO_LABEL_PREFIX)
    }

    pub fn worktree_slug(&self) -> Option<&str> {
        self.label_value(WORKTREE_LABEL_PREFIX)
    }

    pub fn is_open(&self) -> bool {
        self.status == TaskStatus::Open
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Created, worktree allocation in flight.
    #[default]
    Pending,
    /// Handed to a worker.
    Sent,
    InProgress,
    Completed,
    Failed,
}

impl AssignmentStatus {
    /// Active assignments count against the plan's admission bound.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AssignmentStatus::Pending | AssignmentStatus::Sent | AssignmentStatus::InProgress
        )
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Sent => "sent",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One assignment per task id per plan, `plans/{planId}/assignments.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssignment {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    #[serde(default)]
    pub status: AssignmentStatus,
    pub assigned_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
}

impl TaskAssignment {
    pub fn new(task_id: TaskId, agent_id: AgentId, now_ms: u64) -> Self {
        Self {
            task_id,
            agent_id,
            status: AssignmentStatus::Pending,
            assigned_at_ms: now_ms,
            completed_at_ms: None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
