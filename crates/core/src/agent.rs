// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable workspace (agent) records.
//!
//! An agent is a supervised unit of work: an identity, a working directory,
//! and exactly one execution strategy (interactive PTY or headless container).
//! Role determines who owns the record's lifecycle — users own standard
//! agents, the plan engine owns orchestrator/planner/worker agents.

use crate::plan::PlanId;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for an agent (workspace).
    pub struct AgentId("agt-");
}

/// Execution role of an agent. Exactly one role per record; the role decides
/// whether the agent owns a PTY (interactive roles) or a container (headless
/// roles), and whether the plan engine may delete it during cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    /// User-created interactive agent.
    #[default]
    Standard,
    /// Plan-owned interactive agent that labels tasks ready.
    Orchestrator,
    /// Plan-owned transient agent that decomposes the plan into tasks.
    Planner,
    /// Plan-owned interactive agent bound to one task and one worktree.
    TaskWorker,
    /// Plan-owned container-hosted worker.
    Headless,
    /// Container-hosted worker with no parent plan.
    StandaloneHeadless,
}

impl AgentRole {
    /// Headless agents never own a PTY.
    pub fn is_headless(self) -> bool {
        matches!(self, AgentRole::Headless | AgentRole::StandaloneHeadless)
    }

    /// Plan-owned roles are deleted by plan cleanup, not by the user.
    pub fn is_plan_owned(self) -> bool {
        matches!(
            self,
            AgentRole::Orchestrator
                | AgentRole::Planner
                | AgentRole::TaskWorker
                | AgentRole::Headless
        )
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentRole::Standard => "standard",
            AgentRole::Orchestrator => "orchestrator",
            AgentRole::Planner => "planner",
            AgentRole::TaskWorker => "task-worker",
            AgentRole::Headless => "headless",
            AgentRole::StandaloneHeadless => "standalone-headless",
        };
        write!(f, "{}", s)
    }
}

/// Durable agent record, one entry in `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    /// Host working directory for the assistant process.
    pub directory: PathBuf,
    #[serde(default)]
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Resumable assistant session id. Cleared when the session is reset
    /// (the child prints the clear marker).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub role: AgentRole,
    /// Plan that owns this agent (worker/orchestrator/planner roles).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_plan_id: Option<PlanId>,
    /// Worktree this agent works in (task-worker and headless roles).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<PathBuf>,
    /// External-store task this agent is assigned to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

impl AgentRecord {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            id: AgentId::generate(),
            name: name.into(),
            directory: directory.into(),
            purpose: String::new(),
            color: None,
            icon: None,
            session_id: None,
            role: AgentRole::Standard,
            parent_plan_id: None,
            worktree_path: None,
            task_id: None,
        }
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.role = role;
        self
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
