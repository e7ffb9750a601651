// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan records and the plan lifecycle state machine.
//!
//! A plan decomposes one piece of work into tasks in the external store. A
//! planner agent writes the tasks, an orchestrator agent marks them ready,
//! and worker agents (interactive or headless) execute them in worktrees.

use crate::agent::AgentId;
use crate::tab::TabId;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a plan.
    pub struct PlanId("pln-");
}

/// Plan lifecycle.
///
/// ```text
/// draft → discussing → discussed → delegating → in_progress
///                                        │            │
///                                        │    ready_for_review → completed
///                                        └──────────→ failed (cancel / fatal)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Draft,
    Discussing,
    Discussed,
    Delegating,
    InProgress,
    ReadyForReview,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Failed)
    }

    /// Plans in these states are polled against the task store.
    pub fn is_polling(self) -> bool {
        matches!(self, PlanStatus::Delegating | PlanStatus::InProgress)
    }

    /// `execute` is accepted from draft or after a finished discussion.
    pub fn can_execute(self) -> bool {
        matches!(self, PlanStatus::Draft | PlanStatus::Discussed)
    }

    /// Cancel is valid from any non-terminal state.
    pub fn can_cancel(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Discussing => "discussing",
            PlanStatus::Discussed => "discussed",
            PlanStatus::Delegating => "delegating",
            PlanStatus::InProgress => "in_progress",
            PlanStatus::ReadyForReview => "ready_for_review",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// How completed worker branches are integrated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStrategy {
    /// Fold every task branch into one plan feature branch on completion.
    #[default]
    FeatureBranch,
    /// Push each task branch and raise a pull request per task.
    RaisePrs,
}

/// Worker execution path for a plan. Plan-scoped: every task of the plan is
/// dispatched the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    #[default]
    Interactive,
    Headless,
}

/// Lifecycle of a worktree allocated to a plan task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeStatus {
    /// Path exists and a git worktree is registered there.
    #[default]
    Active,
    ReadyForReview,
    Cleaned,
}

/// A git worktree bound to one plan task and one worker agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanWorktree {
    pub plan_id: PlanId,
    pub task_id: TaskId,
    pub repo_id: String,
    pub path: PathBuf,
    pub branch: String,
    pub agent_id: AgentId,
    #[serde(default)]
    pub status: WorktreeStatus,
    pub created_at_ms: u64,
}

/// Commit reference recorded during completion finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRef {
    pub sha: String,
    pub message: String,
}

/// Git outcome of a plan: commits folded into the feature branch, or raised PRs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitSummary {
    pub commits: Vec<CommitRef>,
    pub pull_requests: Vec<String>,
}

/// Durable plan record, `plans/{planId}/plan.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: PlanStatus,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    /// User-configured agent whose working directory is the target repo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_agent_id: Option<AgentId>,
    /// Epic in the external task store grouping this plan's tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_tab_id: Option<TabId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner_agent_id: Option<AgentId>,
    /// Admission bound: max assignments concurrently sent/in-progress.
    #[serde(default = "default_max_parallel")]
    pub max_parallel_agents: u32,
    #[serde(default)]
    pub branch_strategy: BranchStrategy,
    #[serde(default)]
    pub dispatch_mode: DispatchMode,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Derived at plan creation for the feature-branch strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_branch: Option<String>,
    #[serde(default)]
    pub worktrees: Vec<PlanWorktree>,
    #[serde(default)]
    pub git_summary: GitSummary,
}

fn default_max_parallel() -> u32 {
    4
}

fn default_base_branch() -> String {
    "main".to_string()
}

impl Plan {
    pub fn new(title: impl Into<String>, now_ms: u64) -> Self {
        let title = title.into();
        let id = PlanId::generate();
        let feature_branch = Some(format!("bismark/{}/{}", id.short8(), slugify(&title)));
        Self {
            id,
            title,
            description: String::new(),
            status: PlanStatus::Draft,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            reference_agent_id: None,
            epic_id: None,
            orchestrator_agent_id: None,
            orchestrator_tab_id: None,
            planner_agent_id: None,
            max_parallel_agents: default_max_parallel(),
            branch_strategy: BranchStrategy::default(),
            dispatch_mode: DispatchMode::default(),
            base_branch: default_base_branch(),
            feature_branch,
            worktrees: Vec::new(),
            git_summary: GitSummary::default(),
        }
    }

    pub fn worktree_for_task(&self, task_id: &TaskId) -> Option<&PlanWorktree> {
        self.worktrees.iter().find(|w| &w.task_id == task_id)
    }

    pub fn worktree_for_task_mut(&mut self, task_id: &TaskId) -> Option<&mut PlanWorktree> {
        self.worktrees.iter_mut().find(|w| &w.task_id == task_id)
    }

    pub fn active_worktrees(&self) -> impl Iterator<Item = &PlanWorktree> {
        self.worktrees.iter().filter(|w| w.status != WorktreeStatus::Cleaned)
    }
}

/// Lowercase, dash-separated, filesystem- and ref-safe slug.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_dash = true;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("task");
    }
    out
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
