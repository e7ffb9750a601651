// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layout of the durable config root.
//!
//! ```text
//! ~/.bismark/
//!   config.json                 # agents
//!   repositories.json
//!   state.json                  # tabs, focus, preferences
//!   token                       # assistant auth token (0600)
//!   headless/{taskId}.jsonl     # standalone runs
//!   plans/{planId}/
//!     plan.json
//!     assignments.json
//!     activities.json
//!     headless/{taskId}.jsonl
//!     worktrees/{repoName}/{branchSlug}/
//! ```

use bm_core::{PlanId, TaskId};
use std::path::{Path, PathBuf};

/// Resolved locations under the config root.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    root: PathBuf,
}

impl ConfigPaths {
    /// Root from `BISMARK_HOME`, falling back to `~/.bismark`.
    pub fn resolve() -> Self {
        let root = std::env::var_os("BISMARK_HOME")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".bismark")))
            .unwrap_or_else(|| PathBuf::from(".bismark"));
        Self { root }
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn agents_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn repositories_file(&self) -> PathBuf {
        self.root.join("repositories.json")
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn token_file(&self) -> PathBuf {
        self.root.join("token")
    }

    pub fn plans_dir(&self) -> PathBuf {
        self.root.join("plans")
    }

    pub fn plan_dir(&self, plan_id: &PlanId) -> PathBuf {
        self.plans_dir().join(plan_id.as_str())
    }

    pub fn plan_file(&self, plan_id: &PlanId) -> PathBuf {
        self.plan_dir(plan_id).join("plan.json")
    }

    pub fn assignments_file(&self, plan_id: &PlanId) -> PathBuf {
        self.plan_dir(plan_id).join("assignments.json")
    }

    pub fn activities_file(&self, plan_id: &PlanId) -> PathBuf {
        self.plan_dir(plan_id).join("activities.json")
    }

    /// Headless dir for a plan, or the root-level dir for standalone runs.
    pub fn headless_dir(&self, plan_id: Option<&PlanId>) -> PathBuf {
        match plan_id {
            Some(id) => self.plan_dir(id).join("headless"),
            None => self.root.join("headless"),
        }
    }

    pub fn headless_snapshot_file(&self, plan_id: Option<&PlanId>, task_id: &TaskId) -> PathBuf {
        self.headless_dir(plan_id).join(format!("{}.json", task_id))
    }

    pub fn headless_events_file(&self, plan_id: Option<&PlanId>, task_id: &TaskId) -> PathBuf {
        self.headless_dir(plan_id).join(format!("{}.jsonl", task_id))
    }

    pub fn worktrees_dir(&self, plan_id: &PlanId, repo_name: &str) -> PathBuf {
        self.plan_dir(plan_id).join("worktrees").join(repo_name)
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
