// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable config store. Source of truth across restarts; in-memory
//! caches in the engine rebuild from here at startup.

use crate::json::{
    append_jsonl, read_json_opt, read_json_or_default, read_jsonl, write_json, PersistError,
};
use crate::paths::ConfigPaths;
use bm_core::{
    AgentRecord, AppState, HeadlessAgentInfo, Plan, PlanActivity, PlanId, Repository,
    StreamEvent, TaskAssignment, TaskId,
};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    paths: ConfigPaths,
}

impl ConfigStore {
    pub fn new(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn open_default() -> Self {
        Self::new(ConfigPaths::resolve())
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    // --- agents ---

    pub fn load_agents(&self) -> Vec<AgentRecord> {
        read_json_or_default(&self.paths.agents_file())
    }

    pub fn save_agents(&self, agents: &[AgentRecord]) -> Result<(), PersistError> {
        write_json(&self.paths.agents_file(), &agents)
    }

    // --- repositories ---

    pub fn load_repositories(&self) -> Vec<Repository> {
        read_json_or_default(&self.paths.repositories_file())
    }

    pub fn save_repositories(&self, repos: &[Repository]) -> Result<(), PersistError> {
        write_json(&self.paths.repositories_file(), &repos)
    }

    // --- app state ---

    pub fn load_app_state(&self) -> AppState {
        read_json_or_default(&self.paths.state_file())
    }

    pub fn save_app_state(&self, state: &AppState) -> Result<(), PersistError> {
        write_json(&self.paths.state_file(), state)
    }

    // --- auth token ---

    pub fn read_token(&self) -> Option<String> {
        let token = std::fs::read_to_string(self.paths.token_file()).ok()?;
        let token = token.trim().to_string();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }

    pub fn write_token(&self, token: &str) -> Result<(), PersistError> {
        let path = self.paths.token_file();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PersistError::Io { path: path.clone(), source: e })?;
        }
        std::fs::write(&path, token)
            .map_err(|e| PersistError::Io { path: path.clone(), source: e })?;
        // Token file is owner-only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&path, perms)
                .map_err(|e| PersistError::Io { path, source: e })?;
        }
        Ok(())
    }

    pub fn clear_token(&self) {
        let _ = std::fs::remove_file(self.paths.token_file());
    }

    // --- plans ---

    pub fn list_plans(&self) -> Vec<Plan> {
        let dir = self.paths.plans_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut plans: Vec<Plan> = entries
            .flatten()
            .filter_map(|entry| read_json_opt(&entry.path().join("plan.json")))
            .collect();
        plans.sort_by_key(|p| p.created_at_ms);
        plans
    }

    pub fn load_plan(&self, plan_id: &PlanId) -> Option<Plan> {
        read_json_opt(&self.paths.plan_file(plan_id))
    }

    pub fn save_plan(&self, plan: &Plan) -> Result<(), PersistError> {
        write_json(&self.paths.plan_file(&plan.id), plan)
    }

    /// Remove a plan's directory tree (plan, assignments, activities, logs).
    pub fn delete_plan(&self, plan_id: &PlanId) {
        let dir = self.paths.plan_dir(plan_id);
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(plan = %plan_id, error = %e, "plan directory removal failed");
            }
        }
    }

    // --- assignments ---

    pub fn load_assignments(&self, plan_id: &PlanId) -> Vec<TaskAssignment> {
        read_json_or_default(&self.paths.assignments_file(plan_id))
    }

    pub fn save_assignments(
        &self,
        plan_id: &PlanId,
        assignments: &[TaskAssignment],
    ) -> Result<(), PersistError> {
        write_json(&self.paths.assignments_file(plan_id), &assignments)
    }

    // --- activities ---

    pub fn load_activities(&self, plan_id: &PlanId) -> Vec<PlanActivity> {
        read_json_or_default(&self.paths.activities_file(plan_id))
    }

    pub fn append_activity(
        &self,
        plan_id: &PlanId,
        activity: &PlanActivity,
    ) -> Result<(), PersistError> {
        crate::json::update_json(
            &self.paths.activities_file(plan_id),
            |activities: &mut Vec<PlanActivity>| activities.push(activity.clone()),
        )
    }

    // --- headless event logs ---

    /// Append newly observed stream events for one headless run.
    pub fn append_headless_events(
        &self,
        plan_id: Option<&PlanId>,
        task_id: &TaskId,
        events: &[StreamEvent],
    ) -> Result<(), PersistError> {
        append_jsonl(&self.paths.headless_events_file(plan_id, task_id), events)
    }

    /// Persist the run snapshot (status, result, timestamps). Events live in
    /// the sibling `.jsonl` log, so the snapshot is written without them.
    pub fn save_headless_snapshot(&self, info: &HeadlessAgentInfo) -> Result<(), PersistError> {
        let mut snapshot = info.clone();
        snapshot.events.clear();
        let path =
            self.paths.headless_snapshot_file(snapshot.plan_id.as_ref(), &snapshot.task_id);
        write_json(&path, &snapshot)
    }

    /// Rehydrate one headless run: snapshot plus replayed event log.
    pub fn load_headless(
        &self,
        plan_id: Option<&PlanId>,
        task_id: &TaskId,
    ) -> Option<HeadlessAgentInfo> {
        let mut info: HeadlessAgentInfo =
            read_json_opt(&self.paths.headless_snapshot_file(plan_id, task_id))?;
        info.events = read_jsonl(&self.paths.headless_events_file(plan_id, task_id));
        Some(info)
    }

    /// Task ids with a persisted headless run under the given scope.
    pub fn list_headless(&self, plan_id: Option<&PlanId>) -> Vec<TaskId> {
        let dir = self.paths.headless_dir(plan_id);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut ids: Vec<TaskId> = entries
            .flatten()
            .filter_map(|entry| {
                let path: PathBuf = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    return None;
                }
                path.file_stem().and_then(|s| s.to_str()).map(TaskId::from)
            })
            .collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    pub fn delete_headless(&self, plan_id: Option<&PlanId>, task_id: &TaskId) {
        let _ = std::fs::remove_file(self.paths.headless_snapshot_file(plan_id, task_id));
        let _ = std::fs::remove_file(self.paths.headless_events_file(plan_id, task_id));
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
