// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory agent directory backed by `config.json`.
//!
//! Plans and agents cross-reference each other by id only; lookups are
//! defensive because either side can be deleted first.

use crate::error::EngineError;
use bm_core::{AgentId, AgentRecord, PlanId, TaskId};
use bm_storage::ConfigStore;
use parking_lot::Mutex;

pub struct AgentDirectory {
    store: ConfigStore,
    agents: Mutex<Vec<AgentRecord>>,
}

impl AgentDirectory {
    pub fn load(store: ConfigStore) -> Self {
        let agents = store.load_agents();
        Self { store, agents: Mutex::new(agents) }
    }

    pub fn list(&self) -> Vec<AgentRecord> {
        self.agents.lock().clone()
    }

    pub fn get(&self, id: &AgentId) -> Option<AgentRecord> {
        self.agents.lock().iter().find(|a| &a.id == id).cloned()
    }

    pub fn require(&self, id: &AgentId) -> Result<AgentRecord, EngineError> {
        self.get(id).ok_or_else(|| EngineError::NotFound(format!("agent {}", id)))
    }

    /// Insert or replace by id, then persist. A failed save logs and keeps
    /// the in-memory record authoritative.
    pub fn save(&self, record: AgentRecord) -> AgentRecord {
        let mut agents = self.agents.lock();
        match agents.iter_mut().find(|a| a.id == record.id) {
            Some(slot) => *slot = record.clone(),
            None => agents.push(record.clone()),
        }
        if let Err(e) = self.store.save_agents(&agents) {
            tracing::error!(error = %e, "agent save failed, keeping in-memory value");
        }
        record
    }

    pub fn delete(&self, id: &AgentId) -> bool {
        let mut agents = self.agents.lock();
        let before = agents.len();
        agents.retain(|a| &a.id != id);
        let removed = agents.len() != before;
        if removed {
            if let Err(e) = self.store.save_agents(&agents) {
                tracing::error!(error = %e, "agent save failed after delete");
            }
        }
        removed
    }

    /// Update the cached assistant session id (None clears it).
    pub fn set_session_id(&self, id: &AgentId, session_id: Option<String>) {
        let mut agents = self.agents.lock();
        if let Some(agent) = agents.iter_mut().find(|a| &a.id == id) {
            agent.session_id = session_id;
            if let Err(e) = self.store.save_agents(&agents) {
                tracing::error!(error = %e, "agent save failed after session update");
            }
        }
    }

    /// Agents owned by a plan (workers, orchestrator, planner).
    pub fn for_plan(&self, plan_id: &PlanId) -> Vec<AgentRecord> {
        self.agents
            .lock()
            .iter()
            .filter(|a| a.parent_plan_id.as_ref() == Some(plan_id))
            .cloned()
            .collect()
    }

    /// The worker agent bound to a task, if any.
    pub fn for_task(&self, plan_id: &PlanId, task_id: &TaskId) -> Option<AgentRecord> {
        self.agents
            .lock()
            .iter()
            .find(|a| {
                a.parent_plan_id.as_ref() == Some(plan_id) && a.task_id.as_ref() == Some(task_id)
            })
            .cloned()
    }
}

#[cfg(test)]
#[path = "agents_tests.rs"]
mod tests;
