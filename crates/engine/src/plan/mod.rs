// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan engine: lifecycle state machine, task polling, worker dispatch,
//! admission control, completion, and cleanup.

mod cancel;
mod complete;
mod dispatch;
mod execute;
mod poll;
mod prompts;

use crate::agents::AgentDirectory;
use crate::bus::EventTx;
use crate::error::EngineError;
use crate::headless::HeadlessRuntime;
use crate::repos::RepoRegistry;
use crate::state::StateManager;
use crate::terminal::TerminalSupervisor;
use bm_adapters::{GitAdapter, TaskStore, ToolProxy};
use bm_core::{
    ActivityKind, BranchStrategy, Clock, DispatchMode, Event, Plan, PlanActivity, PlanId,
    PlanStatus, TaskAssignment,
};
use bm_storage::ConfigStore;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Task-store cadence for active plans.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PlanConfig {
    pub poll_interval: Duration,
    /// Binary used for the token setup flow in headless dispatch.
    pub assistant_bin: String,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            assistant_bin: std::env::var("BISMARK_ASSISTANT_BIN")
                .unwrap_or_else(|_| "claude".to_string()),
        }
    }
}

/// Everything the user can set at plan creation.
#[derive(Debug, Clone, Default)]
pub struct CreatePlan {
    pub title: String,
    pub description: String,
    pub reference_agent_id: Option<bm_core::AgentId>,
    pub max_parallel_agents: Option<u32>,
    pub branch_strategy: Option<BranchStrategy>,
    pub dispatch_mode: Option<DispatchMode>,
    pub base_branch: Option<String>,
}

pub(crate) struct PlanInner {
    pub plans: HashMap<PlanId, Plan>,
    pub assignments: HashMap<PlanId, Vec<TaskAssignment>>,
    /// Per-plan re-entrancy guard for `execute_plan`.
    pub executing: HashSet<PlanId>,
    pub pollers: HashMap<PlanId, CancellationToken>,
}

pub struct PlanManager {
    pub(crate) store: ConfigStore,
    pub(crate) taskstore: Arc<dyn TaskStore>,
    pub(crate) git: Arc<dyn GitAdapter>,
    pub(crate) agents: Arc<AgentDirectory>,
    pub(crate) repos: Arc<RepoRegistry>,
    pub(crate) state: Arc<StateManager>,
    pub(crate) terminals: Arc<TerminalSupervisor>,
    pub(crate) headless: Arc<HeadlessRuntime>,
    pub(crate) proxy: Arc<ToolProxy>,
    pub(crate) events: EventTx,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: PlanConfig,
    pub(crate) inner: Mutex<PlanInner>,
    /// Back-reference for poll loops and detached cleanup tasks.
    pub(crate) self_ref: std::sync::Weak<Self>,
}

impl PlanManager {
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        store: ConfigStore,
        taskstore: Arc<dyn TaskStore>,
        git: Arc<dyn GitAdapter>,
        agents: Arc<AgentDirectory>,
        repos: Arc<RepoRegistry>,
        state: Arc<StateManager>,
        terminals: Arc<TerminalSupervisor>,
        headless: Arc<HeadlessRuntime>,
        proxy: Arc<ToolProxy>,
        events: EventTx,
        clock: Arc<dyn Clock>,
        config: PlanConfig,
    ) -> Arc<Self> {
        let mut plans = HashMap::new();
        let mut assignments = HashMap::new();
        for plan in store.list_plans() {
            assignments.insert(plan.id, store.load_assignments(&plan.id));
            plans.insert(plan.id, plan);
        }
        Arc::new_cyclic(|self_ref| Self {
            store,
            taskstore,
            git,
            agents,
            repos,
            state,
            terminals,
            headless,
            proxy,
            events,
            clock,
            config,
            inner: Mutex::new(PlanInner {
                plans,
                assignments,
                executing: HashSet::new(),
                pollers: HashMap::new(),
            }),
            self_ref: self_ref.clone(),
        })
    }

    // --- CRUD ---

    pub fn create_plan(&self, req: CreatePlan) -> Plan {
        let mut plan = Plan::new(req.title, self.clock.epoch_ms());
        plan.description = req.description;
        plan.reference_agent_id = req.reference_agent_id;
        if let Some(max) = req.max_parallel_agents {
            plan.max_parallel_agents = max.max(1);
        }
        if let Some(strategy) = req.branch_strategy {
            plan.branch_strategy = strategy;
        }
        if let Some(mode) = req.dispatch_mode {
            plan.dispatch_mode = mode;
        }
        if let Some(base) = req.base_branch {
            plan.base_branch = base;
        }
        self.inner.lock().plans.insert(plan.id, plan.clone());
        self.persist_plan(&plan);
        plan
    }

    pub fn list_plans(&self) -> Vec<Plan> {
        let inner = self.inner.lock();
        let mut plans: Vec<Plan> = inner.plans.values().cloned().collect();
        plans.sort_by_key(|p| p.created_at_ms);
        plans
    }

    pub fn get_plan(&self, plan_id: &PlanId) -> Option<Plan> {
        self.inner.lock().plans.get(plan_id).cloned()
    }

    pub fn require_plan(&self, plan_id: &PlanId) -> Result<Plan, EngineError> {
        self.get_plan(plan_id)
            .ok_or_else(|| EngineError::NotFound(format!("plan {}", plan_id)))
    }

    /// Delete a plan and its directory. Active plans must be cancelled first.
    pub fn delete_plan(&self, plan_id: &PlanId) -> Result<(), EngineError> {
        let plan = self.require_plan(plan_id)?;
        if plan.status.is_polling() {
            return Err(EngineError::InvalidState(format!(
                "plan {} is {}; cancel it first",
                plan_id, plan.status
            )));
        }
        {
            let mut inner = self.inner.lock();
            if let Some(token) = inner.pollers.remove(plan_id) {
                token.cancel();
            }
            inner.plans.remove(plan_id);
            inner.assignments.remove(plan_id);
        }
        self.store.delete_plan(plan_id);
        self.events.emit(Event::PlanDeleted { plan_id: *plan_id });
        Ok(())
    }

    pub fn delete_plans(&self, plan_ids: &[PlanId]) -> Vec<PlanId> {
        plan_ids
            .iter()
            .filter(|id| self.delete_plan(id).is_ok())
            .copied()
            .collect()
    }

    /// Duplicate a plan's configuration into a fresh draft.
    pub fn clone_plan(&self, plan_id: &PlanId) -> Result<Plan, EngineError> {
        let source = self.require_plan(plan_id)?;
        Ok(self.create_plan(CreatePlan {
            title: source.title,
            description: source.description,
            reference_agent_id: source.reference_agent_id,
            max_parallel_agents: Some(source.max_parallel_agents),
            branch_strategy: Some(source.branch_strategy),
            dispatch_mode: Some(source.dispatch_mode),
            base_branch: Some(source.base_branch),
        }))
    }

    pub fn assignments(&self, plan_id: &PlanId) -> Vec<TaskAssignment> {
        self.inner
            .lock()
            .assignments
            .get(plan_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn activities(&self, plan_id: &PlanId) -> Vec<PlanActivity> {
        self.store.load_activities(plan_id)
    }

    pub fn plan_dir(&self, plan_id: &PlanId) -> PathBuf {
        self.store.paths().plan_dir(plan_id)
    }

    // --- shared helpers ---

    /// Append an activity entry, persist it, and notify.
    pub(crate) fn activity(&self, plan_id: &PlanId, kind: ActivityKind, message: impl Into<String>) {
        self.activity_with_details(plan_id, kind, message, None)
    }

    pub(crate) fn activity_with_details(
        &self,
        plan_id: &PlanId,
        kind: ActivityKind,
        message: impl Into<String>,
        details: Option<String>,
    ) {
        let mut activity = PlanActivity::new(*plan_id, kind, message, self.clock.epoch_ms());
        activity.details = details;
        if let Err(e) = self.store.append_activity(plan_id, &activity) {
            tracing::error!(plan = %plan_id, error = %e, "activity append failed");
        }
        self.events.emit(Event::PlanActivityLogged { activity });
    }

    /// Persist the cached plan and emit `plan-update`.
    pub(crate) fn persist_plan(&self, plan: &Plan) {
        if let Err(e) = self.store.save_plan(plan) {
            tracing::error!(plan = %plan.id, error = %e, "plan save failed, keeping in-memory value");
        }
        self.events.emit(Event::PlanUpdate { plan: plan.clone() });
    }

    /// Mutate the cached plan under the lock, then persist and emit.
    pub(crate) fn update_plan(
        &self,
        plan_id: &PlanId,
        mutate: impl FnOnce(&mut Plan),
    ) -> Result<Plan, EngineError> {
        let plan = {
            let mut inner = self.inner.lock();
            let plan = inner
                .plans
                .get_mut(plan_id)
                .ok_or_else(|| EngineError::NotFound(format!("plan {}", plan_id)))?;
            mutate(plan);
            plan.updated_at_ms = self.clock.epoch_ms();
            plan.clone()
        };
        self.persist_plan(&plan);
        Ok(plan)
    }

    pub(crate) fn set_status(
        &self,
        plan_id: &PlanId,
        status: PlanStatus,
    ) -> Result<Plan, EngineError> {
        self.update_plan(plan_id, |plan| plan.status = status)
    }

    /// Persist the assignment list and emit an update for one entry.
    pub(crate) fn save_assignment(&self, plan_id: &PlanId, assignment: TaskAssignment) {
        let all = {
            let mut inner = self.inner.lock();
            let list = inner.assignments.entry(*plan_id).or_default();
            match list.iter_mut().find(|a| a.task_id == assignment.task_id) {
                Some(slot) => *slot = assignment.clone(),
                None => list.push(assignment.clone()),
            }
            list.clone()
        };
        if let Err(e) = self.store.save_assignments(plan_id, &all) {
            tracing::error!(plan = %plan_id, error = %e, "assignment save failed");
        }
        self.events.emit(Event::TaskAssignmentUpdate { plan_id: *plan_id, assignment });
    }

    pub(crate) fn remove_assignment(&self, plan_id: &PlanId, task_id: &bm_core::TaskId) {
        let all = {
            let mut inner = self.inner.lock();
            let list = inner.assignments.entry(*plan_id).or_default();
            list.retain(|a| &a.task_id != task_id);
            list.clone()
        };
        if let Err(e) = self.store.save_assignments(plan_id, &all) {
            tracing::error!(plan = %plan_id, error = %e, "assignment save failed");
        }
    }

    /// Assignments currently counting against the admission bound.
    pub(crate) fn active_assignment_count(&self, plan_id: &PlanId) -> usize {
        self.inner
            .lock()
            .assignments
            .get(plan_id)
            .map(|list| list.iter().filter(|a| a.status.is_active()).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "../plan_tests/mod.rs"]
mod tests;
