// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan start-up: discussion phase, delegation, orchestrator/planner setup.

use super::{prompts, PlanManager};
use crate::error::EngineError;
use bm_adapters::CreateTask;
use bm_core::scrape::{Marker, MarkerScanner};
use bm_core::{
    ActivityKind, AgentId, AgentRecord, AgentRole, Plan, PlanId, PlanStatus, TaskId, TerminalId,
};

impl PlanManager {
    /// Spawn a discussion session on the reference repository.
    /// `draft → discussing`; planner exit lands on `discussed`.
    pub async fn start_discussion(
        &self,
        plan_id: &PlanId,
        reference_agent_id: &AgentId,
    ) -> Result<Plan, EngineError> {
        let plan = self.require_plan(plan_id)?;
        if plan.status != PlanStatus::Draft {
            return Err(EngineError::InvalidState(format!(
                "discussion requires a draft plan, got {}",
                plan.status
            )));
        }
        let reference = self.agents.require(reference_agent_id)?;

        let mut record = AgentRecord::new(format!("{} (discussion)", plan.title), &reference.directory)
            .with_role(AgentRole::Planner);
        record.parent_plan_id = Some(*plan_id);
        let record = self.agents.save(record);

        let plan = self.update_plan(plan_id, |p| {
            p.status = PlanStatus::Discussing;
            p.reference_agent_id = Some(*reference_agent_id);
            p.planner_agent_id = Some(record.id);
        })?;

        let prompt = prompts::discussion(&plan);
        let terminal_id = self.terminals.create(&record.id, Some(prompt), vec![]).await?;
        let tab_id = self.state.tab_for_agent(&record.id);
        let _ = self.state.add_agent_to_tab(&record.id, &tab_id, None);
        self.watch_for_exit(terminal_id, *plan_id, record.id, ExitAction::MarkDiscussed);

        Ok(plan)
    }

    pub fn cancel_discussion(&self, plan_id: &PlanId) -> Result<Plan, EngineError> {
        let plan = self.require_plan(plan_id)?;
        if plan.status != PlanStatus::Discussing {
            return Err(EngineError::InvalidState(format!(
                "no discussion in progress ({})",
                plan.status
            )));
        }
        if let Some(agent_id) = plan.planner_agent_id {
            self.remove_plan_agent(&agent_id);
        }
        self.update_plan(plan_id, |p| {
            p.status = PlanStatus::Draft;
            p.planner_agent_id = None;
        })
    }

    /// Start executing a plan. Idempotent under a per-plan guard: a second
    /// call while the first is still setting up is a no-op.
    pub async fn execute_plan(
        &self,
        plan_id: &PlanId,
        reference_agent_id: &AgentId,
    ) -> Result<Plan, EngineError> {
        {
            let mut inner = self.inner.lock();
            let plan = inner
                .plans
                .get(plan_id)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(format!("plan {}", plan_id)))?;
            // Guard first: a second call while setup is in flight is a no-op,
            // not an error.
            if inner.executing.contains(plan_id) {
                tracing::debug!(plan = %plan_id, "execute already in flight");
                return Ok(plan);
            }
            if !plan.status.can_execute() {
                return Err(EngineError::InvalidState(format!(
                    "plan {} cannot execute from {}",
                    plan_id, plan.status
                )));
            }
            inner.executing.insert(*plan_id);
        }

        let result = self.execute_inner(plan_id, reference_agent_id).await;
        self.inner.lock().executing.remove(plan_id);

        if let Err(ref e) = result {
            self.activity_with_details(
                plan_id,
                ActivityKind::Error,
                "plan start failed",
                Some(e.to_string()),
            );
            // A fatal start is handled like a cancel: whatever was created
            // is torn down and the plan lands on failed.
            if self.cancel_plan(plan_id).is_err() {
                let _ = self.set_status(plan_id, PlanStatus::Failed);
            }
        }
        result
    }

    async fn execute_inner(
        &self,
        plan_id: &PlanId,
        reference_agent_id: &AgentId,
    ) -> Result<Plan, EngineError> {
        let reference = self.agents.require(reference_agent_id)?;

        // 1. Record the reference agent and enter delegating.
        let plan = self.update_plan(plan_id, |p| {
            p.status = PlanStatus::Delegating;
            p.reference_agent_id = Some(*reference_agent_id);
        })?;
        self.activity(plan_id, ActivityKind::Info, "plan execution started");

        // 2. Task store for this plan. Failure here is plan-fatal. The plan
        //    directory doubles as the orchestrator's and planner's cwd.
        let plan_dir = self.plan_dir(plan_id);
        std::fs::create_dir_all(&plan_dir)
            .map_err(|e| EngineError::ResourceUnavailable(format!("plan dir: {}", e)))?;
        self.taskstore.ensure(&plan_dir).await?;

        // Epic grouping the plan's tasks, created once.
        let epic_id = match plan.epic_id.clone() {
            Some(epic) => epic,
            None => {
                let epic = self
                    .taskstore
                    .create(
                        &plan_dir,
                        CreateTask {
                            title: plan.title.clone(),
                            task_type: Some("epic".to_string()),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.update_plan(plan_id, |p| p.epic_id = Some(epic.clone()))?;
                epic
            }
        };

        // 3. The plan tab exists (and is announced) before any worker can be
        //    dispatched, so headless workers always have a routing target.
        let tab = self.state.create_plan_tab(&plan.title, *plan_id);
        let plan = self.update_plan(plan_id, |p| p.orchestrator_tab_id = Some(tab.id))?;

        // 4. Orchestrator and planner, both rooted at the plan directory.
        let orchestrator = {
            let mut record =
                AgentRecord::new(format!("{} (orchestrator)", plan.title), &plan_dir)
                    .with_role(AgentRole::Orchestrator);
            record.parent_plan_id = Some(*plan_id);
            self.agents.save(record)
        };
        let planner = {
            let mut record = AgentRecord::new(format!("{} (planner)", plan.title), &plan_dir)
                .with_role(AgentRole::Planner);
            record.parent_plan_id = Some(*plan_id);
            self.agents.save(record)
        };
        let plan = self.update_plan(plan_id, |p| {
            p.orchestrator_agent_id = Some(orchestrator.id);
            p.planner_agent_id = Some(planner.id);
        })?;

        let orchestrator_prompt = prompts::orchestrator(&plan, &epic_id);
        self.terminals
            .create(&orchestrator.id, Some(orchestrator_prompt), vec![])
            .await?;
        self.state.add_agent_to_tab(&orchestrator.id, &tab.id, None)?;

        let planner_prompt = prompts::planner(&plan, &epic_id, &self.agents.list());
        let planner_terminal = self
            .terminals
            .create(
                &planner.id,
                Some(planner_prompt),
                vec![reference.directory.clone()],
            )
            .await?;
        self.state.add_agent_to_tab(&planner.id, &tab.id, None)?;

        // 5. The planner is transient: cleaned up the moment it says goodbye.
        self.watch_for_exit(planner_terminal, *plan_id, planner.id, ExitAction::CleanupPlanner);

        // 6. Poll loop.
        self.start_poller(*plan_id);

        self.activity(plan_id, ActivityKind::Info, "orchestrator and planner started");
        Ok(plan)
    }

    /// Re-run a terminal plan: back to draft, then execute with the stored
    /// reference agent.
    pub async fn restart_plan(&self, plan_id: &PlanId) -> Result<Plan, EngineError> {
        let plan = self.require_plan(plan_id)?;
        if !plan.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "restart requires a finished plan, got {}",
                plan.status
            )));
        }
        let reference = plan
            .reference_agent_id
            .ok_or_else(|| EngineError::InvalidState("plan has no reference agent".into()))?;
        self.update_plan(plan_id, |p| {
            p.status = PlanStatus::Draft;
            p.orchestrator_agent_id = None;
            p.orchestrator_tab_id = None;
            p.planner_agent_id = None;
        })?;
        self.execute_plan(plan_id, &reference).await
    }

    /// Watch a terminal's output for the assistant's farewell and run the
    /// follow-up action once it appears (or the terminal dies).
    pub(crate) fn watch_for_exit(
        &self,
        terminal_id: TerminalId,
        plan_id: PlanId,
        agent_id: AgentId,
        action: ExitAction,
    ) {
        let Some(mut rx) = self.terminals.observe(&terminal_id) else { return };
        let Some(manager) = self.self_ref.upgrade() else { return };
        tokio::spawn(async move {
            let mut scanner = MarkerScanner::new();
            loop {
                match rx.recv().await {
                    Ok(chunk) => {
                        if scanner.feed(&chunk).contains(&Marker::Exit) {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            manager.on_watched_exit(plan_id, agent_id, action);
        });
    }

    pub(crate) fn on_watched_exit(
        &self,
        plan_id: PlanId,
        agent_id: AgentId,
        action: ExitAction,
    ) {
        match action {
            ExitAction::CleanupPlanner => {
                self.remove_plan_agent(&agent_id);
                let _ = self.update_plan(&plan_id, |p| {
                    if p.planner_agent_id == Some(agent_id) {
                        p.planner_agent_id = None;
                    }
                });
                self.activity(&plan_id, ActivityKind::Info, "planner finished and was cleaned up");
            }
            ExitAction::MarkDiscussed => {
                self.remove_plan_agent(&agent_id);
                let _ = self.update_plan(&plan_id, |p| {
                    if p.status == PlanStatus::Discussing {
                        p.status = PlanStatus::Discussed;
                    }
                    p.planner_agent_id = None;
                });
            }
            ExitAction::WorkerDone(task_id) => {
                let _ = self.update_plan(&plan_id, |p| {
                    if let Some(worktree) = p.worktree_for_task_mut(&task_id) {
                        if worktree.status == bm_core::WorktreeStatus::Active {
                            worktree.status = bm_core::WorktreeStatus::ReadyForReview;
                        }
                    }
                });
            }
        }
    }

    /// Close a plan agent's terminal, unplace it, and delete its record.
    pub(crate) fn remove_plan_agent(&self, agent_id: &AgentId) {
        if let Some(terminal_id) = self.terminals.terminal_for_agent(agent_id) {
            let terminals = &self.terminals;
            terminals.close(&terminal_id);
        }
        self.state.remove_agent_from_tab(agent_id);
        self.state.mark_agent_inactive(agent_id);
        self.agents.delete(agent_id);
    }
}

/// What to do when a watched terminal says goodbye.
#[derive(Debug, Clone)]
pub(crate) enum ExitAction {
    CleanupPlanner,
    MarkDiscussed,
    WorkerDone(TaskId),
}
