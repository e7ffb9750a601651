// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-phase cancellation.
//!
//! Phase A is fast and synchronous with the request: kill every plan-owned
//! agent, drop the plan tab, mark the plan failed. Phase B runs detached and
//! may take a while: remove and prune worktrees, marking each `cleaned`.
//! Worktree cleanup failures are activity-logged, never fatal.

use super::PlanManager;
use crate::error::EngineError;
use bm_core::{ActivityKind, Plan, PlanId, PlanStatus, WorktreeStatus};

impl PlanManager {
    pub fn cancel_plan(&self, plan_id: &PlanId) -> Result<Plan, EngineError> {
        let plan = self.require_plan(plan_id)?;
        if !plan.status.can_cancel() {
            return Err(EngineError::InvalidState(format!(
                "plan {} already {}",
                plan_id, plan.status
            )));
        }

        // --- Phase A: stop everything owned by the plan, fast. ---
        self.stop_poller(plan_id);
        self.headless.stop_all_for_plan(plan_id);

        for agent in self.agents.for_plan(plan_id) {
            self.remove_plan_agent(&agent.id);
        }
        if let Some(tab_id) = plan.orchestrator_tab_id {
            let _ = self.state.delete_tab(&tab_id);
        }

        let plan = self.update_plan(plan_id, |p| {
            p.status = PlanStatus::Failed;
            p.orchestrator_agent_id = None;
            p.planner_agent_id = None;
            p.orchestrator_tab_id = None;
        })?;
        self.activity(plan_id, ActivityKind::Warning, "plan cancelled");

        // --- Phase B: worktree cleanup, detached. ---
        if let Some(manager) = self.self_ref.upgrade() {
            let plan_id = *plan_id;
            tokio::spawn(async move {
                manager.cleanup_worktrees(plan_id).await;
            });
        }

        Ok(plan)
    }

    pub(crate) async fn cleanup_worktrees(&self, plan_id: PlanId) {
        let worktrees: Vec<_> = match self.get_plan(&plan_id) {
            Some(plan) => plan
                .worktrees
                .iter()
                .filter(|w| w.status != WorktreeStatus::Cleaned)
                .cloned()
                .collect(),
            None => return,
        };

        for worktree in worktrees {
            let removed = match self.repos.by_id(&worktree.repo_id) {
                Some(repo) => {
                    let result = self.git.remove_worktree(&repo.root, &worktree.path, true).await;
                    if result.is_ok() {
                        let _ = self.git.prune_worktrees(&repo.root).await;
                    }
                    result
                }
                None => {
                    // Repository record is gone; fall back to a plain delete.
                    std::fs::remove_dir_all(&worktree.path).map_err(|e| {
                        bm_adapters::GitError::Command {
                            op: "remove".into(),
                            message: e.to_string(),
                        }
                    })
                }
            };

            match removed {
                Ok(()) => {
                    let _ = self.update_plan(&plan_id, |p| {
                        if let Some(w) = p.worktree_for_task_mut(&worktree.task_id) {
                            w.status = WorktreeStatus::Cleaned;
                        }
                    });
                    self.activity(
                        &plan_id,
                        ActivityKind::Info,
                        format!("worktree for {} cleaned", worktree.task_id),
                    );
                }
                Err(e) => {
                    self.activity_with_details(
                        &plan_id,
                        ActivityKind::Warning,
                        format!("worktree cleanup for {} failed", worktree.task_id),
                        Some(e.to_string()),
                    );
                }
            }
        }
    }
}
