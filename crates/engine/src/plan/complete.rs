// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion finalization: integrate worker branches, then tear down.

use super::PlanManager;
use crate::error::EngineError;
use bm_core::{
    ActivityKind, BranchStrategy, Plan, PlanId, PlanStatus, WorktreeStatus,
};

impl PlanManager {
    /// User-confirmed completion: `ready_for_review → completed`.
    ///
    /// Integrates every non-cleaned worktree per the branch strategy,
    /// removes worktrees, deletes plan-owned agents, and drops the plan tab.
    pub async fn complete_plan(&self, plan_id: &PlanId) -> Result<Plan, EngineError> {
        let plan = self.require_plan(plan_id)?;
        if plan.status != PlanStatus::ReadyForReview {
            return Err(EngineError::InvalidState(format!(
                "complete requires ready_for_review, got {}",
                plan.status
            )));
        }

        let worktrees: Vec<_> = plan
            .worktrees
            .iter()
            .filter(|w| w.status != WorktreeStatus::Cleaned)
            .cloned()
            .collect();

        for worktree in &worktrees {
            let Some(repo) = self.repos.by_id(&worktree.repo_id) else {
                self.activity(
                    plan_id,
                    ActivityKind::Warning,
                    format!("repository {} vanished; skipping {}", worktree.repo_id, worktree.branch),
                );
                continue;
            };

            match plan.branch_strategy {
                BranchStrategy::FeatureBranch => {
                    let feature = plan
                        .feature_branch
                        .clone()
                        .unwrap_or_else(|| format!("bismark/{}/integration", plan_id.short8()));

                    if let Err(e) =
                        self.git.fetch_and_rebase(&worktree.path, &plan.base_branch).await
                    {
                        self.activity_with_details(
                            plan_id,
                            ActivityKind::Error,
                            format!("rebase of {} failed", worktree.branch),
                            Some(e.to_string()),
                        );
                        continue;
                    }
                    if let Err(e) = self.git.merge_ff(&repo.root, &feature, &worktree.branch).await
                    {
                        self.activity_with_details(
                            plan_id,
                            ActivityKind::Error,
                            format!("fast-forward of {} into {} failed", worktree.branch, feature),
                            Some(e.to_string()),
                        );
                        continue;
                    }

                    match self
                        .git
                        .commits_between(&repo.root, &plan.base_branch, &worktree.branch)
                        .await
                    {
                        Ok(commits) => {
                            let _ = self.update_plan(plan_id, |p| {
                                p.git_summary.commits.extend(commits.clone());
                            });
                        }
                        Err(e) => {
                            tracing::warn!(branch = %worktree.branch, error = %e, "commit listing failed");
                        }
                    }
                }
                BranchStrategy::RaisePrs => {
                    if let Err(e) = self.git.push_branch(&repo.root, &worktree.branch).await {
                        self.activity_with_details(
                            plan_id,
                            ActivityKind::Error,
                            format!("push of {} failed", worktree.branch),
                            Some(e.to_string()),
                        );
                    }
                    // PR URLs posted by headless workers are harvested from
                    // their event streams.
                    if let Some(url) = self.headless.pull_request_url(&worktree.task_id) {
                        let _ = self.update_plan(plan_id, |p| {
                            if !p.git_summary.pull_requests.contains(&url) {
                                p.git_summary.pull_requests.push(url.clone());
                            }
                        });
                    }
                }
            }

            if let Err(e) = self.git.remove_worktree(&repo.root, &worktree.path, true).await {
                self.activity_with_details(
                    plan_id,
                    ActivityKind::Warning,
                    format!("worktree removal for {} failed", worktree.task_id),
                    Some(e.to_string()),
                );
            }
            if let Err(e) = self.git.prune_worktrees(&repo.root).await {
                tracing::warn!(repo = %repo.name, error = %e, "worktree prune failed");
            }
            let _ = self.update_plan(plan_id, |p| {
                if let Some(w) = p.worktree_for_task_mut(&worktree.task_id) {
                    w.status = WorktreeStatus::Cleaned;
                }
            });
        }

        // Worker agents first, then the orchestration pair.
        for worktree in &worktrees {
            self.remove_plan_agent(&worktree.agent_id);
        }
        let plan = self.require_plan(plan_id)?;
        if let Some(agent_id) = plan.orchestrator_agent_id {
            self.remove_plan_agent(&agent_id);
        }
        if let Some(agent_id) = plan.planner_agent_id {
            self.remove_plan_agent(&agent_id);
        }

        if let Some(tab_id) = plan.orchestrator_tab_id {
            let _ = self.state.delete_tab(&tab_id);
        }

        self.stop_poller(plan_id);
        let plan = self.update_plan(plan_id, |p| {
            p.status = PlanStatus::Completed;
            p.orchestrator_agent_id = None;
            p.planner_agent_id = None;
            p.orchestrator_tab_id = None;
        })?;
        self.activity(plan_id, ActivityKind::Success, "plan completed");
        Ok(plan)
    }
}
