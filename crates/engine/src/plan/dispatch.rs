// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ready-task processing: admission, worktree allocation, worker dispatch.

use super::execute::ExitAction;
use super::{prompts, PlanManager};
use crate::error::EngineError;
use bm_adapters::TaskUpdate;
use bm_core::{
    slugify, ActivityKind, AgentRecord, AgentRole, AssignmentStatus, DispatchMode, PlanId,
    PlanWorktree, Task, TaskAssignment, WorktreeStatus, READY_LABEL, SENT_LABEL,
};

impl PlanManager {
    /// Dispatch one ready task, or return without doing anything when its
    /// labels are incomplete or the admission bound is reached.
    pub(crate) async fn process_ready_task(
        &self,
        plan_id: &PlanId,
        task: &Task,
    ) -> Result<(), EngineError> {
        let plan = self.require_plan(plan_id)?;

        // Preconditions: the orchestrator names the repo and worktree slug.
        // Missing labels are the orchestrator's to fix; no retry here.
        let (Some(repo_name), Some(slug)) = (task.repo_name(), task.worktree_slug()) else {
            self.activity(
                plan_id,
                ActivityKind::Warning,
                format!("task {} is ready but missing repo/worktree labels", task.id),
            );
            return Ok(());
        };
        let slug = slugify(slug);

        let Some(repo) = self.repos.by_name(repo_name) else {
            self.activity(
                plan_id,
                ActivityKind::Warning,
                format!("task {} names unknown repository {}", task.id, repo_name),
            );
            return Ok(());
        };

        // Admission: the bound counts pending reservations too, so the slot
        // is taken by creating the assignment before allocation starts.
        if self.active_assignment_count(plan_id) >= plan.max_parallel_agents as usize {
            tracing::debug!(plan = %plan_id, task = %task.id, "admission bound reached");
            return Ok(());
        }

        let mut worker = AgentRecord::new(
            format!("worker: {}", task.title),
            &repo.root, // placeholder until the worktree exists
        )
        .with_role(if plan.dispatch_mode == DispatchMode::Headless {
            AgentRole::Headless
        } else {
            AgentRole::TaskWorker
        });
        worker.parent_plan_id = Some(*plan_id);
        worker.task_id = Some(task.id.clone());

        let assignment = TaskAssignment::new(task.id.clone(), worker.id, self.clock.epoch_ms());
        self.save_assignment(plan_id, assignment);

        match self.allocate_and_dispatch(plan_id, &plan, task, &repo, &slug, worker).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Free the admission slot for the next poll's retry.
                self.remove_assignment(plan_id, &task.id);
                self.activity_with_details(
                    plan_id,
                    ActivityKind::Warning,
                    format!("worktree allocation for {} failed", task.id),
                    Some(e.to_string()),
                );
                Err(e)
            }
        }
    }

    async fn allocate_and_dispatch(
        &self,
        plan_id: &PlanId,
        plan: &bm_core::Plan,
        task: &Task,
        repo: &bm_core::Repository,
        slug: &str,
        mut worker: AgentRecord,
    ) -> Result<(), EngineError> {
        // Worktree on a unique branch off the plan's base.
        let base_name = format!("bismark/{}/{}", plan_id.short8(), slug);
        let branch = self.git.unique_branch_name(&repo.root, &base_name).await;
        let worktree_path = self
            .store
            .paths()
            .worktrees_dir(plan_id, &repo.name)
            .join(slug);
        self.git
            .create_worktree(&repo.root, &worktree_path, &branch, &plan.base_branch)
            .await?;

        worker.directory = worktree_path.clone();
        worker.worktree_path = Some(worktree_path.clone());
        let worker = self.agents.save(worker);

        self.update_plan(plan_id, |p| {
            p.worktrees.push(PlanWorktree {
                plan_id: *plan_id,
                task_id: task.id.clone(),
                repo_id: repo.id.clone(),
                path: worktree_path.clone(),
                branch: branch.clone(),
                agent_id: worker.id,
                status: WorktreeStatus::Active,
                created_at_ms: self.clock.epoch_ms(),
            });
        })?;

        let dispatched = match plan.dispatch_mode {
            DispatchMode::Interactive => {
                self.dispatch_interactive(plan_id, plan, task, &worker, &branch).await
            }
            DispatchMode::Headless => {
                self.dispatch_headless(plan_id, plan, task, &worker, &worktree_path).await
            }
        };
        if let Err(e) = dispatched {
            // Roll the allocation back so the next poll can retry cleanly.
            let _ = self.git.remove_worktree(&repo.root, &worktree_path, true).await;
            let _ = self.git.delete_branch(&repo.root, &branch, false).await;
            let _ = self.update_plan(plan_id, |p| {
                p.worktrees.retain(|w| w.task_id != task.id);
            });
            self.agents.delete(&worker.id);
            return Err(e);
        }

        // The worker is on its way: advance the reservation to `sent`.
        let mut assignment = self
            .assignments(plan_id)
            .into_iter()
            .find(|a| a.task_id == task.id)
            .unwrap_or_else(|| {
                TaskAssignment::new(task.id.clone(), worker.id, self.clock.epoch_ms())
            });
        assignment.status = AssignmentStatus::Sent;
        self.save_assignment(plan_id, assignment);

        let plan_dir = self.plan_dir(plan_id);
        if let Err(e) = self
            .taskstore
            .update(
                &plan_dir,
                &task.id,
                TaskUpdate {
                    add_labels: vec![SENT_LABEL.to_string()],
                    remove_labels: vec![READY_LABEL.to_string()],
                    assignee: Some(worker.name.clone()),
                    ..Default::default()
                },
            )
            .await
        {
            tracing::warn!(task = %task.id, error = %e, "relabel after dispatch failed");
        }

        self.activity(
            plan_id,
            ActivityKind::Info,
            format!("task {} dispatched to {} worker", task.id, plan.dispatch_mode_name()),
        );
        Ok(())
    }

    async fn dispatch_interactive(
        &self,
        plan_id: &PlanId,
        plan: &bm_core::Plan,
        task: &Task,
        worker: &AgentRecord,
        branch: &str,
    ) -> Result<(), EngineError> {
        let prompt = prompts::worker(plan, task, branch);
        let plan_dir = self.plan_dir(plan_id);
        let terminal_id = self
            .terminals
            .create(&worker.id, Some(prompt), vec![plan_dir])
            .await?;
        self.state.mark_agent_active(&worker.id);

        if let Some(tab_id) = plan.orchestrator_tab_id {
            self.state.add_agent_to_tab(&worker.id, &tab_id, None)?;
        }

        // Goodbye from the worker marks its worktree reviewable. Pushing is
        // completion finalization's call, not the worker's.
        self.watch_for_exit(
            terminal_id,
            *plan_id,
            worker.id,
            ExitAction::WorkerDone(task.id.clone()),
        );
        Ok(())
    }

    async fn dispatch_headless(
        &self,
        plan_id: &PlanId,
        plan: &bm_core::Plan,
        task: &Task,
        worker: &AgentRecord,
        worktree_path: &std::path::Path,
    ) -> Result<(), EngineError> {
        // Token first: resolve locally, fall back to the setup flow.
        let token = match bm_adapters::resolve_credential(self.store.read_token()) {
            Some(token) => token,
            None => {
                let token = bm_adapters::run_setup(&self.config.assistant_bin)
                    .await
                    .map_err(|e| EngineError::Auth(e.to_string()))?;
                if let Err(e) = self.store.write_token(&token) {
                    tracing::warn!(error = %e, "minted token could not be stored");
                }
                token
            }
        };

        // The proxy should be up so the container can reach host CLIs; a
        // degraded proxy is not fatal to dispatch.
        if let Err(e) = self.proxy.start().await {
            self.activity_with_details(
                plan_id,
                ActivityKind::Warning,
                "tool proxy unavailable; worker runs without host CLI access",
                Some(e.to_string()),
            );
        }

        let prompt = prompts::headless_worker(plan, task);
        self.headless
            .start(
                task.id.clone(),
                Some(*plan_id),
                worktree_path.to_path_buf(),
                prompt,
                token,
            )
            .await?;
        self.state.mark_agent_active(&worker.id);

        if let Some(tab_id) = plan.orchestrator_tab_id {
            self.state.add_agent_to_tab(&worker.id, &tab_id, None)?;
        }
        Ok(())
    }
}

trait DispatchModeName {
    fn dispatch_mode_name(&self) -> &'static str;
}

impl DispatchModeName for bm_core::Plan {
    fn dispatch_mode_name(&self) -> &'static str {
        match self.dispatch_mode {
            DispatchMode::Interactive => "interactive",
            DispatchMode::Headless => "headless",
        }
    }
}
