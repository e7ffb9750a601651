// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-plan polling loop against the external task store.

use super::PlanManager;
use crate::headless::HeadlessOutcome;
use bm_adapters::TaskFilter;
use bm_core::scrape::EXIT_COMMAND;
use bm_core::{
    ActivityKind, AssignmentStatus, HeadlessStatus, PlanId, PlanStatus, WorktreeStatus,
    READY_LABEL,
};
use tokio_util::sync::CancellationToken;

impl PlanManager {
    /// Start the 5-second poll loop for a plan. One loop per plan; starting
    /// twice is a no-op.
    pub(crate) fn start_poller(&self, plan_id: PlanId) {
        let token = CancellationToken::new();
        {
            let mut inner = self.inner.lock();
            if inner.pollers.contains_key(&plan_id) {
                return;
            }
            inner.pollers.insert(plan_id, token.clone());
        }

        let Some(manager) = self.self_ref.upgrade() else {
            self.inner.lock().pollers.remove(&plan_id);
            return;
        };
        let interval = self.config.poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                match manager.get_plan(&plan_id) {
                    Some(plan) if plan.status.is_polling() => {
                        if let Err(e) = manager.poll_once(&plan_id).await {
                            tracing::warn!(plan = %plan_id, error = %e, "poll tick failed");
                        }
                    }
                    _ => break,
                }
            }
            manager.inner.lock().pollers.remove(&plan_id);
            tracing::debug!(plan = %plan_id, "poller stopped");
        });
    }

    pub(crate) fn stop_poller(&self, plan_id: &PlanId) {
        if let Some(token) = self.inner.lock().pollers.remove(plan_id) {
            token.cancel();
        }
    }

    /// Resume pollers for plans that were active when the daemon stopped.
    pub fn resume_pollers(&self) {
        let active: Vec<PlanId> = {
            let inner = self.inner.lock();
            inner
                .plans
                .values()
                .filter(|p| p.status.is_polling())
                .map(|p| p.id)
                .collect()
        };
        for plan_id in active {
            self.start_poller(plan_id);
        }
    }

    /// One poll tick: dispatch newly ready tasks, retire closed ones, and
    /// recompute the plan status.
    pub async fn poll_once(&self, plan_id: &PlanId) -> Result<(), crate::error::EngineError> {
        let plan = self.require_plan(plan_id)?;
        if !plan.status.is_polling() {
            return Ok(());
        }
        let plan_dir = self.plan_dir(plan_id);

        // (a) Open tasks the orchestrator marked ready, not yet assigned.
        let ready = self
            .taskstore
            .list(
                &plan_dir,
                TaskFilter { label: Some(READY_LABEL.to_string()), ..Default::default() },
            )
            .await?;
        for task in ready.iter().filter(|t| t.is_open()) {
            let already_assigned = self
                .assignments(plan_id)
                .iter()
                .any(|a| a.task_id == task.id);
            if already_assigned {
                continue;
            }
            if let Err(e) = self.process_ready_task(plan_id, task).await {
                // Per-task failures never fail the plan; the next tick
                // retries whatever is still labelled ready.
                self.activity_with_details(
                    plan_id,
                    ActivityKind::Error,
                    format!("dispatch of {} failed", task.id),
                    Some(e.to_string()),
                );
            }
        }

        // (b) Closed tasks whose assignment is still live.
        let closed = self
            .taskstore
            .list(&plan_dir, TaskFilter { closed: true, ..Default::default() })
            .await?;
        for task in &closed {
            let assignment = self
                .assignments(plan_id)
                .into_iter()
                .find(|a| a.task_id == task.id);
            let Some(mut assignment) = assignment else { continue };
            if !matches!(
                assignment.status,
                AssignmentStatus::Sent | AssignmentStatus::InProgress
            ) {
                continue;
            }

            assignment.status = AssignmentStatus::Completed;
            assignment.completed_at_ms = Some(self.clock.epoch_ms());
            self.save_assignment(plan_id, assignment.clone());
            self.activity(
                plan_id,
                ActivityKind::Success,
                format!("task {} completed", task.id),
            );

            // Interactive workers are told to leave; headless completion is
            // driven by the stream's result event instead.
            if let Some(worker) = self.agents.for_task(plan_id, &task.id) {
                if !worker.role.is_headless() {
                    if let Some(terminal_id) = self.terminals.terminal_for_agent(&worker.id) {
                        self.terminals
                            .write(&terminal_id, format!("{}\r", EXIT_COMMAND).as_bytes());
                    }
                }
            }

            let _ = self.update_plan(plan_id, |p| {
                if let Some(worktree) = p.worktree_for_task_mut(&task.id) {
                    if worktree.status == WorktreeStatus::Active {
                        worktree.status = WorktreeStatus::ReadyForReview;
                    }
                }
            });
        }

        // (c) Status recomputation. The epic is bookkeeping, not work; it
        // does not count towards open/closed totals.
        let open = self.taskstore.list(&plan_dir, TaskFilter::default()).await?;
        let epic = self.require_plan(plan_id)?.epic_id;
        let open_count = open.iter().filter(|t| Some(&t.id) != epic.as_ref()).count();
        let closed_count = closed.iter().filter(|t| Some(&t.id) != epic.as_ref()).count();
        let any_active = self
            .assignments(plan_id)
            .iter()
            .any(|a| matches!(a.status, AssignmentStatus::Sent | AssignmentStatus::InProgress));

        let plan = self.require_plan(plan_id)?;
        if plan.status == PlanStatus::Delegating && any_active {
            self.set_status(plan_id, PlanStatus::InProgress)?;
            self.activity(plan_id, ActivityKind::Info, "first worker is running");
        }

        if open_count == 0 && closed_count > 0 {
            let plan = self.require_plan(plan_id)?;
            if plan.status.is_polling() {
                self.set_status(plan_id, PlanStatus::ReadyForReview)?;
                self.activity(
                    plan_id,
                    ActivityKind::Success,
                    "all tasks closed; plan is ready for review",
                );
                self.stop_poller(plan_id);
            }
        }

        Ok(())
    }

    /// A headless run reached a terminal state; settle its assignment.
    pub fn on_headless_outcome(&self, outcome: HeadlessOutcome) {
        let Some(plan_id) = outcome.plan_id else { return };
        let assignment = self
            .assignments(&plan_id)
            .into_iter()
            .find(|a| a.task_id == outcome.task_id);
        let Some(mut assignment) = assignment else { return };
        if !assignment.status.is_active() {
            return;
        }

        assignment.status = match outcome.status {
            HeadlessStatus::Completed => AssignmentStatus::Completed,
            _ => AssignmentStatus::Failed,
        };
        assignment.completed_at_ms = Some(self.clock.epoch_ms());
        self.save_assignment(&plan_id, assignment);

        let kind = match outcome.status {
            HeadlessStatus::Completed => ActivityKind::Success,
            _ => ActivityKind::Error,
        };
        self.activity(
            &plan_id,
            kind,
            format!("headless worker for {} finished ({})", outcome.task_id, outcome.status),
        );

        let _ = self.update_plan(&plan_id, |p| {
            if let Some(worktree) = p.worktree_for_task_mut(&outcome.task_id) {
                if worktree.status == WorktreeStatus::Active {
                    worktree.status = WorktreeStatus::ReadyForReview;
                }
            }
        });
    }
}
