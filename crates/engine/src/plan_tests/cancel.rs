// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{draft_plan, execute, plan_harness};
use bm_core::{ActivityKind, AssignmentStatus, PlanStatus, WorktreeStatus};

#[tokio::test]
async fn cancel_kills_agents_drops_the_tab_and_cleans_worktrees() {
    let (mut h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "doomed");
    let plan = execute(&h, &plan.id, &reference).await;
    let plan_dir = h.plan_dir(&plan.id);

    let task =
        h.taskstore
            .seed_task(&plan_dir, "t", &["bismark-ready", "repo:r1", "worktree:w"]);
    h.wait_until("worker dispatched", || {
        h.runtime
            .plans
            .assignments(&plan.id)
            .iter()
            .any(|a| a.task_id == task && a.status == AssignmentStatus::Sent)
    })
    .await;
    let worktree_path = h
        .runtime
        .plans
        .get_plan(&plan.id)
        .unwrap()
        .worktree_for_task(&task)
        .unwrap()
        .path
        .clone();
    assert!(worktree_path.is_dir());

    // Phase A is synchronous with the call.
    let cancelled = h.runtime.plans.cancel_plan(&plan.id).unwrap();
    assert_eq!(cancelled.status, PlanStatus::Failed);
    assert!(h.runtime.agents.for_plan(&plan.id).is_empty());
    assert!(h
        .runtime
        .state
        .snapshot()
        .tabs
        .iter()
        .all(|t| t.plan_id != Some(plan.id)));

    // Phase B cleans the worktrees and logs per-worktree activities.
    h.wait_until("worktree cleaned", || {
        h.runtime
            .plans
            .get_plan(&plan.id)
            .unwrap()
            .worktrees
            .iter()
            .all(|w| w.status == WorktreeStatus::Cleaned)
    })
    .await;
    assert!(!worktree_path.exists());
    assert!(h
        .runtime
        .plans
        .activities(&plan.id)
        .iter()
        .any(|a| a.message.contains("worktree for") && a.message.contains("cleaned")));
    h.drain_events();
}

#[tokio::test]
async fn cancel_with_two_headless_workers_stops_both_containers() {
    let (mut h, reference, _repo) = plan_harness().await;
    h.runtime.store.write_token("tok").unwrap();
    let mut plan = draft_plan(&h, "two headless");
    plan = h
        .runtime
        .plans
        .update_plan(&plan.id, |p| p.dispatch_mode = bm_core::DispatchMode::Headless)
        .unwrap();
    let plan = execute(&h, &plan.id, &reference).await;
    let plan_dir = h.plan_dir(&plan.id);

    let t1 = h.taskstore.seed_task(&plan_dir, "a", &["bismark-ready", "repo:r1", "worktree:a"]);
    let t2 = h.taskstore.seed_task(&plan_dir, "b", &["bismark-ready", "repo:r1", "worktree:b"]);

    h.wait_until("both dispatched", || {
        let assignments = h.runtime.plans.assignments(&plan.id);
        [&t1, &t2].iter().all(|t| {
            assignments
                .iter()
                .any(|a| &&a.task_id == t && a.status == AssignmentStatus::Sent)
        })
    })
    .await;

    h.runtime.plans.cancel_plan(&plan.id).unwrap();

    h.wait_until("both containers stopped", || h.containers.stopped_names().len() >= 2)
        .await;
    assert_eq!(h.runtime.plans.get_plan(&plan.id).unwrap().status, PlanStatus::Failed);

    h.wait_until("worktrees cleaned", || {
        h.runtime
            .plans
            .get_plan(&plan.id)
            .unwrap()
            .worktrees
            .iter()
            .all(|w| w.status == WorktreeStatus::Cleaned)
    })
    .await;
    h.drain_events();
}

#[tokio::test]
async fn cancel_is_rejected_on_terminal_plans() {
    let (h, _reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "already done");
    h.runtime.plans.set_status(&plan.id, PlanStatus::Completed).unwrap();
    assert!(h.runtime.plans.cancel_plan(&plan.id).is_err());
}

#[tokio::test]
async fn worktree_cleanup_failure_is_logged_not_fatal() {
    let (mut h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "sticky worktree");
    let plan = execute(&h, &plan.id, &reference).await;
    let plan_dir = h.plan_dir(&plan.id);

    let task =
        h.taskstore
            .seed_task(&plan_dir, "t", &["bismark-ready", "repo:r1", "worktree:w"]);
    h.wait_until("dispatched", || {
        h.runtime.plans.assignments(&plan.id).iter().any(|a| a.task_id == task)
    })
    .await;

    h.git.fail_worktree_removal(true);
    h.runtime.plans.cancel_plan(&plan.id).unwrap();

    h.wait_until("cleanup failure logged", || {
        h.runtime
            .plans
            .activities(&plan.id)
            .iter()
            .any(|a| a.kind == ActivityKind::Warning && a.message.contains("cleanup"))
    })
    .await;
    // Plan already failed; the stuck worktree stays active on record.
    assert_eq!(h.runtime.plans.get_plan(&plan.id).unwrap().status, PlanStatus::Failed);
    h.drain_events();
}

#[tokio::test]
async fn restart_reenters_delegation() {
    let (mut h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "second wind");
    execute(&h, &plan.id, &reference).await;
    h.runtime.plans.cancel_plan(&plan.id).unwrap();
    assert_eq!(h.runtime.plans.get_plan(&plan.id).unwrap().status, PlanStatus::Failed);

    let restarted = h.runtime.plans.restart_plan(&plan.id).await.unwrap();
    assert_eq!(restarted.status, PlanStatus::Delegating);
    assert!(restarted.orchestrator_agent_id.is_some());
    h.drain_events();
}
