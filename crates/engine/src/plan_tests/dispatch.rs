// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{draft_plan, execute, plan_harness};
use bm_core::{
    ActivityKind, AssignmentStatus, DispatchMode, Event, PlanStatus, WorktreeStatus,
};

#[tokio::test]
async fn ready_task_gets_a_worktree_and_an_interactive_worker() {
    let (mut h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "one task");
    let plan = execute(&h, &plan.id, &reference).await;
    let plan_dir = h.plan_dir(&plan.id);

    let task = h
        .taskstore
        .seed_task(&plan_dir, "fix the bug", &["bismark-ready", "repo:r1", "worktree:fix-a"]);

    // Poll loop picks the task up and dispatches.
    h.wait_until("assignment sent", || {
        h.runtime
            .plans
            .assignments(&plan.id)
            .iter()
            .any(|a| a.task_id == task && a.status == AssignmentStatus::Sent)
    })
    .await;

    let plan_now = h.runtime.plans.get_plan(&plan.id).unwrap();
    let worktree = plan_now.worktree_for_task(&task).unwrap();
    assert!(worktree.path.ends_with("worktrees/r1/fix-a"));
    assert!(worktree.path.is_dir());
    assert!(worktree.branch.starts_with("bismark/"));
    assert_eq!(worktree.status, WorktreeStatus::Active);

    // Worker agent bound to the task, placed in the plan tab.
    let worker = h.runtime.agents.for_task(&plan.id, &task).unwrap();
    assert_eq!(worker.worktree_path.as_deref(), Some(worktree.path.as_path()));
    let tab = h.runtime.state.tab(&plan_now.orchestrator_tab_id.unwrap()).unwrap();
    assert!(tab.contains(&worker.id));

    // Task relabelled ready → sent.
    let labels = h.taskstore.labels_of(&plan_dir, &task);
    assert!(labels.contains(&"bismark-sent".to_string()));
    assert!(!labels.contains(&"bismark-ready".to_string()));

    // The plan left delegating once the worker was live.
    h.wait_until("in_progress", || {
        h.runtime.plans.get_plan(&plan.id).unwrap().status == PlanStatus::InProgress
    })
    .await;
    h.drain_events();
}

#[tokio::test]
async fn closing_the_task_exits_the_worker_and_completes_the_assignment() {
    let (mut h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "close it");
    let plan = execute(&h, &plan.id, &reference).await;
    let plan_dir = h.plan_dir(&plan.id);

    let task =
        h.taskstore
            .seed_task(&plan_dir, "t", &["bismark-ready", "repo:r1", "worktree:fix-a"]);
    h.wait_until("worker terminal up", || h.pty.spawn_count() == 3).await;

    h.taskstore.close_task(&plan_dir, &task);
    h.wait_until("assignment completed", || {
        h.runtime
            .plans
            .assignments(&plan.id)
            .iter()
            .any(|a| a.task_id == task && a.status == AssignmentStatus::Completed)
    })
    .await;

    // The interactive worker was told to leave.
    let worker_handle = h.pty.session(2).unwrap();
    assert!(worker_handle.written().contains("/exit"));

    // All tasks closed ⇒ ready for review.
    h.wait_until("ready_for_review", || {
        h.runtime.plans.get_plan(&plan.id).unwrap().status == PlanStatus::ReadyForReview
    })
    .await;
    h.drain_events();
}

#[tokio::test]
async fn admission_bound_holds_with_simultaneous_ready_tasks() {
    let (mut h, reference, _repo) = plan_harness().await;
    let mut plan = draft_plan(&h, "one at a time");
    plan = h
        .runtime
        .plans
        .update_plan(&plan.id, |p| p.max_parallel_agents = 1)
        .unwrap();
    let plan = execute(&h, &plan.id, &reference).await;
    let plan_dir = h.plan_dir(&plan.id);

    let t1 = h.taskstore.seed_task(&plan_dir, "a", &["bismark-ready", "repo:r1", "worktree:a"]);
    let t2 = h.taskstore.seed_task(&plan_dir, "b", &["bismark-ready", "repo:r1", "worktree:b"]);
    let t3 = h.taskstore.seed_task(&plan_dir, "c", &["bismark-ready", "repo:r1", "worktree:c"]);

    h.wait_until("first dispatch", || {
        h.runtime.plans.assignments(&plan.id).iter().any(|a| a.status.is_active())
    })
    .await;

    // Several polls later the bound still holds.
    for _ in 0..3 {
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        let active = h
            .runtime
            .plans
            .assignments(&plan.id)
            .iter()
            .filter(|a| a.status.is_active())
            .count();
        assert!(active <= 1, "admission bound exceeded: {active}");
    }

    // Finishing the first admits the second, and so on.
    for expected_done in 1..=3u32 {
        let active: Vec<_> = h
            .runtime
            .plans
            .assignments(&plan.id)
            .into_iter()
            .filter(|a| a.status.is_active())
            .collect();
        assert_eq!(active.len(), 1);
        h.taskstore.close_task(&plan_dir, &active[0].task_id);
        h.wait_until("assignment completed", || {
            h.runtime
                .plans
                .assignments(&plan.id)
                .iter()
                .filter(|a| a.status == AssignmentStatus::Completed)
                .count()
                == expected_done as usize
        })
        .await;
        if expected_done < 3 {
            h.wait_until("next dispatch", || {
                h.runtime.plans.assignments(&plan.id).iter().any(|a| a.status.is_active())
            })
            .await;
        }
    }

    let all = h.runtime.plans.assignments(&plan.id);
    assert!([&t1, &t2, &t3]
        .iter()
        .all(|t| all.iter().any(|a| &&a.task_id == t && a.status == AssignmentStatus::Completed)));
    h.drain_events();
}

#[tokio::test]
async fn missing_labels_warn_and_do_not_assign() {
    let (mut h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "unlabelled");
    let plan = execute(&h, &plan.id, &reference).await;
    let plan_dir = h.plan_dir(&plan.id);

    h.taskstore.seed_task(&plan_dir, "no labels", &["bismark-ready"]);
    h.wait_until("warning activity", || {
        h.runtime
            .plans
            .activities(&plan.id)
            .iter()
            .any(|a| a.kind == ActivityKind::Warning && a.message.contains("missing repo/worktree"))
    })
    .await;
    assert!(h.runtime.plans.assignments(&plan.id).is_empty());
    h.drain_events();
}

#[tokio::test]
async fn unknown_repo_label_warns() {
    let (mut h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "ghost repo");
    let plan = execute(&h, &plan.id, &reference).await;
    let plan_dir = h.plan_dir(&plan.id);

    h.taskstore
        .seed_task(&plan_dir, "t", &["bismark-ready", "repo:ghost", "worktree:x"]);
    h.wait_until("warning activity", || {
        h.runtime
            .plans
            .activities(&plan.id)
            .iter()
            .any(|a| a.kind == ActivityKind::Warning && a.message.contains("unknown repository"))
    })
    .await;
    assert!(h.runtime.plans.assignments(&plan.id).is_empty());
    h.drain_events();
}

#[tokio::test]
async fn headless_dispatch_launches_a_container_and_result_completes_it() {
    let (mut h, reference, _repo) = plan_harness().await;
    h.runtime.store.write_token("tok-test").unwrap();

    let mut plan = draft_plan(&h, "headless");
    plan = h
        .runtime
        .plans
        .update_plan(&plan.id, |p| p.dispatch_mode = DispatchMode::Headless)
        .unwrap();
    let plan = execute(&h, &plan.id, &reference).await;
    let plan_dir = h.plan_dir(&plan.id);

    let task =
        h.taskstore
            .seed_task(&plan_dir, "t", &["bismark-ready", "repo:r1", "worktree:hw"]);

    h.expect_event("headless started", |e| {
        matches!(e, Event::HeadlessAgentStarted { task_id, plan_id, .. }
            if task_id == &task && plan_id == &Some(plan.id))
    })
    .await;

    h.wait_until("assignment sent", || {
        h.runtime
            .plans
            .assignments(&plan.id)
            .iter()
            .any(|a| a.task_id == task && a.status == AssignmentStatus::Sent)
    })
    .await;

    // The worker reports success and the stream ends.
    let name = crate::headless::HeadlessRuntime::container_name(&task);
    let container = h.containers.take_container(&name).unwrap();
    container
        .emit_line(r#"{"type":"result","timestamp":"t","success":true,"exit_code":0}"#)
        .await;
    container.finish(Some(0));

    h.wait_until("assignment completed via outcome", || {
        h.runtime
            .plans
            .assignments(&plan.id)
            .iter()
            .any(|a| a.task_id == task && a.status == AssignmentStatus::Completed)
    })
    .await;

    let plan_now = h.runtime.plans.get_plan(&plan.id).unwrap();
    assert_eq!(
        plan_now.worktree_for_task(&task).unwrap().status,
        WorktreeStatus::ReadyForReview
    );
    h.drain_events();
}

#[tokio::test]
async fn completion_finalizes_feature_branch_strategy() {
    let (mut h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "finalize");
    let plan = execute(&h, &plan.id, &reference).await;
    let plan_dir = h.plan_dir(&plan.id);

    let task =
        h.taskstore
            .seed_task(&plan_dir, "t", &["bismark-ready", "repo:r1", "worktree:w"]);
    h.wait_until("worker terminal up", || h.pty.spawn_count() == 3).await;
    h.taskstore.close_task(&plan_dir, &task);
    h.wait_until("ready_for_review", || {
        h.runtime.plans.get_plan(&plan.id).unwrap().status == PlanStatus::ReadyForReview
    })
    .await;

    let plan_done = h.runtime.plans.complete_plan(&plan.id).await.unwrap();
    assert_eq!(plan_done.status, PlanStatus::Completed);

    // Branch folded into the plan's feature branch, worktree cleaned.
    let feature = plan_done.feature_branch.clone().unwrap();
    assert!(h.git.ff_merges().iter().any(|(target, _)| target == &feature));
    assert!(!h.git.rebases().is_empty());
    assert!(plan_done.worktrees.iter().all(|w| w.status == WorktreeStatus::Cleaned));
    assert!(!plan_done.git_summary.commits.is_empty());

    // Plan tab and plan-owned agents are gone.
    assert!(plan_done.orchestrator_tab_id.is_none());
    assert!(h.runtime.agents.for_plan(&plan.id).is_empty());
    assert!(h
        .runtime
        .state
        .snapshot()
        .tabs
        .iter()
        .all(|t| t.plan_id != Some(plan.id)));
    h.drain_events();
}

#[tokio::test]
async fn completion_pushes_branches_for_raise_prs() {
    let (mut h, reference, _repo) = plan_harness().await;
    let mut plan = draft_plan(&h, "prs");
    plan = h
        .runtime
        .plans
        .update_plan(&plan.id, |p| p.branch_strategy = bm_core::BranchStrategy::RaisePrs)
        .unwrap();
    let plan = execute(&h, &plan.id, &reference).await;
    let plan_dir = h.plan_dir(&plan.id);

    let task =
        h.taskstore
            .seed_task(&plan_dir, "t", &["bismark-ready", "repo:r1", "worktree:w"]);
    h.wait_until("worker terminal up", || h.pty.spawn_count() == 3).await;
    h.taskstore.close_task(&plan_dir, &task);
    h.wait_until("ready_for_review", || {
        h.runtime.plans.get_plan(&plan.id).unwrap().status == PlanStatus::ReadyForReview
    })
    .await;

    h.runtime.plans.complete_plan(&plan.id).await.unwrap();
    assert_eq!(h.git.pushed_branches().len(), 1);
    h.drain_events();
}
