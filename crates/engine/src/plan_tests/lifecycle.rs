// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{draft_plan, execute, plan_harness};
use bm_core::{AgentRole, Event, PlanStatus};

#[tokio::test]
async fn execute_sets_up_tab_agents_and_epic() {
    let (mut h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "ship it");

    let plan = execute(&h, &plan.id, &reference).await;
    assert_eq!(plan.status, PlanStatus::Delegating);
    assert_eq!(plan.reference_agent_id, Some(reference.id));
    assert!(plan.epic_id.is_some());

    // Plan tab exists and holds orchestrator + planner.
    let tab_id = plan.orchestrator_tab_id.unwrap();
    let tab = h.runtime.state.tab(&tab_id).unwrap();
    assert!(tab.is_plan_tab);
    assert_eq!(tab.plan_id, Some(plan.id));
    assert_eq!(tab.agents.len(), 2);

    let orchestrator = h.runtime.agents.get(&plan.orchestrator_agent_id.unwrap()).unwrap();
    assert_eq!(orchestrator.role, AgentRole::Orchestrator);
    let planner = h.runtime.agents.get(&plan.planner_agent_id.unwrap()).unwrap();
    assert_eq!(planner.role, AgentRole::Planner);

    // Both PTYs spawned; prompts mention the epic id.
    h.wait_until("two terminals", || h.pty.spawn_count() == 2).await;
    let epic = plan.epic_id.clone().unwrap();
    let planner_handle = h.pty.session(1).unwrap();
    h.wait_until("planner launch line", || !planner_handle.written().is_empty()).await;
    assert!(planner_handle.written().contains(epic.as_str()));

    // The task store was initialized at the plan directory.
    assert_eq!(h.taskstore.ensured_dirs(), vec![h.plan_dir(&plan.id)]);
    h.drain_events();
}

#[tokio::test]
async fn plan_update_for_delegating_precedes_terminal_creation() {
    let (mut h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "ordering");
    execute(&h, &plan.id, &reference).await;

    let mut saw_delegating = false;
    let mut order_ok = false;
    for _ in 0..200 {
        match h.events.try_recv() {
            Ok(Event::PlanUpdate { plan: p })
                if p.id == plan.id && p.status == PlanStatus::Delegating =>
            {
                saw_delegating = true;
            }
            Ok(Event::TerminalCreated { .. }) => {
                order_ok = saw_delegating;
                break;
            }
            Ok(_) => continue,
            Err(_) => tokio::time::sleep(std::time::Duration::from_millis(5)).await,
        }
    }
    assert!(order_ok, "terminal-created before plan-update(delegating)");
}

#[tokio::test]
async fn execute_twice_is_single_shot() {
    let (mut h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "idempotent");

    // Kick both executions concurrently; the guard lets one through.
    let (a, b) = tokio::join!(
        h.runtime.plans.execute_plan(&plan.id, &reference.id),
        h.runtime.plans.execute_plan(&plan.id, &reference.id),
    );
    a.unwrap();
    b.unwrap();

    let plan = h.runtime.plans.get_plan(&plan.id).unwrap();
    let plan_agents = h.runtime.agents.for_plan(&plan.id);
    assert_eq!(
        plan_agents.iter().filter(|a| a.role == AgentRole::Orchestrator).count(),
        1
    );
    assert_eq!(plan_agents.iter().filter(|a| a.role == AgentRole::Planner).count(), 1);
    let plan_tabs: Vec<_> = h
        .runtime
        .state
        .snapshot()
        .tabs
        .into_iter()
        .filter(|t| t.plan_id == Some(plan.id))
        .collect();
    assert_eq!(plan_tabs.len(), 1);
    h.drain_events();
}

#[tokio::test]
async fn execute_rejects_wrong_status() {
    let (h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "wrong status");
    h.runtime.plans.set_status(&plan.id, PlanStatus::Completed).unwrap();
    let err = h
        .runtime
        .plans
        .execute_plan(&plan.id, &reference.id)
        .await
        .unwrap_err();
    assert!(matches!(err, crate::error::EngineError::InvalidState(_)));
}

#[tokio::test]
async fn task_store_failure_fails_the_plan() {
    let (h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "doomed");
    h.taskstore.fail_ensure();

    let err = h.runtime.plans.execute_plan(&plan.id, &reference.id).await;
    assert!(err.is_err());
    assert_eq!(h.runtime.plans.get_plan(&plan.id).unwrap().status, PlanStatus::Failed);

    let activities = h.runtime.plans.activities(&plan.id);
    assert!(activities
        .iter()
        .any(|a| a.kind == bm_core::ActivityKind::Error));
}

#[tokio::test]
async fn planner_is_cleaned_up_on_goodbye() {
    let (mut h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "transient planner");
    let plan = execute(&h, &plan.id, &reference).await;
    let planner_id = plan.planner_agent_id.unwrap();

    h.wait_until("two terminals", || h.pty.spawn_count() == 2).await;
    h.pty.session(1).unwrap().emit("Goodbye\n").await;

    h.wait_until("planner deleted", || h.runtime.agents.get(&planner_id).is_none())
        .await;
    let plan = h.runtime.plans.get_plan(&plan.id).unwrap();
    assert_eq!(plan.planner_agent_id, None);
    // The orchestrator stays.
    assert!(h.runtime.agents.get(&plan.orchestrator_agent_id.unwrap()).is_some());
    h.drain_events();
}

#[tokio::test]
async fn clone_copies_configuration_into_a_fresh_draft() {
    let (h, _reference, _repo) = plan_harness().await;
    let mut plan = draft_plan(&h, "original");
    plan = h
        .runtime
        .plans
        .update_plan(&plan.id, |p| {
            p.max_parallel_agents = 2;
            p.branch_strategy = bm_core::BranchStrategy::RaisePrs;
            p.status = PlanStatus::Completed;
        })
        .unwrap();

    let cloned = h.runtime.plans.clone_plan(&plan.id).unwrap();
    assert_ne!(cloned.id, plan.id);
    assert_eq!(cloned.status, PlanStatus::Draft);
    assert_eq!(cloned.max_parallel_agents, 2);
    assert_eq!(cloned.branch_strategy, bm_core::BranchStrategy::RaisePrs);
    assert!(cloned.epic_id.is_none());
}

#[tokio::test]
async fn delete_refuses_active_plans() {
    let (h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "active");
    execute(&h, &plan.id, &reference).await;

    let err = h.runtime.plans.delete_plan(&plan.id).unwrap_err();
    assert!(matches!(err, crate::error::EngineError::InvalidState(_)));

    h.runtime.plans.cancel_plan(&plan.id).unwrap();
    h.runtime.plans.delete_plan(&plan.id).unwrap();
    assert!(h.runtime.plans.get_plan(&plan.id).is_none());
}

#[tokio::test]
async fn discussion_runs_on_the_reference_repo_and_settles_on_discussed() {
    let (mut h, reference, _repo) = plan_harness().await;
    let plan = draft_plan(&h, "talk first");

    let plan = h
        .runtime
        .plans
        .start_discussion(&plan.id, &reference.id)
        .await
        .unwrap();
    assert_eq!(plan.status, PlanStatus::Discussing);

    h.wait_until("discussion terminal", || h.pty.spawn_count() == 1).await;
    let handle = h.pty.session(0).unwrap();
    assert_eq!(handle.spec.cwd, reference.directory);

    handle.emit("Session ended\n").await;
    h.wait_until("discussed", || {
        h.runtime.plans.get_plan(&plan.id).unwrap().status == PlanStatus::Discussed
    })
    .await;
    h.drain_events();
}
