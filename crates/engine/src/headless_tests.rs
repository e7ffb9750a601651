// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::harness;
use bm_core::{Event, HeadlessStatus, TaskId};

fn event_line(kind: &str, ts: &str) -> String {
    format!(r#"{{"type":"{kind}","timestamp":"{ts}"}}"#)
}

#[tokio::test]
async fn lifecycle_idle_starting_running_completed() {
    let mut h = harness();
    let task = TaskId::new("T1");
    let worktree = h.dir.path().join("wt");
    std::fs::create_dir_all(&worktree).unwrap();

    h.runtime
        .headless
        .start(task.clone(), None, worktree.clone(), "go".into(), "tok".into())
        .await
        .unwrap();

    h.expect_event("started", |e| {
        matches!(e, Event::HeadlessAgentStarted { task_id, plan_id: None, worktree_path }
            if task_id == &task && worktree_path == &worktree)
    })
    .await;
    h.expect_event("running", |e| {
        matches!(e, Event::HeadlessAgentUpdate { info } if info.status == HeadlessStatus::Running)
    })
    .await;

    let container = h.containers.take_container("bm-T1").unwrap();
    container.emit_line(&event_line("init", "t0")).await;
    container.emit_line(&event_line("message", "t1")).await;
    container
        .emit_line(r#"{"type":"result","timestamp":"t2","success":true,"exit_code":0,"cost_usd":0.1,"duration_ms":5}"#)
        .await;

    // Events arrive in emission order.
    h.expect_event("init event", |e| {
        matches!(e, Event::HeadlessAgentEvent { event: bm_core::StreamEvent::Init { .. }, .. })
    })
    .await;
    h.expect_event("message event", |e| {
        matches!(e, Event::HeadlessAgentEvent { event: bm_core::StreamEvent::Message { .. }, .. })
    })
    .await;
    h.expect_event("completed", |e| {
        matches!(e, Event::HeadlessAgentUpdate { info }
            if info.status == HeadlessStatus::Completed
                && info.result.as_ref().is_some_and(|r| r.success))
    })
    .await;

    container.finish(Some(0));
    h.wait_until("info settles", || {
        h.runtime.headless.info(&task).is_some_and(|i| i.completed_at_ms.is_some())
    })
    .await;

    // The event log on disk holds exactly what was received.
    let persisted = h.runtime.store.load_headless(None, &task).unwrap();
    assert_eq!(persisted.events.len(), 3);
    assert_eq!(persisted.status, HeadlessStatus::Completed);
}

#[tokio::test]
async fn nonzero_exit_without_result_fails_the_run() {
    let mut h = harness();
    let task = TaskId::new("T2");
    let worktree = h.dir.path().join("wt2");
    std::fs::create_dir_all(&worktree).unwrap();

    h.runtime
        .headless
        .start(task.clone(), None, worktree, "go".into(), "tok".into())
        .await
        .unwrap();
    let container = h.containers.take_container("bm-T2").unwrap();
    container.emit_line(&event_line("init", "t0")).await;
    container.finish(Some(9));

    h.expect_event("failed", |e| {
        matches!(e, Event::HeadlessAgentUpdate { info }
            if info.status == HeadlessStatus::Failed
                && info.result.as_ref().is_some_and(|r| r.exit_code == Some(9)))
    })
    .await;
}

#[tokio::test]
async fn stop_transitions_through_stopping_to_completed() {
    let mut h = harness();
    let task = TaskId::new("T3");
    let worktree = h.dir.path().join("wt3");
    std::fs::create_dir_all(&worktree).unwrap();

    h.runtime
        .headless
        .start(task.clone(), None, worktree, "go".into(), "tok".into())
        .await
        .unwrap();

    // The feed side stays with the fake runtime: its stop() closes the
    // stream, which is exactly what `docker stop` does to the real one.
    h.runtime.headless.stop(&task);
    h.expect_event("stopping", |e| {
        matches!(e, Event::HeadlessAgentUpdate { info } if info.status == HeadlessStatus::Stopping)
    })
    .await;
    h.expect_event("completed after stop", |e| {
        matches!(e, Event::HeadlessAgentUpdate { info } if info.status == HeadlessStatus::Completed)
    })
    .await;
    assert_eq!(h.containers.stopped_names(), vec!["bm-T3".to_string()]);
}

#[tokio::test]
async fn unterminated_final_line_is_still_parsed() {
    let mut h = harness();
    let task = TaskId::new("T4");
    let worktree = h.dir.path().join("wt4");
    std::fs::create_dir_all(&worktree).unwrap();

    h.runtime
        .headless
        .start(task.clone(), None, worktree, "go".into(), "tok".into())
        .await
        .unwrap();
    let container = h.containers.take_container("bm-T4").unwrap();
    // No trailing newline before the stream closes.
    let bytes = r#"{"type":"result","timestamp":"t","success":true}"#.as_bytes().to_vec();
    let _ = container.stdout.send(bytes).await;
    container.finish(Some(0));

    h.expect_event("completed from finish()", |e| {
        matches!(e, Event::HeadlessAgentUpdate { info } if info.status == HeadlessStatus::Completed)
    })
    .await;
}

#[tokio::test]
async fn duplicate_start_is_rejected_while_running() {
    let h = harness();
    let task = TaskId::new("T5");
    let worktree = h.dir.path().join("wt5");
    std::fs::create_dir_all(&worktree).unwrap();

    h.runtime
        .headless
        .start(task.clone(), None, worktree.clone(), "go".into(), "tok".into())
        .await
        .unwrap();
    let err = h
        .runtime
        .headless
        .start(task.clone(), None, worktree, "go".into(), "tok".into())
        .await
        .unwrap_err();
    assert!(matches!(err, crate::error::EngineError::AlreadyExists(_)));
}

#[tokio::test]
async fn missing_image_refuses_to_start() {
    let h = harness();
    h.containers.set_image_missing(true);
    let err = h
        .runtime
        .headless
        .start(TaskId::new("T6"), None, h.dir.path().to_path_buf(), "go".into(), "tok".into())
        .await
        .unwrap_err();
    assert!(matches!(err, crate::error::EngineError::ExternalTool(_)));
}

#[tokio::test]
async fn rehydration_marks_interrupted_runs_failed() {
    let h = harness();
    let task = TaskId::new("T7");
    let mut info = bm_core::HeadlessAgentInfo::new(task.clone(), None, "/w".into(), 5);
    info.status = HeadlessStatus::Running;
    h.runtime.store.save_headless_snapshot(&info).unwrap();

    h.runtime.headless.rehydrate(&[]);
    let rehydrated = h.runtime.headless.info(&task).unwrap();
    assert_eq!(rehydrated.status, HeadlessStatus::Failed);
}

#[tokio::test]
async fn destroy_removes_everything_best_effort() {
    let mut h = harness();
    let task = TaskId::new("T8");
    let worktree = h.dir.path().join("wt8");
    std::fs::create_dir_all(&worktree).unwrap();

    // A headless agent record bound to the task.
    let mut record = bm_core::AgentRecord::new("hw", &worktree)
        .with_role(bm_core::AgentRole::StandaloneHeadless);
    record.task_id = Some(task.clone());
    let record = h.runtime.save_agent(record);

    h.runtime
        .headless
        .start(task.clone(), None, worktree.clone(), "go".into(), "tok".into())
        .await
        .unwrap();
    h.drain_events();

    h.runtime.headless.destroy(&task, None, None).await;
    assert!(h.runtime.headless.info(&task).is_none());
    assert!(h.runtime.agents.get(&record.id).is_none());
    assert!(h.runtime.store.load_headless(None, &task).is_none());
    assert!(h.containers.stopped_names().contains(&"bm-T8".to_string()));
}

#[tokio::test]
async fn container_spec_carries_proxy_url_and_token_env() {
    let h = harness();
    let task = TaskId::new("T9");
    let worktree = h.dir.path().join("wt9");
    std::fs::create_dir_all(&worktree).unwrap();

    h.runtime
        .headless
        .start(task, None, worktree.clone(), "the prompt".into(), "tok-1".into())
        .await
        .unwrap();

    let specs = h.containers.started_specs();
    assert_eq!(specs.len(), 1);
    let spec = &specs[0];
    assert!(spec.env.iter().any(|(k, _)| k == "TOOL_PROXY_URL"));
    assert!(spec
        .env
        .iter()
        .any(|(k, v)| k == bm_adapters::TOKEN_ENV && v == "tok-1"));
    assert!(spec.env.iter().any(|(k, v)| k == "BISMARK_PROMPT" && v == "the prompt"));
    assert_eq!(spec.mounts.len(), 1);
    assert!(spec.mounts[0].read_write);
    assert_eq!(spec.mounts[0].host, worktree);
}
