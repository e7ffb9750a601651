// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::harness;
use bm_core::Event;
use std::time::Duration;

#[tokio::test]
async fn create_emits_created_before_data_and_launches_after_settle() {
    let mut h = harness();
    let agent = h.seed_agent("alpha");

    let terminal_id = h
        .runtime
        .create_terminal(&agent.id, Some("do the thing".into()), vec![])
        .await
        .unwrap();

    h.expect_event("terminal-created", |e| {
        matches!(e, Event::TerminalCreated { terminal_id: t, agent_id } if *t == terminal_id && *agent_id == agent.id)
    })
    .await;

    // The launch line lands after the settle delay.
    let handle = h.pty.session(0).unwrap();
    h.wait_until("launch line written", || handle.written().contains("assistant"))
        .await;
    let written = handle.written();
    assert!(written.contains("--session-id"), "fresh agent gets a new session: {written}");
    assert!(written.contains("'do the thing'"), "prompt is quoted: {written}");
    assert!(written.ends_with('\r'));

    // Environment and size per the spawn contract.
    assert_eq!(handle.size(), (80, 30));
    let env = &handle.spec.env;
    assert!(env.iter().any(|(k, v)| k == "WORKSPACE_ID" && *v == agent.id.to_string()));
    assert!(env.iter().any(|(k, v)| k == "COLORTERM" && v == "truecolor"));
}

#[tokio::test]
async fn data_flows_out_and_exit_is_reported() {
    let mut h = harness();
    let agent = h.seed_agent("beta");
    let terminal_id = h.runtime.create_terminal(&agent.id, None, vec![]).await.unwrap();
    let handle = h.pty.session(0).unwrap();

    handle.emit("hello from the child").await;
    h.expect_event("terminal-data", |e| {
        matches!(e, Event::TerminalData { data, .. } if data.contains("hello from the child"))
    })
    .await;

    handle.exit(Some(3)).await;
    h.expect_event("terminal-exit", |e| {
        matches!(e, Event::TerminalExit { terminal_id: t, code: Some(3) } if *t == terminal_id)
    })
    .await;
    assert!(h.runtime.terminals.terminal_for_agent(&agent.id).is_none());
}

#[tokio::test]
async fn clear_marker_drops_the_cached_session() {
    let mut h = harness();
    let agent = h.seed_agent("gamma");
    h.runtime.create_terminal(&agent.id, None, vec![]).await.unwrap();

    h.wait_until("session id cached", || {
        h.runtime.agents.get(&agent.id).and_then(|a| a.session_id).is_some()
    })
    .await;

    let handle = h.pty.session(0).unwrap();
    handle.emit("\u{1b}[2J(no content)\n").await;

    h.wait_until("session id cleared", || {
        h.runtime.agents.get(&agent.id).map(|a| a.session_id.is_none()).unwrap_or(false)
    })
    .await;
    h.drain_events();
}

#[tokio::test]
async fn resume_is_used_when_the_session_file_has_content() {
    let mut h = harness();
    let mut agent = h.seed_agent("delta");
    agent.session_id = Some("cafebabe".into());
    let agent = h.runtime.save_agent(agent);

    // Fabricate a non-empty session file where the supervisor looks.
    let munged: String = agent
        .directory
        .display()
        .to_string()
        .chars()
        .map(|c| if c == '/' || c == '.' { '-' } else { c })
        .collect();
    let session_dir = h.dir.path().join("sessions").join(munged);
    std::fs::create_dir_all(&session_dir).unwrap();
    std::fs::write(session_dir.join("cafebabe.jsonl"), b"{\"x\":1}\n").unwrap();

    h.runtime.create_terminal(&agent.id, None, vec![]).await.unwrap();
    let handle = h.pty.session(0).unwrap();
    h.wait_until("launch line written", || handle.written().contains("assistant")).await;
    assert!(handle.written().contains("--resume cafebabe"));
    h.drain_events();
}

#[tokio::test]
async fn missing_session_file_falls_back_to_a_fresh_session() {
    let mut h = harness();
    let mut agent = h.seed_agent("epsilon");
    agent.session_id = Some("stale".into());
    let agent = h.runtime.save_agent(agent);

    h.runtime.create_terminal(&agent.id, None, vec![]).await.unwrap();
    let handle = h.pty.session(0).unwrap();
    h.wait_until("launch line written", || handle.written().contains("assistant")).await;
    assert!(handle.written().contains("--session-id"));
    assert!(!handle.written().contains("--resume"));

    // And the fresh id replaced the stale one on the record.
    let cached = h.runtime.agents.get(&agent.id).unwrap().session_id.unwrap();
    assert_ne!(cached, "stale");
    h.drain_events();
}

#[tokio::test]
async fn wait_for_output_times_out_quietly() {
    let mut h = harness();
    let agent = h.seed_agent("zeta");
    let terminal_id = h.runtime.create_terminal(&agent.id, None, vec![]).await.unwrap();

    let found = h
        .runtime
        .terminals
        .wait_for_output(&terminal_id, "never-printed", Duration::from_millis(50))
        .await;
    assert!(!found);
    h.drain_events();
}

#[tokio::test]
async fn paste_prompt_submits_after_the_echo() {
    let mut h = harness();
    let agent = h.seed_agent("eta");
    let terminal_id = h.runtime.create_terminal(&agent.id, None, vec![]).await.unwrap();
    let handle = h.pty.session(0).unwrap();
    h.wait_until("launch line written", || !handle.written().is_empty()).await;
    let before = handle.written().len();

    let terminals = h.runtime.terminals.clone();
    let paste = tokio::spawn(async move {
        terminals.paste_prompt(&terminal_id, "a long prompt").await;
    });
    h.wait_until("prompt written", || handle.written().len() > before).await;
    handle.emit("Pasted text #1").await;
    paste.await.unwrap();

    let written = handle.written();
    assert!(written.contains("a long prompt"));
    assert!(written.ends_with('\r'));
    h.drain_events();
}

#[tokio::test]
async fn type_text_emits_every_code_point() {
    let mut h = harness();
    let agent = h.seed_agent("theta");
    let terminal_id = h.runtime.create_terminal(&agent.id, None, vec![]).await.unwrap();
    let handle = h.pty.session(0).unwrap();
    h.wait_until("launch line written", || !handle.written().is_empty()).await;
    let before = handle.written().len();

    h.runtime.terminals.type_text(&terminal_id, "héllo").await;
    let typed = handle.written()[before..].to_string();
    assert_eq!(typed, "héllo");
    h.drain_events();
}

#[tokio::test]
async fn close_reaps_a_stuck_terminal_after_the_grace() {
    let mut h = harness();
    let agent = h.seed_agent("iota");
    let terminal_id = h.runtime.create_terminal(&agent.id, None, vec![]).await.unwrap();
    let handle = h.pty.session(0).unwrap();

    // The fake never reports Exit on kill, exercising the grace reaper.
    h.runtime.close_terminal(&terminal_id);
    assert!(handle.killed());
    h.expect_event("terminal-exit after grace", |e| {
        matches!(e, Event::TerminalExit { terminal_id: t, code: None } if *t == terminal_id)
    })
    .await;
}

#[tokio::test]
async fn write_to_unknown_terminal_is_a_noop() {
    let h = harness();
    h.runtime.write_terminal(&bm_core::TerminalId::generate(), b"x");
}

#[tokio::test]
async fn headless_agents_get_no_terminal() {
    let h = harness();
    let record = bm_core::AgentRecord::new("hw", h.dir.path())
        .with_role(bm_core::AgentRole::Headless);
    let record = h.runtime.save_agent(record);
    let err = h.runtime.create_terminal(&record.id, None, vec![]).await.unwrap_err();
    assert!(matches!(err, crate::error::EngineError::InvalidState(_)));
}
