// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn spec() -> PtySpawnSpec {
    PtySpawnSpec {
        cwd: std::env::temp_dir(),
        env: vec![("WORKSPACE_ID".into(), "agt-test".into())],
        cols: 80,
        rows: 30,
    }
}

#[tokio::test]
async fn fake_pty_records_writes_and_size() {
    let adapter = FakePtyAdapter::new();
    let session = adapter.spawn(spec()).await.unwrap();
    session.controller.write(b"echo hi\r").unwrap();
    session.controller.resize(120, 40).unwrap();

    let handle = adapter.session(0).unwrap();
    assert_eq!(handle.written(), "echo hi\r");
    assert_eq!(handle.size(), (120, 40));
    assert!(!handle.killed());
    assert_eq!(handle.spec.env[0].1, "agt-test");
}

#[tokio::test]
async fn fake_pty_injects_output_and_exit() {
    let adapter = FakePtyAdapter::new();
    let mut session = adapter.spawn(spec()).await.unwrap();
    let handle = adapter.session(0).unwrap();

    handle.emit("booted").await;
    handle.exit(Some(0)).await;

    assert_eq!(session.events.recv().await, Some(PtyEvent::Data(b"booted".to_vec())));
    assert_eq!(session.events.recv().await, Some(PtyEvent::Exit(Some(0))));
}

#[tokio::test]
async fn fake_pty_can_fail_one_spawn() {
    let adapter = FakePtyAdapter::new();
    adapter.fail_next_spawn();
    assert!(adapter.spawn(spec()).await.is_err());
    assert!(adapter.spawn(spec()).await.is_ok());
    assert_eq!(adapter.spawn_count(), 1);
}

#[tokio::test]
async fn native_pty_runs_a_shell_and_reports_exit() {
    let adapter = NativePty::new();
    let mut session = match adapter.spawn(spec()).await {
        Ok(session) => session,
        // PTY allocation can be unavailable in minimal CI sandboxes.
        Err(_) => return,
    };

    session.controller.write(b"printf 'marker-%s\\n' ok\r").unwrap();

    let mut saw_marker = false;
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(10);
    let mut collected = String::new();
    loop {
        let event = tokio::select! {
            event = session.events.recv() => event,
            _ = tokio::time::sleep_until(deadline) => break,
        };
        match event {
            Some(PtyEvent::Data(bytes)) => {
                collected.push_str(&String::from_utf8_lossy(&bytes));
                if collected.contains("marker-ok") {
                    saw_marker = true;
                    break;
                }
            }
            Some(PtyEvent::Exit(_)) | None => break,
        }
    }
    assert!(saw_marker, "shell output not observed: {collected:?}");

    session.controller.write(b"exit\r").unwrap();
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(10);
    loop {
        let event = tokio::select! {
            event = session.events.recv() => event,
            _ = tokio::time::sleep_until(deadline) => panic!("no exit observed"),
        };
        match event {
            Some(PtyEvent::Exit(_)) | None => break,
            Some(PtyEvent::Data(_)) => continue,
        }
    }
}
