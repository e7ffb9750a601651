// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_core::AgentId;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

fn sockets_in(dir: &Path, tx: mpsc::Sender<AttentionSignal>) -> AttentionSockets {
    // Point the base dir inside the test's tempdir instead of /tmp/bm.
    let mut sockets = AttentionSockets::new("testinst", tx);
    sockets.base_dir = dir.to_path_buf();
    sockets
}

async fn write_and_close(path: &Path, payload: &[u8]) {
    let mut stream = UnixStream::connect(path).await.unwrap();
    stream.write_all(payload).await.unwrap();
    stream.shutdown().await.unwrap();
}

#[tokio::test]
async fn stop_message_signals_the_agent() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    let sockets = sockets_in(dir.path(), tx);
    let agent = AgentId::from_string("agt-one");

    let path = sockets.open(&agent).unwrap();
    write_and_close(
        &path,
        b"{\"event\":\"stop\",\"reason\":\"input_required\",\"workspaceId\":\"agt-one\"}\n",
    )
    .await;

    let signal = rx.recv().await.unwrap();
    assert_eq!(signal.agent_id, agent);
    assert_eq!(signal.reason.as_deref(), Some("input_required"));
}

#[tokio::test]
async fn message_without_trailing_newline_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    let sockets = sockets_in(dir.path(), tx);
    let agent = AgentId::from_string("agt-two");

    let path = sockets.open(&agent).unwrap();
    write_and_close(&path, b"{\"event\":\"stop\"}").await;

    let signal = rx.recv().await.unwrap();
    assert_eq!(signal.agent_id, agent);
    assert_eq!(signal.reason, None);
}

#[tokio::test]
async fn unparseable_and_foreign_events_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    let sockets = sockets_in(dir.path(), tx);
    let agent = AgentId::from_string("agt-three");

    let path = sockets.open(&agent).unwrap();
    write_and_close(&path, b"garbage\n{\"event\":\"start\"}\n{\"event\":\"stop\"}\n").await;

    // Only the stop arrives.
    let signal = rx.recv().await.unwrap();
    assert_eq!(signal.agent_id, agent);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn open_is_idempotent_and_close_removes_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, _rx) = mpsc::channel(8);
    let sockets = sockets_in(dir.path(), tx);
    let agent = AgentId::from_string("agt-four");

    let path_a = sockets.open(&agent).unwrap();
    let path_b = sockets.open(&agent).unwrap();
    assert_eq!(path_a, path_b);
    assert!(path_a.exists());
    assert!(sockets.is_open(&agent));

    sockets.close(&agent);
    assert!(!path_a.exists());
    assert!(!sockets.is_open(&agent));
}

#[tokio::test]
async fn two_signals_arrive_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    let sockets = sockets_in(dir.path(), tx);
    let a = AgentId::from_string("agt-a");
    let b = AgentId::from_string("agt-b");

    let path_a = sockets.open(&a).unwrap();
    let path_b = sockets.open(&b).unwrap();
    write_and_close(&path_a, b"{\"event\":\"stop\"}\n").await;
    let first = rx.recv().await.unwrap();
    write_and_close(&path_b, b"{\"event\":\"stop\"}\n").await;
    let second = rx.recv().await.unwrap();

    assert_eq!(first.agent_id, a);
    assert_eq!(second.agent_id, b);
}

#[test]
fn instance_ids_are_short_hex() {
    let id = new_instance_id();
    assert_eq!(id.len(), 8);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn socket_paths_stay_under_the_sun_path_limit() {
    let base = std::env::temp_dir().join("bm").join("abcdef12");
    let agent = AgentId::generate();
    assert!(socket_path_fits(&base, &agent));
}
