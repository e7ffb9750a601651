// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::protocol::{read_message, write_message};
use bm_adapters::{
    FakeContainerRuntime, FakeGit, FakeNotifier, FakePtyAdapter, FakeTaskStore,
};
use bm_core::{AgentRecord, FakeClock};
use bm_engine::{RuntimeConfig, RuntimeDeps};
use bm_storage::{ConfigPaths, ConfigStore};
use tokio::net::UnixStream;

struct TestDaemon {
    ctx: Arc<ListenCtx>,
    socket: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

fn test_daemon() -> TestDaemon {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(ConfigPaths::at(dir.path()));
    let deps = RuntimeDeps {
        pty: Arc::new(FakePtyAdapter::new()),
        git: Arc::new(FakeGit::new()),
        containers: Arc::new(FakeContainerRuntime::new()),
        taskstore: Arc::new(FakeTaskStore::new()),
        notifier: Arc::new(FakeNotifier::new()),
        clock: Arc::new(FakeClock::at(1)),
    };
    let (runtime, event_rx) = bm_engine::Runtime::start(store, deps, RuntimeConfig::default());
    let event_bus = EventBus::new();
    event_bus.pump_from(event_rx);

    let ctx = Arc::new(ListenCtx {
        runtime,
        event_bus,
        shutdown: Arc::new(Notify::new()),
    });
    let socket = dir.path().join("test.sock");
    TestDaemon { ctx, socket, _dir: dir }
}

async fn serve(daemon: &TestDaemon) {
    let listener = UnixListener::bind(&daemon.socket).unwrap();
    let ctx = Arc::clone(&daemon.ctx);
    tokio::spawn(async move {
        Listener::new(listener, ctx).run().await;
    });
}

async fn roundtrip(stream: &mut UnixStream, request: &Request) -> Response {
    write_message(stream, request).await.unwrap();
    read_message(stream).await.unwrap()
}

#[tokio::test]
async fn ping_and_list_agents_over_the_socket() {
    let daemon = test_daemon();
    serve(&daemon).await;
    let mut stream = UnixStream::connect(&daemon.socket).await.unwrap();

    assert_eq!(roundtrip(&mut stream, &Request::Ping).await, Response::Ok);

    // Connections are reusable: a second request on the same stream.
    match roundtrip(&mut stream, &Request::ListAgents).await {
        Response::Agents { agents } => assert!(agents.is_empty()),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn save_then_delete_agent() {
    let daemon = test_daemon();
    serve(&daemon).await;
    let mut stream = UnixStream::connect(&daemon.socket).await.unwrap();

    let record = AgentRecord::new("remote", "/tmp");
    let saved = match roundtrip(&mut stream, &Request::SaveAgent { agent: record.clone() }).await
    {
        Response::Agent { agent } => agent,
        other => panic!("unexpected response: {other:?}"),
    };
    assert_eq!(saved.id, record.id);

    assert_eq!(
        roundtrip(&mut stream, &Request::DeleteAgent { agent_id: record.id }).await,
        Response::Ok
    );
    match roundtrip(&mut stream, &Request::DeleteAgent { agent_id: record.id }).await {
        Response::Error { kind, .. } => assert_eq!(kind, "not_found"),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn subscribe_streams_notifications() {
    let daemon = test_daemon();
    serve(&daemon).await;

    let mut sub = UnixStream::connect(&daemon.socket).await.unwrap();
    assert_eq!(roundtrip(&mut sub, &Request::Subscribe).await, Response::Ok);

    // A mutation on another connection shows up on the stream.
    let mut ops = UnixStream::connect(&daemon.socket).await.unwrap();
    match roundtrip(&mut ops, &Request::CreateTab { name: "t".into() }).await {
        Response::Tab { .. } => {}
        other => panic!("unexpected response: {other:?}"),
    }

    let frame: Response = read_message(&mut sub).await.unwrap();
    match frame {
        Response::Notification { event } => assert_eq!(event.name(), "state-update"),
        other => panic!("expected a notification, got {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_request_notifies_the_daemon() {
    let daemon = test_daemon();
    serve(&daemon).await;
    let notified = {
        let shutdown = Arc::clone(&daemon.ctx.shutdown);
        tokio::spawn(async move { shutdown.notified().await })
    };

    let mut stream = UnixStream::connect(&daemon.socket).await.unwrap();
    assert_eq!(roundtrip(&mut stream, &Request::Shutdown).await, Response::Ok);
    notified.await.unwrap();
}

#[tokio::test]
async fn state_and_preferences_flow() {
    let daemon = test_daemon();
    serve(&daemon).await;
    let mut stream = UnixStream::connect(&daemon.socket).await.unwrap();

    match roundtrip(&mut stream, &Request::GetState).await {
        Response::State { snapshot } => assert!(snapshot.tabs.is_empty()),
        other => panic!("unexpected response: {other:?}"),
    }

    let patch = bm_engine::state::PreferencesPatch {
        grid_size: Some(bm_core::GridSize::ThreeByThree),
        ..Default::default()
    };
    match roundtrip(&mut stream, &Request::SetPreferences { preferences: patch }).await {
        Response::Preferences { preferences } => {
            assert_eq!(preferences.grid_size, bm_core::GridSize::ThreeByThree)
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn delete_tab_returns_contained_agents() {
    let daemon = test_daemon();
    serve(&daemon).await;
    let mut stream = UnixStream::connect(&daemon.socket).await.unwrap();

    let tab = match roundtrip(&mut stream, &Request::CreateTab { name: "t".into() }).await {
        Response::Tab { tab } => tab,
        other => panic!("unexpected response: {other:?}"),
    };
    let agent = daemon.ctx.runtime.save_agent(AgentRecord::new("a", "/tmp"));
    daemon
        .ctx
        .runtime
        .state
        .add_agent_to_tab(&agent.id, &tab.id, None)
        .unwrap();

    match roundtrip(&mut stream, &Request::DeleteTab { tab_id: tab.id }).await {
        Response::TabDeleted { agent_ids } => assert_eq!(agent_ids, vec![agent.id]),
        other => panic!("unexpected response: {other:?}"),
    }
}
