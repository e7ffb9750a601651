// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn spec() -> ContainerSpec {
    ContainerSpec {
        name: "bm-T1".into(),
        image: "bismark-worker:latest".into(),
        cpus: Some("2".into()),
        memory: Some("4g".into()),
        mounts: vec![Mount {
            host: "/plans/p/worktrees/r1/fix-a".into(),
            container: "/workspace".into(),
            read_write: true,
        }],
        env: vec![("TOOL_PROXY_URL".into(), "http://host.docker.internal:9847".into())],
        workdir: Some("/workspace".into()),
    }
}

#[test]
fn run_args_cover_caps_mounts_and_env() {
    let args = docker_run_args(&spec());
    let joined = args.join(" ");
    assert!(joined.starts_with("run --rm --name bm-T1"));
    assert!(joined.contains("--cpus 2"));
    assert!(joined.contains("--memory 4g"));
    assert!(joined.contains("-v /plans/p/worktrees/r1/fix-a:/workspace:rw"));
    assert!(joined.contains("-e TOOL_PROXY_URL=http://host.docker.internal:9847"));
    assert!(joined.contains("-w /workspace"));
    assert!(joined.ends_with("bismark-worker:latest"));
}

#[test]
fn read_only_mounts_are_marked_ro() {
    let mut s = spec();
    s.mounts[0].read_write = false;
    let args = docker_run_args(&s);
    assert!(args.join(" ").contains(":/workspace:ro"));
}

#[test]
fn caps_are_optional() {
    let mut s = spec();
    s.cpus = None;
    s.memory = None;
    let joined = docker_run_args(&s).join(" ");
    assert!(!joined.contains("--cpus"));
    assert!(!joined.contains("--memory"));
}

#[tokio::test]
async fn fake_runtime_streams_and_exits() {
    let runtime = FakeContainerRuntime::new();
    let mut handle = runtime.start(spec()).await.unwrap();

    let container = runtime.take_container("bm-T1").unwrap();
    container.emit_line("{\"type\":\"init\",\"timestamp\":\"t\"}").await;
    let chunk = handle.stdout.recv().await.unwrap();
    assert!(chunk.ends_with(b"\n"));

    container.finish(Some(0));
    assert!(handle.stdout.recv().await.is_none());
    assert_eq!(handle.exit.await.unwrap(), Some(0));
}

#[tokio::test]
async fn fake_stop_closes_the_stream() {
    let runtime = FakeContainerRuntime::new();
    let mut handle = runtime.start(spec()).await.unwrap();
    runtime.stop("bm-T1").await.unwrap();
    assert!(handle.stdout.recv().await.is_none());
    assert_eq!(runtime.stopped_names(), vec!["bm-T1".to_string()]);
}
