// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn test_config(root: &std::path::Path) -> Config {
    let paths = ConfigPaths::at(root);
    Config {
        socket_path: paths.root().join("daemon.sock"),
        lock_path: paths.root().join("daemon.pid"),
        log_dir: paths.root().join("logs"),
        paths,
    }
}

#[tokio::test]
async fn startup_locks_binds_and_shuts_down_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let (daemon, _listener) = startup(config.clone()).unwrap();
    assert!(config.socket_path.exists());
    let pid: u32 = std::fs::read_to_string(&config.lock_path)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(pid, std::process::id());

    daemon.shutdown_now();
    assert!(!config.socket_path.exists());
}

#[tokio::test]
async fn second_instance_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let (_daemon, _listener) = startup(config.clone()).unwrap();
    let err = match startup(config) {
        Err(e) => e,
        Ok(_) => panic!("second instance was not refused"),
    };
    assert!(matches!(err, LifecycleError::AlreadyRunning(_)));
}

#[tokio::test]
async fn stale_socket_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::create_dir_all(config.paths.root()).unwrap();
    // A leftover socket file from a crashed run.
    std::fs::write(&config.socket_path, b"").unwrap();

    let (daemon, _listener) = startup(config.clone()).unwrap();
    assert!(config.socket_path.exists());
    daemon.shutdown_now();
}
