// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn fast_command_completes() {
    let mut cmd = Command::new("echo");
    cmd.arg("hello");
    let output = run_with_timeout(cmd, Duration::from_secs(5), "echo").await.unwrap();
    assert_eq!(expect_success(&output, "echo").unwrap(), "hello");
}

#[tokio::test]
async fn slow_command_is_killed() {
    let mut cmd = Command::new("sleep");
    cmd.arg("30");
    let err = run_with_timeout(cmd, Duration::from_millis(100), "sleep")
        .await
        .unwrap_err();
    assert!(matches!(err, SubprocessError::Timeout { .. }));
}

#[tokio::test]
async fn missing_binary_is_a_spawn_error() {
    let cmd = Command::new("definitely-not-a-binary-bm");
    let err = run_with_timeout(cmd, Duration::from_secs(1), "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, SubprocessError::Spawn { .. }));
}

#[tokio::test]
async fn nonzero_exit_surfaces_stderr() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "echo oops >&2; exit 3"]);
    let output = run_with_timeout(cmd, Duration::from_secs(5), "sh").await.unwrap();
    let err = expect_success(&output, "sh").unwrap_err();
    assert!(err.contains("oops"));
}
