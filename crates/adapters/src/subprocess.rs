// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded subprocess execution.
//!
//! Every external CLI the daemon shells out to (git, the task store, docker,
//! gh) goes through [`run_with_timeout`], which kills the child on expiry so
//! a wedged tool cannot leak processes.

use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Git subcommands are fast; worktree creation can touch the index.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(30);
/// Task-store CLI calls, invoked once per poll tick per plan.
pub const TASK_CLI_TIMEOUT: Duration = Duration::from_secs(20);
/// Container lifecycle commands (image pull excluded; that is pre-checked).
pub const CONTAINER_TIMEOUT: Duration = Duration::from_secs(60);
/// Host CLI invocations made on behalf of containers.
pub const PROXY_CMD_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("{label} timed out after {timeout:?}")]
    Timeout { label: String, timeout: Duration },

    #[error("{label} failed to spawn: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run a command to completion, killing it if the timeout expires.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &str,
) -> Result<Output, SubprocessError> {
    cmd.kill_on_drop(true);
    let fut = cmd.output();
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(SubprocessError::Spawn { label: label.to_string(), source }),
        Err(_) => {
            tracing::warn!(label, ?timeout, "subprocess timed out, killed");
            Err(SubprocessError::Timeout { label: label.to_string(), timeout })
        }
    }
}

/// Stdout of a successful run, trimmed. Non-zero exit becomes `Err(stderr)`.
pub fn expect_success(output: &Output, label: &str) -> Result<String, String> {
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(format!("{} failed: {}", label, stderr))
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
