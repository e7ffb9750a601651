// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container runtime for headless workers.
//!
//! Each worker runs in the foreground under `docker run` with stdout piped:
//! the worker's newline-delimited JSON event stream is the only channel out.
//! Credentials and the initial prompt travel as environment variables, never
//! as files inside the mounted worktree.

use crate::subprocess::{run_with_timeout, CONTAINER_TIMEOUT};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("image missing: {0}")]
    ImageMissing(String),

    #[error("container start failed: {0}")]
    StartFailed(String),

    #[error("container stop failed: {0}")]
    StopFailed(String),
}

/// A bind mount: host path, container path, read-write flag.
#[derive(Debug, Clone)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
    pub read_write: bool,
}

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cpus: Option<String>,
    pub memory: Option<String>,
    pub mounts: Vec<Mount>,
    pub env: Vec<(String, String)>,
    pub workdir: Option<String>,
}

/// A running container: its stdout byte stream and exit notification.
pub struct ContainerHandle {
    pub name: String,
    pub stdout: mpsc::Receiver<Vec<u8>>,
    pub exit: oneshot::Receiver<Option<i32>>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    async fn daemon_available(&self) -> bool;
    async fn image_exists(&self, image: &str) -> bool;
    async fn start(&self, spec: ContainerSpec) -> Result<ContainerHandle, ContainerError>;
    async fn stop(&self, name: &str) -> Result<(), ContainerError>;
}

/// Docker CLI implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct DockerRuntime;

impl DockerRuntime {
    pub fn new() -> Self {
        Self
    }
}

/// `docker run` argument list for a spec. Split out for testability.
pub(crate) fn docker_run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args: Vec<String> =
        vec!["run".into(), "--rm".into(), "--name".into(), spec.name.clone()];
    if let Some(ref cpus) = spec.cpus {
        args.push("--cpus".into());
        args.push(cpus.clone());
    }
    if let Some(ref memory) = spec.memory {
        args.push("--memory".into());
        args.push(memory.clone());
    }
    // Containers reach the host tool proxy through host.docker.internal.
    args.push("--add-host".into());
    args.push("host.docker.internal:host-gateway".into());
    for mount in &spec.mounts {
        let mode = if mount.read_write { "rw" } else { "ro" };
        args.push("-v".into());
        args.push(format!("{}:{}:{}", mount.host.display(), mount.container, mode));
    }
    for (key, value) in &spec.env {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }
    if let Some(ref workdir) = spec.workdir {
        args.push("-w".into());
        args.push(workdir.clone());
    }
    args.push(spec.image.clone());
    args
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn daemon_available(&self) -> bool {
        let mut cmd = Command::new("docker");
        cmd.args(["info", "--format", "{{.ServerVersion}}"]);
        matches!(
            run_with_timeout(cmd, CONTAINER_TIMEOUT, "docker info").await,
            Ok(output) if output.status.success()
        )
    }

    async fn image_exists(&self, image: &str) -> bool {
        let mut cmd = Command::new("docker");
        cmd.args(["image", "inspect", image]);
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        matches!(
            run_with_timeout(cmd, CONTAINER_TIMEOUT, "docker image inspect").await,
            Ok(output) if output.status.success()
        )
    }

    async fn start(&self, spec: ContainerSpec) -> Result<ContainerHandle, ContainerError> {
        let args = docker_run_args(&spec);
        let mut cmd = Command::new("docker");
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child =
            cmd.spawn().map_err(|e| ContainerError::StartFailed(e.to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ContainerError::StartFailed("stdout not captured".into()))?;

        let (data_tx, data_rx) = mpsc::channel::<Vec<u8>>(64);
        let (exit_tx, exit_rx) = oneshot::channel();
        let name = spec.name.clone();

        tokio::spawn(async move {
            let mut buf = [0u8; 8192];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if data_tx.send(buf[..n].to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(container = %name, error = %e, "stdout read ended");
                        break;
                    }
                }
            }
            drop(data_tx);
            let code = child.wait().await.ok().and_then(|status| status.code());
            let _ = exit_tx.send(code);
        });

        Ok(ContainerHandle { name: spec.name, stdout: data_rx, exit: exit_rx })
    }

    async fn stop(&self, name: &str) -> Result<(), ContainerError> {
        let mut cmd = Command::new("docker");
        cmd.args(["stop", "--time", "5", name]);
        let output = run_with_timeout(cmd, CONTAINER_TIMEOUT, "docker stop")
            .await
            .map_err(|e| ContainerError::StopFailed(e.to_string()))?;
        // Stopping an already-gone container is fine.
        if output.status.success()
            || String::from_utf8_lossy(&output.stderr).contains("No such container")
        {
            Ok(())
        } else {
            Err(ContainerError::StopFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Feed side of one fake container.
    pub struct FakeContainer {
        pub stdout: mpsc::Sender<Vec<u8>>,
        pub exit: Option<oneshot::Sender<Option<i32>>>,
    }

    impl FakeContainer {
        /// Write one line of worker output (newline appended).
        pub async fn emit_line(&self, line: &str) {
            let mut bytes = line.as_bytes().to_vec();
            bytes.push(b'\n');
            let _ = self.stdout.send(bytes).await;
        }

        /// Close the stream and report the exit code.
        pub fn finish(mut self, code: Option<i32>) {
            if let Some(exit) = self.exit.take() {
                let _ = exit.send(code);
            }
        }
    }

    #[derive(Default)]
    struct FakeRuntimeState {
        started: Vec<ContainerSpec>,
        stopped: Vec<String>,
        containers: HashMap<String, FakeContainer>,
        image_missing: bool,
    }

    /// Container runtime double; tests drive each container's stdout.
    #[derive(Clone, Default)]
    pub struct FakeContainerRuntime {
        state: Arc<Mutex<FakeRuntimeState>>,
    }

    impl FakeContainerRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_image_missing(&self, missing: bool) {
            self.state.lock().image_missing = missing;
        }

        pub fn started_specs(&self) -> Vec<ContainerSpec> {
            self.state.lock().started.clone()
        }

        pub fn stopped_names(&self) -> Vec<String> {
            self.state.lock().stopped.clone()
        }

        /// Take the feed side of a started container.
        pub fn take_container(&self, name: &str) -> Option<FakeContainer> {
            self.state.lock().containers.remove(name)
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeContainerRuntime {
        async fn daemon_available(&self) -> bool {
            true
        }

        async fn image_exists(&self, _image: &str) -> bool {
            !self.state.lock().image_missing
        }

        async fn start(&self, spec: ContainerSpec) -> Result<ContainerHandle, ContainerError> {
            let (data_tx, data_rx) = mpsc::channel(64);
            let (exit_tx, exit_rx) = oneshot::channel();
            let mut state = self.state.lock();
            state.started.push(spec.clone());
            state.containers.insert(
                spec.name.clone(),
                FakeContainer { stdout: data_tx, exit: Some(exit_tx) },
            );
            Ok(ContainerHandle { name: spec.name, stdout: data_rx, exit: exit_rx })
        }

        async fn stop(&self, name: &str) -> Result<(), ContainerError> {
            let mut state = self.state.lock();
            state.stopped.push(name.to_string());
            // Dropping the feed side closes stdout, ending the reader loop.
            if let Some(container) = state.containers.remove(name) {
                container.finish(Some(137));
            }
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeContainer, FakeContainerRuntime};

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
