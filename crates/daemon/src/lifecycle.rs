// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: single-instancing, socket setup, startup, shutdown.

use crate::event_bus::EventBus;
use crate::listener::{ListenCtx, Listener};
use bm_adapters::{CliGit, CliTaskStore, DesktopNotifier, DockerRuntime, NativePty};
use bm_core::SystemClock;
use bm_engine::{Runtime, RuntimeConfig, RuntimeDeps};
use bm_storage::{ConfigPaths, ConfigStore};
use fs2::FileExt;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("another daemon instance holds the lock at {0}")]
    AlreadyRunning(PathBuf),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Daemon paths, all under the config root.
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: ConfigPaths,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub log_dir: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let paths = ConfigPaths::resolve();
        Self {
            socket_path: paths.root().join("daemon.sock"),
            lock_path: paths.root().join("daemon.pid"),
            log_dir: paths.root().join("logs"),
            paths,
        }
    }
}

/// Live daemon state; dropping it releases the instance lock.
pub struct Daemon {
    pub config: Config,
    pub runtime: Arc<Runtime>,
    pub event_bus: EventBus,
    pub shutdown: Arc<Notify>,
    // Held for the exclusive flock; released on drop.
    #[allow(dead_code)]
    lock_file: File,
}

fn io_err(path: &PathBuf, source: std::io::Error) -> LifecycleError {
    LifecycleError::Io { path: path.clone(), source }
}

/// Bring the daemon up: lock, storage, runtime, listener.
pub fn startup(config: Config) -> Result<(Daemon, Listener), LifecycleError> {
    std::fs::create_dir_all(config.paths.root())
        .map_err(|e| io_err(&config.paths.root().to_path_buf(), e))?;

    // At most one orchestrator process per config root.
    let lock_file =
        File::create(&config.lock_path).map_err(|e| io_err(&config.lock_path, e))?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::AlreadyRunning(config.lock_path.clone()))?;
    std::fs::write(&config.lock_path, std::process::id().to_string())
        .map_err(|e| io_err(&config.lock_path, e))?;

    // A stale socket from a crashed instance blocks bind.
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    let unix = {
        let std_listener = std::os::unix::net::UnixListener::bind(&config.socket_path)
            .map_err(|e| io_err(&config.socket_path, e))?;
        std_listener
            .set_nonblocking(true)
            .map_err(|e| io_err(&config.socket_path, e))?;
        UnixListener::from_std(std_listener).map_err(|e| io_err(&config.socket_path, e))?
    };

    let store = ConfigStore::new(config.paths.clone());
    let deps = RuntimeDeps {
        pty: Arc::new(NativePty::new()),
        git: Arc::new(CliGit::new()),
        containers: Arc::new(DockerRuntime::new()),
        taskstore: Arc::new(CliTaskStore::new()),
        notifier: Arc::new(DesktopNotifier::new()),
        clock: Arc::new(SystemClock),
    };
    let (runtime, event_rx) = Runtime::start(store, deps, RuntimeConfig::default());
    runtime.startup();

    let event_bus = EventBus::new();
    event_bus.pump_from(event_rx);

    let shutdown = Arc::new(Notify::new());
    let ctx = Arc::new(ListenCtx {
        runtime: Arc::clone(&runtime),
        event_bus: event_bus.clone(),
        shutdown: Arc::clone(&shutdown),
    });
    let listener = Listener::new(unix, ctx);

    info!(
        socket = %config.socket_path.display(),
        instance = %runtime.instance_id,
        "daemon ready"
    );

    Ok((Daemon { config, runtime, event_bus, shutdown, lock_file }, listener))
}

impl Daemon {
    /// Orderly teardown; safe to call once at exit.
    pub fn shutdown_now(&self) {
        info!("daemon shutting down");
        self.runtime.shutdown();
        if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, "socket cleanup failed");
            }
        }
        let _ = std::fs::remove_file(&self.config.lock_path);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
