// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pseudo-terminal allocation.
//!
//! One PTY per interactive agent, holding a login shell. Reads happen on a
//! dedicated thread per PTY (the master side is a blocking fd) and are pumped
//! into an async channel; the exit status follows on the same channel.

use async_trait::async_trait;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum PtyError {
    #[error("pty open failed: {0}")]
    OpenFailed(String),

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("pty gone")]
    Gone,
}

/// What to run in the PTY.
#[derive(Debug, Clone)]
pub struct PtySpawnSpec {
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub cols: u16,
    pub rows: u16,
}

/// Output side of a PTY: data chunks, then exactly one `Exit`.
#[derive(Debug, Clone, PartialEq)]
pub enum PtyEvent {
    Data(Vec<u8>),
    Exit(Option<i32>),
}

/// Input side of a PTY.
pub trait PtyController: Send + Sync + 'static {
    fn write(&self, data: &[u8]) -> Result<(), PtyError>;
    fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError>;
    fn kill(&self);
}

pub struct PtySession {
    pub events: mpsc::Receiver<PtyEvent>,
    pub controller: Arc<dyn PtyController>,
}

#[async_trait]
pub trait PtyAdapter: Send + Sync + 'static {
    async fn spawn(&self, spec: PtySpawnSpec) -> Result<PtySession, PtyError>;
}

/// Native PTY via `portable-pty`, running the user's login shell.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativePty;

impl NativePty {
    pub fn new() -> Self {
        Self
    }
}

struct NativeController {
    writer: Mutex<Box<dyn Write + Send>>,
    master: Mutex<Box<dyn portable_pty::MasterPty + Send>>,
    killer: Mutex<Box<dyn portable_pty::ChildKiller + Send + Sync>>,
}

impl PtyController for NativeController {
    fn write(&self, data: &[u8]) -> Result<(), PtyError> {
        let mut writer = self.writer.lock();
        writer.write_all(data).map_err(|_| PtyError::Gone)?;
        writer.flush().map_err(|_| PtyError::Gone)
    }

    fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.master
            .lock()
            .resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .map_err(|_| PtyError::Gone)
    }

    fn kill(&self) {
        let _ = self.killer.lock().kill();
    }
}

#[async_trait]
impl PtyAdapter for NativePty {
    async fn spawn(&self, spec: PtySpawnSpec) -> Result<PtySession, PtyError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: spec.rows,
                cols: spec.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::OpenFailed(e.to_string()))?;

        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
        let mut cmd = CommandBuilder::new(&shell);
        cmd.arg("-l");
        cmd.cwd(&spec.cwd);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        // The slave fd is the child's; holding it open would keep the master
        // read side alive after exit.
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::OpenFailed(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::OpenFailed(e.to_string()))?;
        let killer = child.clone_killer();

        let (tx, rx) = mpsc::channel::<PtyEvent>(256);

        let data_tx = tx.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if data_tx.blocking_send(PtyEvent::Data(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        std::thread::spawn(move || {
            let code = child.wait().ok().map(|status| status.exit_code() as i32);
            let _ = tx.blocking_send(PtyEvent::Exit(code));
        });

        Ok(PtySession {
            events: rx,
            controller: Arc::new(NativeController {
                writer: Mutex::new(writer),
                master: Mutex::new(pair.master),
                killer: Mutex::new(killer),
            }),
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;

    struct FakeSessionState {
        written: Vec<u8>,
        size: (u16, u16),
        killed: bool,
    }

    /// Test-side handle to one fake PTY.
    #[derive(Clone)]
    pub struct FakePtyHandle {
        pub spec: PtySpawnSpec,
        state: Arc<Mutex<FakeSessionState>>,
        tx: mpsc::Sender<PtyEvent>,
    }

    impl FakePtyHandle {
        /// Everything the engine wrote to this PTY, lossily decoded.
        pub fn written(&self) -> String {
            String::from_utf8_lossy(&self.state.lock().written).into_owned()
        }

        pub fn size(&self) -> (u16, u16) {
            self.state.lock().size
        }

        pub fn killed(&self) -> bool {
            self.state.lock().killed
        }

        /// Inject child output.
        pub async fn emit(&self, data: &str) {
            let _ = self.tx.send(PtyEvent::Data(data.as_bytes().to_vec())).await;
        }

        /// Report child exit.
        pub async fn exit(&self, code: Option<i32>) {
            let _ = self.tx.send(PtyEvent::Exit(code)).await;
        }
    }

    struct FakeController {
        state: Arc<Mutex<FakeSessionState>>,
    }

    impl PtyController for FakeController {
        fn write(&self, data: &[u8]) -> Result<(), PtyError> {
            self.state.lock().written.extend_from_slice(data);
            Ok(())
        }

        fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
            self.state.lock().size = (cols, rows);
            Ok(())
        }

        fn kill(&self) {
            self.state.lock().killed = true;
        }
    }

    /// PTY adapter double. Sessions are recorded in spawn order.
    #[derive(Clone, Default)]
    pub struct FakePtyAdapter {
        sessions: Arc<Mutex<Vec<FakePtyHandle>>>,
        fail_next: Arc<Mutex<bool>>,
    }

    impl FakePtyAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_next_spawn(&self) {
            *self.fail_next.lock() = true;
        }

        pub fn sessions(&self) -> Vec<FakePtyHandle> {
            self.sessions.lock().clone()
        }

        pub fn session(&self, index: usize) -> Option<FakePtyHandle> {
            self.sessions.lock().get(index).cloned()
        }

        pub fn spawn_count(&self) -> usize {
            self.sessions.lock().len()
        }
    }

    #[async_trait]
    impl PtyAdapter for FakePtyAdapter {
        async fn spawn(&self, spec: PtySpawnSpec) -> Result<PtySession, PtyError> {
            {
                let mut fail = self.fail_next.lock();
                if *fail {
                    *fail = false;
                    return Err(PtyError::SpawnFailed("forced failure".into()));
                }
            }
            let (tx, rx) = mpsc::channel(256);
            let state = Arc::new(Mutex::new(FakeSessionState {
                written: Vec::new(),
                size: (spec.cols, spec.rows),
                killed: false,
            }));
            let handle =
                FakePtyHandle { spec, state: Arc::clone(&state), tx };
            self.sessions.lock().push(handle);
            Ok(PtySession { events: rx, controller: Arc::new(FakeController { state }) })
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakePtyAdapter, FakePtyHandle};

#[cfg(test)]
#[path = "pty_tests.rs"]
mod tests;
