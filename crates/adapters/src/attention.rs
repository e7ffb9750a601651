// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attention sockets: out-of-band "agent needs a human" signalling.
//!
//! Each active agent gets a Unix listening socket at
//! `/tmp/bm/{instance8}/{agent8}.sock`. An external hook connects, writes one
//! JSON line (`{"event":"stop",...}`) and closes. Socket paths are kept short
//! because `sun_path` tops out at 104 bytes on the BSDs.

use bm_core::AgentId;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum AttentionError {
    #[error("socket path too long ({len} bytes): {path}")]
    PathTooLong { path: String, len: usize },

    #[error("bind failed at {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Longest socket path accepted; the BSD `sun_path` limit.
const MAX_SOCKET_PATH: usize = 104;

/// A `stop` signal received for an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttentionSignal {
    pub agent_id: AgentId,
    pub reason: Option<String>,
}

/// Wire shape written by the hook script.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HookMessage {
    event: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    workspace_id: Option<String>,
}

struct SocketEntry {
    token: CancellationToken,
    path: PathBuf,
}

/// Manages one listening socket per active agent.
pub struct AttentionSockets {
    base_dir: PathBuf,
    tx: mpsc::Sender<AttentionSignal>,
    sockets: Mutex<HashMap<AgentId, SocketEntry>>,
}

impl AttentionSockets {
    /// `instance8` is this daemon instance's short id; it namespaces the
    /// socket directory so two instances never collide.
    pub fn new(instance8: &str, tx: mpsc::Sender<AttentionSignal>) -> Self {
        let base_dir = std::env::temp_dir().join("bm").join(instance8);
        Self { base_dir, tx, sockets: Mutex::new(HashMap::new()) }
    }

    pub fn socket_path(&self, agent_id: &AgentId) -> PathBuf {
        self.base_dir.join(format!("{}.sock", agent_id.short8()))
    }

    /// Create and start listening on the agent's socket. Idempotent: an
    /// already-open agent keeps its existing socket.
    pub fn open(&self, agent_id: &AgentId) -> Result<PathBuf, AttentionError> {
        {
            let sockets = self.sockets.lock();
            if let Some(entry) = sockets.get(agent_id) {
                return Ok(entry.path.clone());
            }
        }

        let path = self.socket_path(agent_id);
        let path_str = path.display().to_string();
        if path_str.len() > MAX_SOCKET_PATH {
            return Err(AttentionError::PathTooLong { len: path_str.len(), path: path_str });
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AttentionError::Bind { path: path.clone(), source: e })?;
        }
        // A stale file from a crashed instance blocks bind.
        let _ = std::fs::remove_file(&path);

        let listener = UnixListener::bind(&path)
            .map_err(|e| AttentionError::Bind { path: path.clone(), source: e })?;

        let token = CancellationToken::new();
        let accept_token = token.clone();
        let tx = self.tx.clone();
        let agent = agent_id.clone();
        tokio::spawn(async move {
            accept_loop(listener, agent, tx, accept_token).await;
        });

        self.sockets
            .lock()
            .insert(agent_id.clone(), SocketEntry { token, path: path.clone() });
        Ok(path)
    }

    /// Stop listening and delete the socket file.
    pub fn close(&self, agent_id: &AgentId) {
        if let Some(entry) = self.sockets.lock().remove(agent_id) {
            entry.token.cancel();
            let _ = std::fs::remove_file(&entry.path);
        }
    }

    pub fn close_all(&self) {
        let entries: Vec<AgentId> = self.sockets.lock().keys().cloned().collect();
        for agent_id in entries {
            self.close(&agent_id);
        }
    }

    pub fn is_open(&self, agent_id: &AgentId) -> bool {
        self.sockets.lock().contains_key(agent_id)
    }
}

async fn accept_loop(
    listener: UnixListener,
    agent_id: AgentId,
    tx: mpsc::Sender<AttentionSignal>,
    token: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        let mut stream = match accepted {
            Ok((stream, _)) => stream,
            Err(e) => {
                tracing::warn!(agent = %agent_id, error = %e, "attention accept failed");
                continue;
            }
        };

        // The hook writes at most a few lines and closes, so the whole
        // stream is read before parsing. A missing trailing newline on the
        // final line is fine.
        let mut raw = String::new();
        if let Err(e) = stream.read_to_string(&mut raw).await {
            tracing::warn!(agent = %agent_id, error = %e, "attention read failed");
            continue;
        }

        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let message: HookMessage = match serde_json::from_str(line) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(agent = %agent_id, error = %e, "discarding unparseable hook message");
                    continue;
                }
            };
            if message.event != "stop" {
                tracing::debug!(agent = %agent_id, event = %message.event, "ignoring hook event");
                continue;
            }
            if let Some(ref claimed) = message.workspace_id {
                if claimed != agent_id.as_str() {
                    // The socket identity wins; the payload id is advisory.
                    tracing::warn!(agent = %agent_id, claimed, "hook workspace id mismatch");
                }
            }
            let signal = AttentionSignal { agent_id: agent_id.clone(), reason: message.reason };
            if tx.send(signal).await.is_err() {
                return;
            }
        }
    }
}

/// Short instance id for socket-path namespacing: first 8 hex chars of a
/// fresh UUID.
pub fn new_instance_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Validate that a socket path for this instance/agent combination fits.
pub fn socket_path_fits(base: &Path, agent_id: &AgentId) -> bool {
    base.join(format!("{}.sock", agent_id.short8()))
        .display()
        .to_string()
        .len()
        <= MAX_SOCKET_PATH
}

#[cfg(test)]
#[path = "attention_tests.rs"]
mod tests;
