// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal supervisor: one PTY per interactive agent, running the assistant
//! CLI inside a login shell.
//!
//! Output fans out two ways: `terminal-data` notifications for the UI, and a
//! per-terminal broadcast channel for local observers (exit watchers, paste
//! handshakes, boot detection). The narrow text patterns scraped from output
//! live in `bm_core::scrape`.

use crate::agents::AgentDirectory;
use crate::bus::EventTx;
use crate::error::EngineError;
use crate::spawn_queue::SpawnQueue;
use bm_adapters::{AttentionSockets, PtyAdapter, PtyController, PtyEvent, PtySpawnSpec};
use bm_core::scrape::{self, Marker, MarkerScanner};
use bm_core::{AgentId, Event, TerminalId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Tuning knobs; tests shrink the delays.
#[derive(Debug, Clone)]
pub struct TerminalConfig {
    /// Assistant binary written to the PTY after the shell settles.
    pub assistant_bin: String,
    /// Wait for the login shell before writing the launch line.
    pub settle_delay: Duration,
    /// Per-code-point delay for `type_text`; defeats bracketed paste.
    pub type_delay: Duration,
    /// How long `paste_prompt` waits for the paste echo.
    pub paste_wait: Duration,
    /// Grace between kill and forced cleanup.
    pub kill_grace: Duration,
    /// Where the assistant keeps per-directory session files.
    pub session_root: PathBuf,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            assistant_bin: std::env::var("BISMARK_ASSISTANT_BIN")
                .unwrap_or_else(|_| "claude".to_string()),
            settle_delay: Duration::from_millis(500),
            type_delay: Duration::from_millis(5),
            paste_wait: Duration::from_secs(2),
            kill_grace: Duration::from_secs(2),
            session_root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/"))
                .join(".claude")
                .join("projects"),
        }
    }
}

struct TerminalEntry {
    agent_id: AgentId,
    controller: Arc<dyn PtyController>,
    observers: broadcast::Sender<String>,
}

pub struct TerminalSupervisor {
    pty: Arc<dyn PtyAdapter>,
    agents: Arc<AgentDirectory>,
    spawn_queue: SpawnQueue,
    attention: Arc<AttentionSockets>,
    events: EventTx,
    config: TerminalConfig,
    terminals: Mutex<HashMap<TerminalId, TerminalEntry>>,
    /// Back-reference for the tasks this supervisor spawns.
    self_ref: std::sync::Weak<Self>,
}

impl TerminalSupervisor {
    pub fn new(
        pty: Arc<dyn PtyAdapter>,
        agents: Arc<AgentDirectory>,
        spawn_queue: SpawnQueue,
        attention: Arc<AttentionSockets>,
        events: EventTx,
        config: TerminalConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            pty,
            agents,
            spawn_queue,
            attention,
            events,
            config,
            terminals: Mutex::new(HashMap::new()),
            self_ref: self_ref.clone(),
        })
    }

    fn strong(&self) -> Option<Arc<Self>> {
        self.self_ref.upgrade()
    }

    /// Spawn a PTY for the agent and launch the assistant in it.
    pub async fn create(
        &self,
        agent_id: &AgentId,
        initial_prompt: Option<String>,
        extra_dirs: Vec<PathBuf>,
    ) -> Result<TerminalId, EngineError> {
        let agent = self.agents.require(agent_id)?;

        let cwd = if agent.directory.is_dir() {
            agent.directory.clone()
        } else {
            tracing::warn!(
                agent = %agent_id,
                missing = %agent.directory.display(),
                "working directory missing, falling back to home"
            );
            dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
        };

        let launch = self.launch_line(&agent.id, &cwd, agent.session_id.as_deref(), &extra_dirs, initial_prompt.as_deref());

        let permit = self
            .spawn_queue
            .acquire(*agent_id)
            .await
            .map_err(|e| EngineError::ResourceUnavailable(e.to_string()))?;

        let spec = PtySpawnSpec {
            cwd,
            env: vec![
                ("TERM".into(), "xterm-256color".into()),
                ("COLORTERM".into(), "truecolor".into()),
                ("WORKSPACE_ID".into(), agent_id.to_string()),
            ],
            cols: 80,
            rows: 30,
        };
        let session = self.pty.spawn(spec).await?;
        drop(permit);

        let terminal_id = TerminalId::generate();
        let (observer_tx, _) = broadcast::channel(256);
        self.terminals.lock().insert(
            terminal_id,
            TerminalEntry {
                agent_id: *agent_id,
                controller: Arc::clone(&session.controller),
                observers: observer_tx.clone(),
            },
        );

        // Every interactive agent gets its out-of-band attention socket.
        if let Err(e) = self.attention.open(agent_id) {
            tracing::warn!(agent = %agent_id, error = %e, "attention socket unavailable");
        }

        // Creation is announced before any data can flow for this id.
        self.events
            .emit(Event::TerminalCreated { terminal_id, agent_id: *agent_id });

        if let Some(supervisor) = self.strong() {
            let agent_for_pump = *agent_id;
            tokio::spawn(async move {
                supervisor
                    .pump(terminal_id, agent_for_pump, session.events, observer_tx)
                    .await;
            });
        }

        if let Some(supervisor) = self.strong() {
            let settle = self.config.settle_delay;
            tokio::spawn(async move {
                tokio::time::sleep(settle).await;
                supervisor.write(&terminal_id, format!("{}\r", launch).as_bytes());
            });
        }

        Ok(terminal_id)
    }

    /// Assistant invocation for this agent, including session handling.
    fn launch_line(
        &self,
        agent_id: &AgentId,
        cwd: &std::path::Path,
        cached_session: Option<&str>,
        extra_dirs: &[PathBuf],
        initial_prompt: Option<&str>,
    ) -> String {
        let mut parts = vec![self.config.assistant_bin.clone()];
        for dir in extra_dirs {
            parts.push("--add-dir".into());
            parts.push(shell_quote(&dir.display().to_string()));
        }

        match cached_session {
            Some(session_id) if self.session_file_usable(cwd, session_id) => {
                parts.push("--resume".into());
                parts.push(session_id.to_string());
            }
            _ => {
                let session_id = uuid::Uuid::new_v4().to_string();
                self.agents.set_session_id(agent_id, Some(session_id.clone()));
                parts.push("--session-id".into());
                parts.push(session_id);
            }
        }

        if let Some(prompt) = initial_prompt {
            parts.push(shell_quote(prompt));
        }
        parts.join(" ")
    }

    /// A cached session id is only worth resuming if the assistant's session
    /// file exists and is non-empty.
    fn session_file_usable(&self, cwd: &std::path::Path, session_id: &str) -> bool {
        let munged: String = cwd
            .display()
            .to_string()
            .chars()
            .map(|c| if c == '/' || c == '.' { '-' } else { c })
            .collect();
        let path = self
            .config
            .session_root
            .join(munged)
            .join(format!("{}.jsonl", session_id));
        std::fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false)
    }

    async fn pump(
        self: Arc<Self>,
        terminal_id: TerminalId,
        agent_id: AgentId,
        mut events: tokio::sync::mpsc::Receiver<PtyEvent>,
        observers: broadcast::Sender<String>,
    ) {
        let mut scanner = MarkerScanner::new();
        let mut exit_code = None;
        while let Some(event) = events.recv().await {
            match event {
                PtyEvent::Data(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    for marker in scanner.feed(&text) {
                        match marker {
                            // The conversation was cleared; the cached
                            // session id no longer resumes anything.
                            Marker::Clear => self.agents.set_session_id(&agent_id, None),
                            Marker::Boot => {
                                tracing::debug!(terminal = %terminal_id, "assistant booted")
                            }
                            Marker::PasteEcho | Marker::Exit => {}
                        }
                    }
                    let _ = observers.send(text.clone());
                    self.events
                        .emit(Event::TerminalData { terminal_id, data: text });
                }
                PtyEvent::Exit(code) => {
                    exit_code = code;
                    break;
                }
            }
        }
        self.terminals.lock().remove(&terminal_id);
        self.attention.close(&agent_id);
        self.events.emit(Event::TerminalExit { terminal_id, code: exit_code });
    }

    /// Write raw bytes. Unknown terminal ids are a no-op.
    pub fn write(&self, terminal_id: &TerminalId, data: &[u8]) {
        let controller = {
            let terminals = self.terminals.lock();
            terminals.get(terminal_id).map(|e| Arc::clone(&e.controller))
        };
        if let Some(controller) = controller {
            if controller.write(data).is_err() {
                tracing::debug!(terminal = %terminal_id, "write to dead pty");
            }
        }
    }

    pub fn resize(&self, terminal_id: &TerminalId, cols: u16, rows: u16) {
        let terminals = self.terminals.lock();
        if let Some(entry) = terminals.get(terminal_id) {
            let _ = entry.controller.resize(cols, rows);
        }
    }

    /// Signal termination; if no exit is observed within the grace period
    /// the entry is reaped and the exit reported as unknown.
    pub fn close(&self, terminal_id: &TerminalId) {
        let controller = {
            let terminals = self.terminals.lock();
            terminals.get(terminal_id).map(|e| Arc::clone(&e.controller))
        };
        let Some(controller) = controller else { return };
        controller.kill();

        let Some(supervisor) = self.strong() else { return };
        let terminal_id = *terminal_id;
        let grace = self.config.kill_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if supervisor.terminals.lock().remove(&terminal_id).is_some() {
                supervisor
                    .events
                    .emit(Event::TerminalExit { terminal_id, code: None });
            }
        });
    }

    pub fn close_for_agent(&self, agent_id: &AgentId) {
        if let Some(terminal_id) = self.terminal_for_agent(agent_id) {
            self.close(&terminal_id);
        }
    }

    /// Kill every PTY before process exit.
    pub fn close_all(&self) {
        let terminals = self.terminals.lock();
        for entry in terminals.values() {
            entry.controller.kill();
        }
    }

    pub fn terminal_for_agent(&self, agent_id: &AgentId) -> Option<TerminalId> {
        self.terminals
            .lock()
            .iter()
            .find(|(_, e)| &e.agent_id == agent_id)
            .map(|(id, _)| *id)
    }

    pub fn agent_of(&self, terminal_id: &TerminalId) -> Option<AgentId> {
        self.terminals.lock().get(terminal_id).map(|e| e.agent_id)
    }

    /// Local observer stream of decoded output chunks.
    pub fn observe(&self, terminal_id: &TerminalId) -> Option<broadcast::Receiver<String>> {
        self.terminals
            .lock()
            .get(terminal_id)
            .map(|e| e.observers.subscribe())
    }

    /// Block until `pattern` shows up in output, or the timeout passes.
    /// Timeouts are an answer, not an error.
    pub async fn wait_for_output(
        &self,
        terminal_id: &TerminalId,
        pattern: &str,
        timeout: Duration,
    ) -> bool {
        let Some(mut rx) = self.observe(terminal_id) else { return false };
        let deadline = tokio::time::Instant::now() + timeout;
        let mut window = String::new();
        loop {
            let chunk = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return false,
                chunk = rx.recv() => chunk,
            };
            match chunk {
                Ok(text) => {
                    window.push_str(&text);
                    if window.contains(pattern) {
                        return true;
                    }
                    // Keep enough tail for a straddled match.
                    if window.len() > pattern.len().max(64) * 4 {
                        let cut = window.len() - pattern.len().max(64);
                        let cut = window
                            .char_indices()
                            .map(|(i, _)| i)
                            .take_while(|&i| i <= cut)
                            .last()
                            .unwrap_or(0);
                        window.drain(..cut);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    }

    /// Write one code point at a time. Slow enough that the assistant's
    /// bracketed-paste heuristic never trips.
    pub async fn type_text(&self, terminal_id: &TerminalId, text: &str) {
        let mut buf = [0u8; 4];
        for c in text.chars() {
            self.write(terminal_id, c.encode_utf8(&mut buf).as_bytes());
            tokio::time::sleep(self.config.type_delay).await;
        }
    }

    /// Paste a whole prompt, wait for the assistant to acknowledge the
    /// bracketed paste, then submit it.
    pub async fn paste_prompt(&self, terminal_id: &TerminalId, text: &str) {
        self.write(terminal_id, text.as_bytes());
        let acknowledged = self
            .wait_for_output(terminal_id, scrape::PASTE_ECHO, self.config.paste_wait)
            .await;
        let pause = if acknowledged {
            Duration::from_millis(100)
        } else {
            Duration::from_millis(50)
        };
        tokio::time::sleep(pause).await;
        self.write(terminal_id, b"\r");
    }
}

/// Single-quote shell quoting; embedded quotes become `'\''`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
#[path = "terminal_tests.rs"]
mod tests;
