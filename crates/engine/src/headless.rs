// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Headless worker runtime: containerized assistants speaking newline-
//! delimited JSON on stdout.
//!
//! One supervision task per run feeds the stream parser, persists events
//! with a debounce, and derives status. The debounce is reset by every new
//! event; transitions and shutdown flush immediately so crash recovery
//! loses at most the debounce window of tail events — and the log itself is
//! append-only JSONL, so a torn final line is tolerated on replay.

use crate::agents::AgentDirectory;
use crate::bus::EventTx;
use crate::error::EngineError;
use bm_adapters::{
    ContainerRuntime, ContainerSpec, GitAdapter, Mount, StreamParser, TOKEN_ENV,
};
use bm_core::{
    Clock, Event, HeadlessAgentInfo, HeadlessResult, HeadlessStatus, PlanId, StreamEvent, TaskId,
};
use bm_storage::ConfigStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How long event persistence may lag behind arrival.
pub const FLUSH_DEBOUNCE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub image: String,
    pub cpus: Option<String>,
    pub memory: Option<String>,
    /// URL the container uses to reach the tool proxy.
    pub proxy_url: String,
    pub debounce: Duration,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            image: std::env::var("BISMARK_WORKER_IMAGE")
                .unwrap_or_else(|_| "bismark-worker:latest".to_string()),
            cpus: Some("2".to_string()),
            memory: Some("4g".to_string()),
            proxy_url: format!(
                "http://host.docker.internal:{}",
                bm_adapters::DEFAULT_PROXY_PORT
            ),
            debounce: FLUSH_DEBOUNCE,
        }
    }
}

/// Terminal outcome of a run, delivered to the plan engine.
#[derive(Debug, Clone)]
pub struct HeadlessOutcome {
    pub task_id: TaskId,
    pub plan_id: Option<PlanId>,
    pub status: HeadlessStatus,
    pub result: Option<HeadlessResult>,
}

struct RunEntry {
    info: HeadlessAgentInfo,
    pending: Vec<StreamEvent>,
    token: CancellationToken,
    outcome_sent: bool,
}

pub struct HeadlessRuntime {
    containers: Arc<dyn ContainerRuntime>,
    git: Arc<dyn GitAdapter>,
    agents: Arc<AgentDirectory>,
    store: ConfigStore,
    events: EventTx,
    clock: Arc<dyn Clock>,
    config: HeadlessConfig,
    outcome_tx: mpsc::UnboundedSender<HeadlessOutcome>,
    runs: Mutex<HashMap<TaskId, RunEntry>>,
    /// Back-reference for the per-run supervision tasks.
    self_ref: std::sync::Weak<Self>,
}

impl HeadlessRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        containers: Arc<dyn ContainerRuntime>,
        git: Arc<dyn GitAdapter>,
        agents: Arc<AgentDirectory>,
        store: ConfigStore,
        events: EventTx,
        clock: Arc<dyn Clock>,
        config: HeadlessConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<HeadlessOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        (
            Arc::new_cyclic(|self_ref| Self {
                containers,
                git,
                agents,
                store,
                events,
                clock,
                config,
                outcome_tx,
                runs: Mutex::new(HashMap::new()),
                self_ref: self_ref.clone(),
            }),
            outcome_rx,
        )
    }

    pub fn container_name(task_id: &TaskId) -> String {
        let safe: String = task_id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        format!("bm-{}", safe)
    }

    /// Launch a worker container against a worktree.
    ///
    /// `headless-agent-started` is emitted before any event from the stream
    /// can be observed.
    pub async fn start(
        &self,
        task_id: TaskId,
        plan_id: Option<PlanId>,
        worktree: PathBuf,
        prompt: String,
        auth_token: String,
    ) -> Result<(), EngineError> {
        {
            let runs = self.runs.lock();
            if let Some(entry) = runs.get(&task_id) {
                if !entry.info.status.is_terminal() {
                    return Err(EngineError::AlreadyExists(format!(
                        "headless run for {}",
                        task_id
                    )));
                }
            }
        }

        if !self.containers.daemon_available().await {
            return Err(EngineError::ExternalTool("container daemon unavailable".into()));
        }
        if !self.containers.image_exists(&self.config.image).await {
            return Err(EngineError::ExternalTool(format!(
                "worker image missing: {}",
                self.config.image
            )));
        }

        let mut info =
            HeadlessAgentInfo::new(task_id.clone(), plan_id, worktree.clone(), self.clock.epoch_ms());
        info.status = HeadlessStatus::Starting;
        let token = CancellationToken::new();
        self.runs.lock().insert(
            task_id.clone(),
            RunEntry { info: info.clone(), pending: Vec::new(), token: token.clone(), outcome_sent: false },
        );
        self.events.emit(Event::HeadlessAgentStarted {
            task_id: task_id.clone(),
            plan_id,
            worktree_path: worktree.clone(),
        });
        self.emit_update(&task_id);
        self.persist_snapshot(&task_id);

        let spec = ContainerSpec {
            name: Self::container_name(&task_id),
            image: self.config.image.clone(),
            cpus: self.config.cpus.clone(),
            memory: self.config.memory.clone(),
            mounts: vec![Mount {
                host: worktree,
                container: "/workspace".to_string(),
                read_write: true,
            }],
            env: vec![
                ("TOOL_PROXY_URL".to_string(), self.config.proxy_url.clone()),
                ("BISMARK_TASK_ID".to_string(), task_id.to_string()),
                ("BISMARK_PROMPT".to_string(), prompt),
                (TOKEN_ENV.to_string(), auth_token),
            ],
            workdir: Some("/workspace".to_string()),
        };

        let handle = match self.containers.start(spec).await {
            Ok(handle) => handle,
            Err(e) => {
                self.transition(&task_id, HeadlessStatus::Failed, None);
                return Err(e.into());
            }
        };

        self.transition(&task_id, HeadlessStatus::Running, None);

        if let Some(runtime) = self.self_ref.upgrade() {
            tokio::spawn(async move {
                runtime.supervise(task_id, handle, token).await;
            });
        }
        Ok(())
    }

    async fn supervise(
        self: Arc<Self>,
        task_id: TaskId,
        mut handle: bm_adapters::ContainerHandle,
        token: CancellationToken,
    ) {
        let container = handle.name.clone();
        let mut parser = StreamParser::new();
        let mut flush_at: Option<tokio::time::Instant> = None;
        let mut stop_sent = false;

        loop {
            // `move` copies the deadline out so the select arms may still
            // reassign it.
            let flush_timer = async move {
                match flush_at {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = token.cancelled(), if !stop_sent => {
                    stop_sent = true;
                    if let Err(e) = self.containers.stop(&container).await {
                        tracing::warn!(container = %container, error = %e, "container stop failed");
                    }
                }
                _ = flush_timer => {
                    self.flush(&task_id);
                    flush_at = None;
                }
                chunk = handle.stdout.recv() => {
                    match chunk {
                        Some(bytes) => {
                            let events = parser.feed(&bytes);
                            if !events.is_empty() {
                                self.ingest(&task_id, events);
                                flush_at = Some(tokio::time::Instant::now() + self.config.debounce);
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        if let Some(event) = parser.finish() {
            self.ingest(&task_id, vec![event]);
        }
        if parser.parse_failures() > 0 {
            tracing::warn!(
                task = %task_id,
                failures = parser.parse_failures(),
                "headless stream had unparseable lines"
            );
        }

        let exit_code = handle.exit.await.unwrap_or(None);
        self.finalize(&task_id, exit_code);
    }

    /// Append events, emit them, and handle the `result` transition.
    fn ingest(&self, task_id: &TaskId, events: Vec<StreamEvent>) {
        let mut result = None;
        let plan_id = {
            let mut runs = self.runs.lock();
            let Some(entry) = runs.get_mut(task_id) else { return };
            for event in &events {
                if let Some(r) = event.as_result() {
                    result = Some(r);
                }
                entry.info.events.push(event.clone());
                entry.pending.push(event.clone());
            }
            entry.info.plan_id
        };

        for event in events {
            self.events.emit(Event::HeadlessAgentEvent {
                plan_id,
                task_id: task_id.clone(),
                event,
            });
        }

        if let Some(result) = result {
            self.transition(task_id, HeadlessStatus::Completed, Some(result));
        }
    }

    /// Container ended. Derive the final status unless a `result` event (or
    /// a user stop) already settled it.
    fn finalize(&self, task_id: &TaskId, exit_code: Option<i32>) {
        let current = {
            let runs = self.runs.lock();
            let Some(entry) = runs.get(task_id) else { return };
            entry.info.status
        };
        match current {
            HeadlessStatus::Completed | HeadlessStatus::Failed => {
                self.flush(task_id);
                self.send_outcome(task_id);
            }
            HeadlessStatus::Stopping => {
                self.transition(task_id, HeadlessStatus::Completed, None);
            }
            _ => {
                if exit_code == Some(0) {
                    let result =
                        HeadlessResult { success: true, exit_code, ..Default::default() };
                    self.transition(task_id, HeadlessStatus::Completed, Some(result));
                } else {
                    let result =
                        HeadlessResult { success: false, exit_code, ..Default::default() };
                    self.transition(task_id, HeadlessStatus::Failed, Some(result));
                }
            }
        }
    }

    fn transition(&self, task_id: &TaskId, status: HeadlessStatus, result: Option<HeadlessResult>) {
        {
            let mut runs = self.runs.lock();
            let Some(entry) = runs.get_mut(task_id) else { return };
            entry.info.status = status;
            if let Some(result) = result {
                entry.info.result = Some(result);
            }
            if status.is_terminal() {
                entry.info.completed_at_ms = Some(self.clock.epoch_ms());
            }
        }
        self.emit_update(task_id);
        // Transitions always hit disk, debounce notwithstanding.
        self.flush(task_id);
        if status.is_terminal() {
            self.send_outcome(task_id);
        }
    }

    fn send_outcome(&self, task_id: &TaskId) {
        let outcome = {
            let mut runs = self.runs.lock();
            let Some(entry) = runs.get_mut(task_id) else { return };
            if entry.outcome_sent || !entry.info.status.is_terminal() {
                return;
            }
            entry.outcome_sent = true;
            HeadlessOutcome {
                task_id: task_id.clone(),
                plan_id: entry.info.plan_id,
                status: entry.info.status,
                result: entry.info.result.clone(),
            }
        };
        let _ = self.outcome_tx.send(outcome);
    }

    /// Write pending events and the current snapshot.
    fn flush(&self, task_id: &TaskId) {
        let (plan_id, pending) = {
            let mut runs = self.runs.lock();
            let Some(entry) = runs.get_mut(task_id) else { return };
            (entry.info.plan_id, std::mem::take(&mut entry.pending))
        };
        if let Err(e) =
            self.store.append_headless_events(plan_id.as_ref(), task_id, &pending)
        {
            tracing::error!(task = %task_id, error = %e, "headless event flush failed");
        }
        self.persist_snapshot(task_id);
    }

    fn persist_snapshot(&self, task_id: &TaskId) {
        let info = {
            let runs = self.runs.lock();
            let Some(entry) = runs.get(task_id) else { return };
            entry.info.clone()
        };
        if let Err(e) = self.store.save_headless_snapshot(&info) {
            tracing::error!(task = %task_id, error = %e, "headless snapshot save failed");
        }
    }

    fn emit_update(&self, task_id: &TaskId) {
        let info = {
            let runs = self.runs.lock();
            let Some(entry) = runs.get(task_id) else { return };
            entry.info.clone()
        };
        self.events.emit(Event::HeadlessAgentUpdate { info });
    }

    // --- queries ---

    pub fn info(&self, task_id: &TaskId) -> Option<HeadlessAgentInfo> {
        self.runs.lock().get(task_id).map(|e| e.info.clone())
    }

    pub fn list_for_plan(&self, plan_id: &PlanId) -> Vec<HeadlessAgentInfo> {
        self.runs
            .lock()
            .values()
            .filter(|e| e.info.plan_id.as_ref() == Some(plan_id))
            .map(|e| e.info.clone())
            .collect()
    }

    pub fn pull_request_url(&self, task_id: &TaskId) -> Option<String> {
        self.runs.lock().get(task_id).and_then(|e| e.info.pull_request_url())
    }

    // --- lifecycle ---

    /// User-initiated stop: `stopping`, then `completed` once the container
    /// is gone.
    pub fn stop(&self, task_id: &TaskId) {
        let token = {
            let runs = self.runs.lock();
            let Some(entry) = runs.get(task_id) else { return };
            if entry.info.status.is_terminal() {
                return;
            }
            entry.token.clone()
        };
        self.set_status_only(task_id, HeadlessStatus::Stopping);
        token.cancel();
    }

    fn set_status_only(&self, task_id: &TaskId, status: HeadlessStatus) {
        {
            let mut runs = self.runs.lock();
            let Some(entry) = runs.get_mut(task_id) else { return };
            entry.info.status = status;
        }
        self.emit_update(task_id);
        self.flush(task_id);
    }

    pub fn stop_all_for_plan(&self, plan_id: &PlanId) {
        let task_ids: Vec<TaskId> = self
            .runs
            .lock()
            .values()
            .filter(|e| e.info.plan_id.as_ref() == Some(plan_id) && !e.info.status.is_terminal())
            .map(|e| e.info.task_id.clone())
            .collect();
        for task_id in task_ids {
            self.stop(&task_id);
        }
    }

    /// Tear a run down completely. Sub-steps are independent: a failed step
    /// is logged and the rest still run.
    pub async fn destroy(
        &self,
        task_id: &TaskId,
        repo_root: Option<&std::path::Path>,
        branch: Option<&str>,
    ) {
        // Claim the entry up front so the supervision task's finalization
        // cannot resurrect state (or files) mid-teardown.
        let entry = self.runs.lock().remove(task_id);
        let (plan_id, worktree) = match entry.as_ref() {
            Some(entry) => {
                entry.token.cancel();
                (entry.info.plan_id, Some(entry.info.worktree_path.clone()))
            }
            None => (None, None),
        };

        if let Err(e) = self.containers.stop(&Self::container_name(task_id)).await {
            tracing::warn!(task = %task_id, error = %e, "destroy: container stop failed");
        }

        if let (Some(root), Some(ref worktree)) = (repo_root, worktree.as_ref()) {
            if let Err(e) = self.git.remove_worktree(root, worktree, true).await {
                tracing::warn!(task = %task_id, error = %e, "destroy: worktree removal failed");
            }
            if let Err(e) = self.git.prune_worktrees(root).await {
                tracing::warn!(task = %task_id, error = %e, "destroy: worktree prune failed");
            }
        }

        if let (Some(root), Some(branch)) = (repo_root, branch) {
            if let Err(e) = self.git.delete_branch(root, branch, true).await {
                tracing::debug!(task = %task_id, error = %e, "destroy: branch deletion failed");
            }
        }

        // The worker's agent record, if one still points at this task.
        let record = self
            .agents
            .list()
            .into_iter()
            .find(|a| a.role.is_headless() && a.task_id.as_ref() == Some(task_id));
        if let Some(record) = record {
            self.agents.delete(&record.id);
        }

        self.store.delete_headless(plan_id.as_ref(), task_id);
        if let Some(mut entry) = entry {
            entry.info.status = HeadlessStatus::Completed;
            self.events.emit(Event::HeadlessAgentUpdate { info: entry.info });
        }
    }

    /// Rebuild run records from disk after a restart. Containers do not
    /// survive the daemon, so anything mid-flight is now failed.
    pub fn rehydrate(&self, plan_ids: &[PlanId]) {
        let mut scopes: Vec<Option<PlanId>> = vec![None];
        scopes.extend(plan_ids.iter().map(|id| Some(*id)));

        for scope in scopes {
            for task_id in self.store.list_headless(scope.as_ref()) {
                let Some(mut info) = self.store.load_headless(scope.as_ref(), &task_id) else {
                    continue;
                };
                if !info.status.is_terminal() {
                    info.status = HeadlessStatus::Failed;
                    info.completed_at_ms = Some(self.clock.epoch_ms());
                    if let Err(e) = self.store.save_headless_snapshot(&info) {
                        tracing::warn!(task = %task_id, error = %e, "rehydrate snapshot save failed");
                    }
                }
                self.runs.lock().insert(
                    task_id,
                    RunEntry {
                        info,
                        pending: Vec::new(),
                        token: CancellationToken::new(),
                        outcome_sent: true,
                    },
                );
            }
        }
    }

    /// Flush everything; called on daemon shutdown.
    pub fn flush_all(&self) {
        let task_ids: Vec<TaskId> = self.runs.lock().keys().cloned().collect();
        for task_id in task_ids {
            self.flush(&task_id);
        }
    }
}

#[cfg(test)]
#[path = "headless_tests.rs"]
mod tests;
