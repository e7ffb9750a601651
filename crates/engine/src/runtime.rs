// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime facade: wires adapters, managers, and channels together and
//! exposes the operation surface the daemon listener serves.

use crate::agents::AgentDirectory;
use crate::bus::EventTx;
use crate::error::EngineError;
use crate::headless::{HeadlessConfig, HeadlessRuntime};
use crate::plan::{PlanConfig, PlanManager};
use crate::repos::{RepoPatch, RepoRegistry};
use crate::spawn_queue::SpawnQueue;
use crate::state::{PreferencesPatch, StateManager};
use crate::terminal::{TerminalConfig, TerminalSupervisor};
use bm_adapters::{
    AttentionSignal, AttentionSockets, ContainerRuntime, GitAdapter, NotifyAdapter, PtyAdapter,
    TaskStore, ToolProxy,
};
use bm_core::{
    AgentId, AgentRecord, AgentRole, AttentionMode, Clock, Event, HeadlessAgentInfo, PlanId,
    Preferences, Repository, StateSnapshot, TaskId, TerminalId,
};
use bm_storage::ConfigStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Adapter set injected at startup; tests pass fakes.
pub struct RuntimeDeps {
    pub pty: Arc<dyn PtyAdapter>,
    pub git: Arc<dyn GitAdapter>,
    pub containers: Arc<dyn ContainerRuntime>,
    pub taskstore: Arc<dyn TaskStore>,
    pub notifier: Arc<dyn NotifyAdapter>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone, Default)]
pub struct RuntimeConfig {
    pub terminal: TerminalConfig,
    pub plan: PlanConfig,
    pub headless: HeadlessConfig,
    pub proxy_port: Option<u16>,
}

pub struct Runtime {
    pub store: ConfigStore,
    pub agents: Arc<AgentDirectory>,
    pub repos: Arc<RepoRegistry>,
    pub state: Arc<StateManager>,
    pub terminals: Arc<TerminalSupervisor>,
    pub headless: Arc<HeadlessRuntime>,
    pub plans: Arc<PlanManager>,
    pub attention: Arc<AttentionSockets>,
    pub proxy: Arc<ToolProxy>,
    pub spawn_queue: SpawnQueue,
    pub events: EventTx,
    notifier: Arc<dyn NotifyAdapter>,
    clock: Arc<dyn Clock>,
    pub instance_id: String,
    plan_assistant_bin: String,
}

impl Runtime {
    /// Build the runtime and return the daemon-side event stream.
    pub fn start(
        store: ConfigStore,
        deps: RuntimeDeps,
        config: RuntimeConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (events, event_rx) = EventTx::channel();
        let instance_id = bm_adapters::new_instance_id();

        let agents = Arc::new(AgentDirectory::load(store.clone()));
        let repos = Arc::new(RepoRegistry::load(store.clone(), Arc::clone(&deps.git)));
        let state = Arc::new(StateManager::load(store.clone(), events.clone()));
        let spawn_queue = SpawnQueue::start(events.clone());
        let (attention_tx, attention_rx) = mpsc::channel(64);
        let attention = Arc::new(AttentionSockets::new(&instance_id, attention_tx));
        let terminals = TerminalSupervisor::new(
            Arc::clone(&deps.pty),
            Arc::clone(&agents),
            spawn_queue.clone(),
            Arc::clone(&attention),
            events.clone(),
            config.terminal,
        );
        let (headless, outcome_rx) = HeadlessRuntime::new(
            Arc::clone(&deps.containers),
            Arc::clone(&deps.git),
            Arc::clone(&agents),
            store.clone(),
            events.clone(),
            Arc::clone(&deps.clock),
            config.headless,
        );
        let proxy = Arc::new(ToolProxy::new(
            config.proxy_port.unwrap_or(bm_adapters::DEFAULT_PROXY_PORT),
            None,
        ));
        let plan_assistant_bin = config.plan.assistant_bin.clone();
        let plans = PlanManager::load(
            store.clone(),
            Arc::clone(&deps.taskstore),
            Arc::clone(&deps.git),
            Arc::clone(&agents),
            Arc::clone(&repos),
            Arc::clone(&state),
            Arc::clone(&terminals),
            Arc::clone(&headless),
            Arc::clone(&proxy),
            events.clone(),
            Arc::clone(&deps.clock),
            config.plan,
        );

        let runtime = Arc::new(Self {
            store,
            agents,
            repos,
            state,
            terminals,
            headless,
            plans,
            attention,
            proxy,
            spawn_queue,
            events,
            notifier: Arc::clone(&deps.notifier),
            clock: Arc::clone(&deps.clock),
            instance_id,
            plan_assistant_bin,
        });

        Self::spawn_attention_loop(Arc::clone(&runtime), attention_rx);
        Self::spawn_outcome_loop(Arc::clone(&runtime), outcome_rx);
        (runtime, event_rx)
    }

    /// Rebuild caches that depend on disk state, resume active plans.
    pub fn startup(&self) {
        let plan_ids: Vec<PlanId> = self.plans.list_plans().iter().map(|p| p.id).collect();
        self.headless.rehydrate(&plan_ids);
        self.plans.resume_pollers();
    }

    /// Orderly teardown: every PTY killed, logs flushed, sockets removed.
    pub fn shutdown(&self) {
        self.spawn_queue.cancel_all();
        self.terminals.close_all();
        self.headless.flush_all();
        self.attention.close_all();
        self.proxy.stop();
    }

    fn spawn_attention_loop(runtime: Arc<Self>, mut rx: mpsc::Receiver<AttentionSignal>) {
        tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                runtime.on_attention(signal).await;
            }
        });
    }

    async fn on_attention(&self, signal: AttentionSignal) {
        let agent_id = signal.agent_id;
        if !self.state.attention_push(&agent_id) {
            // Already queued; one desktop ping is enough.
            return;
        }

        let name = self
            .agents
            .get(&agent_id)
            .map(|a| a.name)
            .unwrap_or_else(|| agent_id.to_string());
        let _ = self
            .notifier
            .notify("Agent needs attention", &format!("{} is waiting for input", name))
            .await;

        match self.state.preferences().attention_mode {
            AttentionMode::Focus => self.events.emit(Event::FocusWorkspace { agent_id }),
            AttentionMode::Expand => self.events.emit(Event::MaximizeWorkspace { agent_id }),
            AttentionMode::Queue => {}
        }
    }

    fn spawn_outcome_loop(
        runtime: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<crate::headless::HeadlessOutcome>,
    ) {
        tokio::spawn(async move {
            while let Some(outcome) = rx.recv().await {
                runtime.plans.on_headless_outcome(outcome);
            }
        });
    }

    // --- workspaces ---

    pub fn list_agents(&self) -> Vec<AgentRecord> {
        self.agents.list()
    }

    pub fn save_agent(&self, record: AgentRecord) -> AgentRecord {
        self.agents.save(record)
    }

    pub fn delete_agent(&self, agent_id: &AgentId) -> Result<(), EngineError> {
        self.agents.require(agent_id)?;
        self.stop_agent(agent_id);
        self.state.remove_agent_from_tab(agent_id);
        self.agents.delete(agent_id);
        Ok(())
    }

    // --- terminals ---

    pub async fn create_terminal(
        &self,
        agent_id: &AgentId,
        initial_prompt: Option<String>,
        extra_dirs: Vec<PathBuf>,
    ) -> Result<TerminalId, EngineError> {
        let agent = self.agents.require(agent_id)?;
        if agent.role.is_headless() {
            return Err(EngineError::InvalidState(format!(
                "agent {} is headless and owns no terminal",
                agent_id
            )));
        }

        let terminal_id = self.terminals.create(agent_id, initial_prompt, extra_dirs).await?;
        self.state.mark_agent_active(agent_id);
        if self.state.tab_of_agent(agent_id).is_none() {
            let tab_id = self.state.tab_for_agent(agent_id);
            let _ = self.state.add_agent_to_tab(agent_id, &tab_id, None);
        }
        Ok(terminal_id)
    }

    pub fn write_terminal(&self, terminal_id: &TerminalId, data: &[u8]) {
        self.terminals.write(terminal_id, data);
    }

    pub fn resize_terminal(&self, terminal_id: &TerminalId, cols: u16, rows: u16) {
        self.terminals.resize(terminal_id, cols, rows);
    }

    pub fn close_terminal(&self, terminal_id: &TerminalId) {
        if let Some(agent_id) = self.terminals.agent_of(terminal_id) {
            self.attention.close(&agent_id);
            self.state.mark_agent_inactive(&agent_id);
        }
        self.terminals.close(terminal_id);
    }

    /// Stop an agent's execution without deleting its record.
    pub fn stop_agent(&self, agent_id: &AgentId) {
        self.terminals.close_for_agent(agent_id);
        if let Some(agent) = self.agents.get(agent_id) {
            if let Some(task_id) = agent.task_id {
                self.headless.stop(&task_id);
            }
        }
        self.attention.close(agent_id);
        self.state.mark_agent_inactive(agent_id);
    }

    // --- state / attention ---

    pub fn get_state(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    pub fn acknowledge_attention(&self, agent_id: &AgentId) {
        self.state.attention_ack(agent_id);
    }

    pub fn get_preferences(&self) -> Preferences {
        self.state.preferences()
    }

    pub fn set_preferences(&self, patch: PreferencesPatch) -> Preferences {
        self.state.set_preferences(patch)
    }

    // --- headless / standalone ---

    pub fn headless_info(&self, task_id: &TaskId) -> Option<HeadlessAgentInfo> {
        self.headless.info(task_id)
    }

    pub fn headless_for_plan(&self, plan_id: &PlanId) -> Vec<HeadlessAgentInfo> {
        self.headless.list_for_plan(plan_id)
    }

    pub fn stop_headless(&self, task_id: &TaskId) {
        self.headless.stop(task_id);
    }

    /// Full teardown of a headless run: container, worktree, branch, record.
    pub async fn destroy_headless(&self, task_id: &TaskId) {
        let located = self.headless.info(task_id).and_then(|info| {
            let plan = info.plan_id.and_then(|id| self.plans.get_plan(&id))?;
            let worktree = plan.worktree_for_task(task_id)?.clone();
            let repo = self.repos.by_id(&worktree.repo_id)?;
            Some((plan.id, repo.root, worktree.branch))
        });

        match located {
            Some((plan_id, root, branch)) => {
                self.headless
                    .destroy(task_id, Some(root.as_path()), Some(branch.as_str()))
                    .await;
                let _ = self.plans.update_plan(&plan_id, |p| {
                    if let Some(w) = p.worktree_for_task_mut(task_id) {
                        w.status = bm_core::WorktreeStatus::Cleaned;
                    }
                });
            }
            None => self.headless.destroy(task_id, None, None).await,
        }
    }

    /// Launch a plan-less headless worker against a directory.
    pub async fn start_standalone_headless(
        &self,
        directory: PathBuf,
        prompt: String,
        name: Option<String>,
    ) -> Result<TaskId, EngineError> {
        let task_id = TaskId::new(format!(
            "sa-{}",
            &uuid::Uuid::new_v4().simple().to_string()[..12]
        ));
        let mut record = AgentRecord::new(
            name.unwrap_or_else(|| format!("standalone {}", task_id)),
            &directory,
        )
        .with_role(AgentRole::StandaloneHeadless);
        record.task_id = Some(task_id.clone());
        // The prompt rides on the record so restart can reuse it.
        record.purpose = prompt.clone();
        let record = self.agents.save(record);

        let token = bm_adapters::resolve_credential(self.store.read_token())
            .ok_or_else(|| EngineError::Auth("no assistant token available".into()))?;
        if let Err(e) = self.proxy.start().await {
            tracing::warn!(error = %e, "tool proxy unavailable for standalone run");
        }
        self.headless
            .start(task_id.clone(), None, directory, prompt, token)
            .await?;
        self.state.mark_agent_active(&record.id);
        Ok(task_id)
    }

    /// Confirm a finished standalone run and tear it down.
    pub async fn standalone_confirm_done(&self, task_id: &TaskId) -> Result<(), EngineError> {
        let info = self
            .headless
            .info(task_id)
            .ok_or_else(|| EngineError::NotFound(format!("headless run {}", task_id)))?;
        if !info.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "run {} is still {}",
                task_id, info.status
            )));
        }
        self.headless.destroy(task_id, None, None).await;
        Ok(())
    }

    /// Continue a finished standalone run with a new prompt.
    pub async fn standalone_start_followup(
        &self,
        task_id: &TaskId,
        prompt: String,
    ) -> Result<(), EngineError> {
        let info = self
            .headless
            .info(task_id)
            .ok_or_else(|| EngineError::NotFound(format!("headless run {}", task_id)))?;
        if !info.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "run {} is still {}",
                task_id, info.status
            )));
        }
        let token = bm_adapters::resolve_credential(self.store.read_token())
            .ok_or_else(|| EngineError::Auth("no assistant token available".into()))?;
        self.headless
            .start(task_id.clone(), None, info.worktree_path, prompt, token)
            .await
    }

    /// Re-run a standalone task with its original prompt.
    pub async fn standalone_restart(&self, task_id: &TaskId) -> Result<(), EngineError> {
        let prompt = self
            .agents
            .list()
            .into_iter()
            .find(|a| a.role == AgentRole::StandaloneHeadless && a.task_id.as_ref() == Some(task_id))
            .map(|a| a.purpose)
            .ok_or_else(|| EngineError::NotFound(format!("standalone agent for {}", task_id)))?;
        self.standalone_start_followup(task_id, prompt).await
    }

    // --- auth ---

    pub fn get_token(&self) -> Option<String> {
        self.store.read_token()
    }

    pub fn set_token(&self, token: &str) -> Result<(), EngineError> {
        self.store.write_token(token)?;
        Ok(())
    }

    pub fn has_token(&self) -> bool {
        bm_adapters::resolve_credential(self.store.read_token()).is_some()
    }

    pub fn clear_token(&self) {
        self.store.clear_token();
    }

    /// Run the assistant's interactive token setup flow and store the result.
    pub async fn run_token_setup(&self) -> Result<(), EngineError> {
        let token = bm_adapters::run_setup(&self.plan_assistant_bin)
            .await
            .map_err(|e| EngineError::Auth(e.to_string()))?;
        self.store.write_token(&token)?;
        Ok(())
    }

    // --- repositories ---

    pub async fn detect_repo(&self, path: &Path) -> Result<Repository, EngineError> {
        self.repos.detect(path).await
    }

    pub fn list_repos(&self) -> Vec<Repository> {
        self.repos.list()
    }

    pub fn update_repo(&self, id: &str, patch: RepoPatch) -> Result<Repository, EngineError> {
        self.repos.update(id, patch)
    }

    // --- tool proxy ---

    pub async fn proxy_start(&self) -> Result<(), EngineError> {
        self.proxy.start().await.map_err(Into::into)
    }

    pub fn proxy_stop(&self) {
        self.proxy.stop();
    }

    pub fn proxy_is_running(&self) -> bool {
        self.proxy.is_running()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
