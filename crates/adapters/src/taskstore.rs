// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the external task-store CLI.
//!
//! The store is the system of record for task ids, labels, dependencies, and
//! open/closed state. Every invocation runs with `cwd` at the plan directory;
//! calls for one plan are serialized (one CLI at a time per directory).

use crate::subprocess::{expect_success, run_with_timeout, TASK_CLI_TIMEOUT};
use async_trait::async_trait;
use bm_core::{Task, TaskId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected task store output: {0}")]
    BadOutput(String),

    #[error("task not found: {0}")]
    NotFound(TaskId),
}

#[derive(Debug, Clone, Default)]
pub struct CreateTask {
    pub title: String,
    /// `epic` groups a plan's tasks.
    pub task_type: Option<String>,
    pub parent: Option<TaskId>,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub parent: Option<TaskId>,
    pub closed: bool,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub add_labels: Vec<String>,
    pub remove_labels: Vec<String>,
    pub assignee: Option<String>,
    pub title: Option<String>,
}

#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Idempotent: create the plan directory and initialize the store in it.
    async fn ensure(&self, plan_dir: &Path) -> Result<(), TaskStoreError>;
    async fn create(&self, plan_dir: &Path, req: CreateTask) -> Result<TaskId, TaskStoreError>;
    async fn list(&self, plan_dir: &Path, filter: TaskFilter) -> Result<Vec<Task>, TaskStoreError>;
    async fn update(
        &self,
        plan_dir: &Path,
        task_id: &TaskId,
        update: TaskUpdate,
    ) -> Result<(), TaskStoreError>;
    async fn close(
        &self,
        plan_dir: &Path,
        task_id: &TaskId,
        message: Option<&str>,
    ) -> Result<(), TaskStoreError>;
    async fn get(&self, plan_dir: &Path, task_id: &TaskId) -> Result<Option<Task>, TaskStoreError>;
}

/// Marker written after a successful `init` so `ensure` can short-circuit.
const INIT_MARKER: &str = ".taskstore-initialized";

/// CLI-backed store. Binary from `BISMARK_TASK_BIN`, default `tsk`.
#[derive(Clone)]
pub struct CliTaskStore {
    bin: String,
    /// One CLI at a time per plan directory.
    dir_locks: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
}

impl Default for CliTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CliTaskStore {
    pub fn new() -> Self {
        let bin = std::env::var("BISMARK_TASK_BIN").unwrap_or_else(|_| "tsk".to_string());
        Self { bin, dir_locks: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn lock_for(&self, dir: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.dir_locks.lock();
        locks.entry(dir.to_path_buf()).or_default().clone()
    }

    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, TaskStoreError> {
        let lock = self.lock_for(dir);
        let _guard = lock.lock().await;

        let mut cmd = Command::new(&self.bin);
        cmd.args(args).current_dir(dir);
        let label = format!("{} {}", self.bin, args.first().unwrap_or(&""));
        let output = run_with_timeout(cmd, TASK_CLI_TIMEOUT, &label)
            .await
            .map_err(|e| TaskStoreError::Unavailable(e.to_string()))?;
        expect_success(&output, &label).map_err(TaskStoreError::Unavailable)
    }
}

/// Task id from the CLI's `create` output. The CLI prints a confirmation
/// line ending in the new id.
pub(crate) fn parse_created_id(stdout: &str) -> Option<TaskId> {
    stdout
        .lines()
        .find(|l| !l.trim().is_empty())?
        .split_whitespace()
        .last()
        .map(|id| TaskId::new(id.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '-' && c != '.')))
        .filter(|id| !id.as_str().is_empty())
}

#[async_trait]
impl TaskStore for CliTaskStore {
    async fn ensure(&self, plan_dir: &Path) -> Result<(), TaskStoreError> {
        tokio::fs::create_dir_all(plan_dir)
            .await
            .map_err(|e| TaskStoreError::Unavailable(format!("create plan dir: {}", e)))?;

        if plan_dir.join(INIT_MARKER).exists() {
            return Ok(());
        }

        let prefix = plan_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("plan")
            .to_string();
        self.run(plan_dir, &["init", "--prefix", &prefix]).await?;

        if !plan_dir.join(".git").exists() {
            let mut cmd = Command::new("git");
            cmd.arg("init").current_dir(plan_dir);
            let output = run_with_timeout(cmd, TASK_CLI_TIMEOUT, "git init")
                .await
                .map_err(|e| TaskStoreError::Unavailable(e.to_string()))?;
            expect_success(&output, "git init").map_err(TaskStoreError::Unavailable)?;
        }

        tokio::fs::write(plan_dir.join(INIT_MARKER), b"")
            .await
            .map_err(|e| TaskStoreError::Unavailable(format!("write init marker: {}", e)))?;
        Ok(())
    }

    async fn create(&self, plan_dir: &Path, req: CreateTask) -> Result<TaskId, TaskStoreError> {
        let mut args: Vec<String> = vec!["create".into()];
        if let Some(ref t) = req.task_type {
            args.push("--type".into());
            args.push(t.clone());
        }
        if let Some(ref parent) = req.parent {
            args.push("--parent".into());
            args.push(parent.to_string());
        }
        for label in &req.labels {
            args.push("--label".into());
            args.push(label.clone());
        }
        args.push(req.title.clone());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = self.run(plan_dir, &arg_refs).await?;
        parse_created_id(&stdout)
            .ok_or_else(|| TaskStoreError::BadOutput(format!("no task id in: {stdout:?}")))
    }

    async fn list(&self, plan_dir: &Path, filter: TaskFilter) -> Result<Vec<Task>, TaskStoreError> {
        let mut args: Vec<String> = vec!["list".into()];
        if let Some(ref parent) = filter.parent {
            args.push("--parent".into());
            args.push(parent.to_string());
        }
        if filter.closed {
            args.push("--closed".into());
        }
        if let Some(ref label) = filter.label {
            args.push("--label".into());
            args.push(label.clone());
        }
        args.push("--json".into());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = self.run(plan_dir, &arg_refs).await?;
        if stdout.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&stdout).map_err(|e| TaskStoreError::BadOutput(e.to_string()))
    }

    async fn update(
        &self,
        plan_dir: &Path,
        task_id: &TaskId,
        update: TaskUpdate,
    ) -> Result<(), TaskStoreError> {
        let mut args: Vec<String> = vec!["update".into(), task_id.to_string()];
        for label in &update.add_labels {
            args.push("--add-label".into());
            args.push(label.clone());
        }
        for label in &update.remove_labels {
            args.push("--remove-label".into());
            args.push(label.clone());
        }
        if let Some(ref assignee) = update.assignee {
            args.push("--assignee".into());
            args.push(assignee.clone());
        }
        if let Some(ref title) = update.title {
            args.push("--title".into());
            args.push(title.clone());
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(plan_dir, &arg_refs).await.map(|_| ())
    }

    async fn close(
        &self,
        plan_dir: &Path,
        task_id: &TaskId,
        message: Option<&str>,
    ) -> Result<(), TaskStoreError> {
        let mut args: Vec<&str> = vec!["close", task_id.as_str()];
        if let Some(message) = message {
            args.push("--message");
            args.push(message);
        }
        self.run(plan_dir, &args).await.map(|_| ())
    }

    async fn get(&self, plan_dir: &Path, task_id: &TaskId) -> Result<Option<Task>, TaskStoreError> {
        let stdout = match self.run(plan_dir, &["show", task_id.as_str(), "--json"]).await {
            Ok(stdout) => stdout,
            // The CLI exits non-zero for unknown ids.
            Err(TaskStoreError::Unavailable(msg)) if msg.contains("not found") => return Ok(None),
            Err(e) => return Err(e),
        };
        serde_json::from_str(&stdout)
            .map(Some)
            .map_err(|e| TaskStoreError::BadOutput(e.to_string()))
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use bm_core::TaskStatus;

    #[derive(Default)]
    struct FakeState {
        /// Tasks keyed by plan directory.
        tasks: HashMap<PathBuf, Vec<Task>>,
        ensured: Vec<PathBuf>,
        closed_messages: Vec<(TaskId, Option<String>)>,
        counter: u32,
        fail_ensure: bool,
    }

    /// In-memory task store for tests.
    #[derive(Clone, Default)]
    pub struct FakeTaskStore {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeTaskStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `ensure` fail with `Unavailable`.
        pub fn fail_ensure(&self) {
            self.state.lock().fail_ensure = true;
        }

        /// Seed a task and return its id.
        pub fn seed_task(&self, plan_dir: &Path, title: &str, labels: &[&str]) -> TaskId {
            let mut state = self.state.lock();
            state.counter += 1;
            let id = TaskId::new(format!("T{}", state.counter));
            state.tasks.entry(plan_dir.to_path_buf()).or_default().push(Task {
                id: id.clone(),
                title: title.to_string(),
                status: TaskStatus::Open,
                assignee: None,
                labels: labels.iter().map(|l| l.to_string()).collect(),
            });
            id
        }

        /// Close a task out-of-band, as the worker or orchestrator would.
        pub fn close_task(&self, plan_dir: &Path, task_id: &TaskId) {
            let mut state = self.state.lock();
            if let Some(tasks) = state.tasks.get_mut(plan_dir) {
                if let Some(task) = tasks.iter_mut().find(|t| &t.id == task_id) {
                    task.status = TaskStatus::Closed;
                }
            }
        }

        pub fn add_label(&self, plan_dir: &Path, task_id: &TaskId, label: &str) {
            let mut state = self.state.lock();
            if let Some(tasks) = state.tasks.get_mut(plan_dir) {
                if let Some(task) = tasks.iter_mut().find(|t| &t.id == task_id) {
                    task.labels.push(label.to_string());
                }
            }
        }

        pub fn labels_of(&self, plan_dir: &Path, task_id: &TaskId) -> Vec<String> {
            let state = self.state.lock();
            state
                .tasks
                .get(plan_dir)
                .and_then(|tasks| tasks.iter().find(|t| &t.id == task_id))
                .map(|t| t.labels.clone())
                .unwrap_or_default()
        }

        pub fn ensured_dirs(&self) -> Vec<PathBuf> {
            self.state.lock().ensured.clone()
        }
    }

    #[async_trait]
    impl TaskStore for FakeTaskStore {
        async fn ensure(&self, plan_dir: &Path) -> Result<(), TaskStoreError> {
            let mut state = self.state.lock();
            if state.fail_ensure {
                state.fail_ensure = false;
                return Err(TaskStoreError::Unavailable("fake ensure failure".into()));
            }
            state.ensured.push(plan_dir.to_path_buf());
            Ok(())
        }

        async fn create(
            &self,
            plan_dir: &Path,
            req: CreateTask,
        ) -> Result<TaskId, TaskStoreError> {
            let labels: Vec<&str> = req.labels.iter().map(String::as_str).collect();
            Ok(self.seed_task(plan_dir, &req.title, &labels))
        }

        async fn list(
            &self,
            plan_dir: &Path,
            filter: TaskFilter,
        ) -> Result<Vec<Task>, TaskStoreError> {
            let state = self.state.lock();
            let tasks = state.tasks.get(plan_dir).cloned().unwrap_or_default();
            Ok(tasks
                .into_iter()
                .filter(|t| {
                    let status_ok = if filter.closed {
                        t.status == TaskStatus::Closed
                    } else {
                        t.status == TaskStatus::Open
                    };
                    let label_ok =
                        filter.label.as_ref().map(|l| t.has_label(l)).unwrap_or(true);
                    status_ok && label_ok
                })
                .collect())
        }

        async fn update(
            &self,
            plan_dir: &Path,
            task_id: &TaskId,
            update: TaskUpdate,
        ) -> Result<(), TaskStoreError> {
            let mut state = self.state.lock();
            let tasks = state
                .tasks
                .get_mut(plan_dir)
                .ok_or_else(|| TaskStoreError::NotFound(task_id.clone()))?;
            let task = tasks
                .iter_mut()
                .find(|t| &t.id == task_id)
                .ok_or_else(|| TaskStoreError::NotFound(task_id.clone()))?;
            task.labels.retain(|l| !update.remove_labels.contains(l));
            for label in update.add_labels {
                if !task.labels.contains(&label) {
                    task.labels.push(label);
                }
            }
            if let Some(assignee) = update.assignee {
                task.assignee = Some(assignee);
            }
            if let Some(title) = update.title {
                task.title = title;
            }
            Ok(())
        }

        async fn close(
            &self,
            plan_dir: &Path,
            task_id: &TaskId,
            message: Option<&str>,
        ) -> Result<(), TaskStoreError> {
            self.close_task(plan_dir, task_id);
            self.state
                .lock()
                .closed_messages
                .push((task_id.clone(), message.map(String::from)));
            Ok(())
        }

        async fn get(
            &self,
            plan_dir: &Path,
            task_id: &TaskId,
        ) -> Result<Option<Task>, TaskStoreError> {
            let state = self.state.lock();
            Ok(state
                .tasks
                .get(plan_dir)
                .and_then(|tasks| tasks.iter().find(|t| &t.id == task_id))
                .cloned())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeTaskStore;

#[cfg(test)]
#[path = "taskstore_tests.rs"]
mod tests;
