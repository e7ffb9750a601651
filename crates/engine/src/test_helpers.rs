// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared engine test harness: a real runtime over fake adapters and a
//! throwaway config root.

use crate::plan::PlanConfig;
use crate::runtime::{Runtime, RuntimeConfig, RuntimeDeps};
use crate::terminal::TerminalConfig;
use bm_adapters::{
    FakeContainerRuntime, FakeGit, FakeNotifier, FakePtyAdapter, FakeTaskStore,
};
use bm_core::{AgentRecord, Event, FakeClock};
use bm_storage::{ConfigPaths, ConfigStore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

static NEXT_PROXY_PORT: AtomicU16 = AtomicU16::new(31000);

pub struct Harness {
    pub runtime: Arc<Runtime>,
    pub events: mpsc::UnboundedReceiver<Event>,
    pub pty: FakePtyAdapter,
    pub git: FakeGit,
    pub containers: FakeContainerRuntime,
    pub taskstore: FakeTaskStore,
    pub notifier: FakeNotifier,
    pub clock: FakeClock,
    pub dir: tempfile::TempDir,
}

pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(ConfigPaths::at(dir.path()));

    let pty = FakePtyAdapter::new();
    let git = FakeGit::new();
    let containers = FakeContainerRuntime::new();
    let taskstore = FakeTaskStore::new();
    let notifier = FakeNotifier::new();
    let clock = FakeClock::at(1_000_000);

    let deps = RuntimeDeps {
        pty: Arc::new(pty.clone()),
        git: Arc::new(git.clone()),
        containers: Arc::new(containers.clone()),
        taskstore: Arc::new(taskstore.clone()),
        notifier: Arc::new(notifier.clone()),
        clock: Arc::new(clock.clone()),
    };
    let config = RuntimeConfig {
        terminal: TerminalConfig {
            assistant_bin: "assistant".into(),
            settle_delay: Duration::from_millis(10),
            type_delay: Duration::from_millis(1),
            paste_wait: Duration::from_millis(100),
            kill_grace: Duration::from_millis(50),
            session_root: dir.path().join("sessions"),
        },
        plan: PlanConfig {
            poll_interval: Duration::from_millis(40),
            assistant_bin: "assistant".into(),
        },
        headless: crate::headless::HeadlessConfig {
            image: "worker:test".into(),
            cpus: None,
            memory: None,
            proxy_url: "http://host.docker.internal:0".into(),
            debounce: Duration::from_millis(40),
        },
        proxy_port: Some(NEXT_PROXY_PORT.fetch_add(1, Ordering::Relaxed)),
    };

    let (runtime, events) = Runtime::start(store, deps, config);
    Harness { runtime, events, pty, git, containers, taskstore, notifier, clock, dir }
}

impl Harness {
    pub fn plan_dir(&self, plan_id: &bm_core::PlanId) -> PathBuf {
        self.runtime.store.paths().plan_dir(plan_id)
    }

    /// A saved standard agent pointing at an existing directory.
    pub fn seed_agent(&self, name: &str) -> AgentRecord {
        let agent_dir = self.dir.path().join(name);
        std::fs::create_dir_all(&agent_dir).unwrap();
        self.runtime.save_agent(AgentRecord::new(name, agent_dir))
    }

    /// Wait for an event matching the predicate, draining others.
    pub async fn expect_event(
        &mut self,
        what: &str,
        mut pred: impl FnMut(&Event) -> bool,
    ) -> Event {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let event = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => panic!("timed out waiting for {what}"),
                event = self.events.recv() => event.unwrap_or_else(|| panic!("bus closed waiting for {what}")),
            };
            if pred(&event) {
                return event;
            }
        }
    }

    /// Drain currently queued events without waiting.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Poll until the condition holds (for state settled by background tasks).
    pub async fn wait_until(&self, what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !cond() {
            if tokio::time::Instant::now() > deadline {
                panic!("condition never held: {what}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
