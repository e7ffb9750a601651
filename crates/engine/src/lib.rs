// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! bm-engine: the orchestration engine — workspace state, spawn admission,
//! terminal supervision, headless workers, and the plan state machine.

pub mod agents;
pub mod bus;
#[cfg(test)]
mod test_helpers;
pub mod error;
pub mod headless;
pub mod plan;
pub mod repos;
pub mod runtime;
pub mod spawn_queue;
pub mod state;
pub mod terminal;

pub use agents::AgentDirectory;
pub use bus::EventTx;
pub use error::EngineError;
pub use headless::{HeadlessConfig, HeadlessOutcome, HeadlessRuntime, FLUSH_DEBOUNCE};
pub use plan::{CreatePlan, PlanConfig, PlanManager, POLL_INTERVAL};
pub use repos::{RepoPatch, RepoRegistry};
pub use runtime::{Runtime, RuntimeConfig, RuntimeDeps};
pub use spawn_queue::{SpawnQueue, SpawnQueueError, SPAWN_CONCURRENCY, SPAWN_DELAY};
pub use state::{PreferencesPatch, StateManager};
pub use terminal::{TerminalConfig, TerminalSupervisor};
