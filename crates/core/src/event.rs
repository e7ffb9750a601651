// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-way notifications pushed from the core to the UI.
//!
//! Serializes with `{"type": "terminal-data", ...fields}` tags. These names
//! are wire contract; renaming a variant is a breaking change for the UI.

use crate::agent::AgentId;
use crate::headless::{HeadlessAgentInfo, StreamEvent};
use crate::plan::{Plan, PlanId};
use crate::state::StateSnapshot;
use crate::task::{TaskAssignment, TaskId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Identifier of one PTY allocation. Distinct from the agent id: an agent
    /// gets a fresh terminal id each time its PTY is (re)created.
    pub struct TerminalId("trm-");
}

/// Spawn-queue status payload for the UI boot progress indicator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpawnQueueStatus {
    pub queued: usize,
    pub active: usize,
    pub pending: Vec<AgentId>,
}

/// Notifications that flow out through the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    TerminalData {
        terminal_id: TerminalId,
        data: String,
    },

    TerminalExit {
        terminal_id: TerminalId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<i32>,
    },

    TerminalCreated {
        terminal_id: TerminalId,
        agent_id: AgentId,
    },

    TerminalQueueStatus {
        #[serde(flatten)]
        status: SpawnQueueStatus,
    },

    AgentWaiting {
        agent_id: AgentId,
    },

    WaitingQueueChanged {
        queue: Vec<AgentId>,
    },

    StateUpdate {
        snapshot: StateSnapshot,
    },

    PlanUpdate {
        plan: Plan,
    },

    PlanDeleted {
        plan_id: PlanId,
    },

    TaskAssignmentUpdate {
        plan_id: PlanId,
        assignment: TaskAssignment,
    },

    #[serde(rename = "plan-activity")]
    PlanActivityLogged {
        activity: crate::activity::PlanActivity,
    },

    HeadlessAgentStarted {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        plan_id: Option<PlanId>,
        worktree_path: PathBuf,
    },

    HeadlessAgentUpdate {
        info: HeadlessAgentInfo,
    },

    HeadlessAgentEvent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        plan_id: Option<PlanId>,
        task_id: TaskId,
        event: StreamEvent,
    },

    FocusWorkspace {
        agent_id: AgentId,
    },

    MaximizeWorkspace {
        agent_id: AgentId,
    },
}

impl Event {
    /// Event name as it appears on the wire (for log spans).
    pub fn name(&self) -> &'static str {
        match self {
            Event::TerminalData { .. } => "terminal-data",
            Event::TerminalExit { .. } => "terminal-exit",
            Event::TerminalCreated { .. } => "terminal-created",
            Event::TerminalQueueStatus { .. } => "terminal-queue-status",
            Event::AgentWaiting { .. } => "agent-waiting",
            Event::WaitingQueueChanged { .. } => "waiting-queue-changed",
            Event::StateUpdate { .. } => "state-update",
            Event::PlanUpdate { .. } => "plan-update",
            Event::PlanDeleted { .. } => "plan-deleted",
            Event::TaskAssignmentUpdate { .. } => "task-assignment-update",
            Event::PlanActivityLogged { .. } => "plan-activity",
            Event::HeadlessAgentStarted { .. } => "headless-agent-started",
            Event::HeadlessAgentUpdate { .. } => "headless-agent-update",
            Event::HeadlessAgentEvent { .. } => "headless-agent-event",
            Event::FocusWorkspace { .. } => "focus-workspace",
            Event::MaximizeWorkspace { .. } => "maximize-workspace",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
