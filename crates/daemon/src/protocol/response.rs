// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use bm_core::{
    AgentId, AgentRecord, Event, HeadlessAgentInfo, Plan, PlanActivity, PlanId, Preferences,
    Repository, StateSnapshot, Tab, TaskAssignment, TaskId, TerminalId,
};
use serde::{Deserialize, Serialize};

/// Response frames. `Notification` frames only appear on subscribed
/// connections; everything else answers exactly one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    Ok,
    Error {
        kind: String,
        message: String,
    },
    Agents {
        agents: Vec<AgentRecord>,
    },
    Agent {
        agent: AgentRecord,
    },
    Terminal {
        terminal_id: TerminalId,
    },
    State {
        snapshot: StateSnapshot,
    },
    Tab {
        tab: Tab,
    },
    TabDeleted {
        agent_ids: Vec<AgentId>,
    },
    AttentionQueue {
        queue: Vec<AgentId>,
    },
    Preferences {
        preferences: Preferences,
    },
    Plan {
        plan: Plan,
    },
    Plans {
        plans: Vec<Plan>,
    },
    PlanIds {
        plan_ids: Vec<PlanId>,
    },
    Assignments {
        assignments: Vec<TaskAssignment>,
    },
    Activities {
        activities: Vec<PlanActivity>,
    },
    HeadlessInfo {
        #[serde(default)]
        info: Option<HeadlessAgentInfo>,
    },
    HeadlessList {
        infos: Vec<HeadlessAgentInfo>,
    },
    Task {
        task_id: TaskId,
    },
    Token {
        #[serde(default)]
        token: Option<String>,
    },
    Flag {
        value: bool,
    },
    Repo {
        repository: Repository,
    },
    Repos {
        repositories: Vec<Repository>,
    },
    Notification {
        event: Event,
    },
}

impl Response {
    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        Response::Error { kind: kind.to_string(), message: message.into() }
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
