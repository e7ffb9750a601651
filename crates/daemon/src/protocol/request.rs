// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request surface served over the daemon socket. The tag names are wire
//! contract with the UI.

use bm_core::{
    AgentId, AgentRecord, BranchStrategy, DispatchMode, PlanId, TabId, TaskId, TerminalId,
};
use bm_engine::state::PreferencesPatch;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Switch this connection into a one-way notification stream
    Subscribe,

    /// Request daemon shutdown
    Shutdown,

    // -- workspaces --
    ListAgents,
    SaveAgent {
        agent: AgentRecord,
    },
    DeleteAgent {
        agent_id: AgentId,
    },

    // -- terminals --
    CreateTerminal {
        agent_id: AgentId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_prompt: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        extra_dirs: Vec<PathBuf>,
    },
    WriteTerminal {
        terminal_id: TerminalId,
        data: String,
    },
    ResizeTerminal {
        terminal_id: TerminalId,
        cols: u16,
        rows: u16,
    },
    CloseTerminal {
        terminal_id: TerminalId,
    },

    // -- state --
    GetState,
    SetFocused {
        #[serde(default)]
        agent_id: Option<AgentId>,
    },
    StopAgent {
        agent_id: AgentId,
    },

    // -- tabs --
    CreateTab {
        name: String,
    },
    RenameTab {
        tab_id: TabId,
        name: String,
    },
    DeleteTab {
        tab_id: TabId,
    },
    SetActiveTab {
        tab_id: TabId,
    },
    ReorderInTab {
        tab_id: TabId,
        agent_id: AgentId,
        position: usize,
    },
    MoveAgentToTab {
        agent_id: AgentId,
        tab_id: TabId,
        #[serde(default)]
        position: Option<usize>,
    },

    // -- attention --
    GetAttentionQueue,
    AcknowledgeAttention {
        agent_id: AgentId,
    },

    // -- preferences --
    GetPreferences,
    SetPreferences {
        preferences: PreferencesPatch,
    },

    // -- plans --
    CreatePlan {
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        reference_agent_id: Option<AgentId>,
        #[serde(default)]
        max_parallel_agents: Option<u32>,
        #[serde(default)]
        branch_strategy: Option<BranchStrategy>,
        #[serde(default)]
        dispatch_mode: Option<DispatchMode>,
        #[serde(default)]
        base_branch: Option<String>,
    },
    ListPlans,
    ExecutePlan {
        plan_id: PlanId,
        reference_agent_id: AgentId,
    },
    StartDiscussion {
        plan_id: PlanId,
        reference_agent_id: AgentId,
    },
    CancelDiscussion {
        plan_id: PlanId,
    },
    CancelPlan {
        plan_id: PlanId,
    },
    RestartPlan {
        plan_id: PlanId,
    },
    CompletePlan {
        plan_id: PlanId,
    },
    DeletePlan {
        plan_id: PlanId,
    },
    DeletePlans {
        plan_ids: Vec<PlanId>,
    },
    ClonePlan {
        plan_id: PlanId,
    },
    GetTaskAssignments {
        plan_id: PlanId,
    },
    GetPlanActivities {
        plan_id: PlanId,
    },

    // -- headless --
    GetHeadlessInfo {
        task_id: TaskId,
    },
    ListHeadlessForPlan {
        plan_id: PlanId,
    },
    StopHeadless {
        task_id: TaskId,
    },
    DestroyHeadless {
        task_id: TaskId,
    },
    StartStandaloneHeadless {
        directory: PathBuf,
        prompt: String,
        #[serde(default)]
        name: Option<String>,
    },
    StandaloneConfirmDone {
        task_id: TaskId,
    },
    StandaloneStartFollowup {
        task_id: TaskId,
        prompt: String,
    },
    StandaloneRestart {
        task_id: TaskId,
    },

    // -- auth --
    GetToken,
    SetToken {
        token: String,
    },
    HasToken,
    ClearToken,
    RunSetup,

    // -- repositories --
    DetectRepo {
        path: PathBuf,
    },
    ListRepos,
    UpdateRepo {
        repo_id: String,
        #[serde(default)]
        purpose: Option<String>,
        #[serde(default)]
        completion_criteria: Option<String>,
        #[serde(default)]
        protected_branches: Option<Vec<String>>,
        #[serde(default)]
        default_branch: Option<String>,
    },

    // -- tool proxy --
    ProxyStart,
    ProxyStop,
    ProxyIsRunning,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
