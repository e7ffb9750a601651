// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable app state (`state.json`) and the runtime snapshot sent to the UI.

use crate::agent::AgentId;
use crate::prefs::Preferences;
use crate::tab::{Tab, TabId};
use serde::{Deserialize, Serialize};

/// Durable portion of workspace state: tabs, focus, preferences.
/// The attention queue and the active-agent set are runtime-only and
/// rebuilt empty after a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppState {
    pub tabs: Vec<Tab>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_tab_id: Option<TabId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused_agent_id: Option<AgentId>,
    pub preferences: Preferences,
}

/// Full runtime view pushed to the UI on every state mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateSnapshot {
    pub tabs: Vec<Tab>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_tab_id: Option<TabId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused_agent_id: Option<AgentId>,
    pub preferences: Preferences,
    pub attention_queue: Vec<AgentId>,
    pub active_agents: Vec<AgentId>,
}
