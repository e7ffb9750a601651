// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User preferences persisted in `state.json`.

use serde::{Deserialize, Serialize};

/// How the UI reacts when an agent signals it needs attention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttentionMode {
    /// Jump focus to the waiting agent.
    #[default]
    Focus,
    /// Maximize the waiting agent's pane.
    Expand,
    /// Only enqueue; the user works through the queue manually.
    Queue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    #[default]
    Solo,
    Team,
}

/// Assistant model tier passed to spawned agents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentModel {
    Opus,
    #[default]
    Sonnet,
    Haiku,
}

impl AgentModel {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentModel::Opus => "opus",
            AgentModel::Sonnet => "sonnet",
            AgentModel::Haiku => "haiku",
        }
    }
}

/// Tab grid layout. Capacity bounds how many agents a normal tab holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridSize {
    #[serde(rename = "1x1")]
    One,
    #[default]
    #[serde(rename = "2x2")]
    TwoByTwo,
    #[serde(rename = "2x3")]
    TwoByThree,
    #[serde(rename = "3x3")]
    ThreeByThree,
}

impl GridSize {
    pub fn capacity(self) -> usize {
        match self {
            GridSize::One => 1,
            GridSize::TwoByTwo => 4,
            GridSize::TwoByThree => 6,
            GridSize::ThreeByThree => 9,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub attention_mode: AttentionMode,
    pub operating_mode: OperatingMode,
    pub agent_model: AgentModel,
    pub grid_size: GridSize,
    pub tutorial_completed: bool,
}

#[cfg(test)]
#[path = "prefs_tests.rs"]
mod tests;
