// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tabs: ordered groups of agents. Ordering is grid position.

use crate::agent::AgentId;
use crate::plan::PlanId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a tab.
    pub struct TabId("tab-");
}

/// A tab holds an ordered sequence of agent ids. A normal tab is capped at
/// the grid capacity; a plan tab scrolls and has no upper bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub name: String,
    #[serde(default)]
    pub agents: Vec<AgentId>,
    #[serde(default)]
    pub is_plan_tab: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,
}

impl Tab {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TabId::generate(),
            name: name.into(),
            agents: Vec::new(),
            is_plan_tab: false,
            plan_id: None,
        }
    }

    pub fn for_plan(name: impl Into<String>, plan_id: PlanId) -> Self {
        Self {
            id: TabId::generate(),
            name: name.into(),
            agents: Vec::new(),
            is_plan_tab: true,
            plan_id: Some(plan_id),
        }
    }

    /// A plan tab never fills; a normal tab fills at the grid capacity.
    pub fn has_free_slot(&self, grid_capacity: usize) -> bool {
        self.is_plan_tab || self.agents.len() < grid_capacity
    }

    pub fn contains(&self, agent_id: &AgentId) -> bool {
        self.agents.contains(agent_id)
    }
}

#[cfg(test)]
#[path = "tab_tests.rs"]
mod tests;
