// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical workspace state: tabs, grid placement, focus, the attention
//! queue, and preferences.
//!
//! All mutation goes through `&self` methods on one instance, so the
//! invariants hold without external locking:
//! - an agent appears in at most one tab
//! - positions within a tab are contiguous `0..n-1` (the Vec order)
//! - a normal tab never exceeds the grid capacity; plan tabs are unbounded
//! - the focused agent is placed somewhere, or focus is cleared
//!
//! Every mutation persists the durable slice (`state.json`) and pushes a
//! fresh snapshot to the UI.

use crate::bus::EventTx;
use crate::error::EngineError;
use bm_core::{
    AgentId, AgentModel, AppState, AttentionMode, Event, GridSize, OperatingMode, PlanId,
    Preferences, StateSnapshot, Tab, TabId,
};
use bm_storage::ConfigStore;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Partial preferences update; absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferencesPatch {
    pub attention_mode: Option<AttentionMode>,
    pub operating_mode: Option<OperatingMode>,
    pub agent_model: Option<AgentModel>,
    pub grid_size: Option<GridSize>,
    pub tutorial_completed: Option<bool>,
}

struct StateInner {
    tabs: Vec<Tab>,
    active_tab_id: Option<TabId>,
    focused: Option<AgentId>,
    preferences: Preferences,
    attention: Vec<AgentId>,
    active_agents: HashSet<AgentId>,
}

pub struct StateManager {
    store: ConfigStore,
    events: EventTx,
    inner: Mutex<StateInner>,
}

impl StateManager {
    pub fn load(store: ConfigStore, events: EventTx) -> Self {
        let app = store.load_app_state();
        Self {
            store,
            events,
            inner: Mutex::new(StateInner {
                tabs: app.tabs,
                active_tab_id: app.active_tab_id,
                focused: app.focused_agent_id,
                preferences: app.preferences,
                attention: Vec::new(),
                active_agents: HashSet::new(),
            }),
        }
    }

    // --- queries ---

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.lock();
        snapshot_of(&inner)
    }

    pub fn preferences(&self) -> Preferences {
        self.inner.lock().preferences.clone()
    }

    pub fn grid_capacity(&self) -> usize {
        self.inner.lock().preferences.grid_size.capacity()
    }

    pub fn attention_queue(&self) -> Vec<AgentId> {
        self.inner.lock().attention.clone()
    }

    pub fn tab(&self, tab_id: &TabId) -> Option<Tab> {
        self.inner.lock().tabs.iter().find(|t| &t.id == tab_id).cloned()
    }

    pub fn tab_of_agent(&self, agent_id: &AgentId) -> Option<TabId> {
        self.inner
            .lock()
            .tabs
            .iter()
            .find(|t| t.contains(agent_id))
            .map(|t| t.id)
    }

    pub fn is_active(&self, agent_id: &AgentId) -> bool {
        self.inner.lock().active_agents.contains(agent_id)
    }

    // --- tabs ---

    pub fn create_tab(&self, name: &str) -> Tab {
        let tab = Tab::new(name);
        let mut inner = self.inner.lock();
        inner.tabs.push(tab.clone());
        if inner.active_tab_id.is_none() {
            inner.active_tab_id = Some(tab.id);
        }
        self.commit(&inner);
        tab
    }

    pub fn create_plan_tab(&self, name: &str, plan_id: PlanId) -> Tab {
        let tab = Tab::for_plan(name, plan_id);
        let mut inner = self.inner.lock();
        inner.tabs.push(tab.clone());
        self.commit(&inner);
        tab
    }

    pub fn rename_tab(&self, tab_id: &TabId, name: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        let tab = find_tab_mut(&mut inner.tabs, tab_id)?;
        tab.name = name.to_string();
        self.commit(&inner);
        Ok(())
    }

    /// Remove a tab, returning the agent ids it held so the caller can shut
    /// them down.
    pub fn delete_tab(&self, tab_id: &TabId) -> Result<Vec<AgentId>, EngineError> {
        let mut inner = self.inner.lock();
        let index = inner
            .tabs
            .iter()
            .position(|t| &t.id == tab_id)
            .ok_or_else(|| EngineError::NotFound(format!("tab {}", tab_id)))?;
        let removed = inner.tabs.remove(index);

        if inner.active_tab_id == Some(removed.id) {
            inner.active_tab_id = inner.tabs.first().map(|t| t.id);
        }
        if let Some(ref focused) = inner.focused {
            if removed.contains(focused) {
                inner.focused = None;
            }
        }
        self.commit(&inner);
        Ok(removed.agents)
    }

    pub fn set_active_tab(&self, tab_id: &TabId) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        find_tab_mut(&mut inner.tabs, tab_id)?;
        inner.active_tab_id = Some(*tab_id);
        self.commit(&inner);
        Ok(())
    }

    /// The tab the agent should land in: its current tab, else the first
    /// normal tab with a free grid slot, else a fresh tab.
    pub fn tab_for_agent(&self, agent_id: &AgentId) -> TabId {
        let mut inner = self.inner.lock();
        if let Some(tab) = inner.tabs.iter().find(|t| t.contains(agent_id)) {
            return tab.id;
        }
        let capacity = inner.preferences.grid_size.capacity();
        if let Some(tab) = inner
            .tabs
            .iter()
            .find(|t| !t.is_plan_tab && t.has_free_slot(capacity))
        {
            return tab.id;
        }
        let tab = Tab::new(format!("Tab {}", inner.tabs.len() + 1));
        let id = tab.id;
        inner.tabs.push(tab);
        if inner.active_tab_id.is_none() {
            inner.active_tab_id = Some(id);
        }
        self.commit(&inner);
        id
    }

    pub fn add_agent_to_tab(
        &self,
        agent_id: &AgentId,
        tab_id: &TabId,
        position: Option<usize>,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        // One tab per agent: a placement elsewhere is removed first.
        for tab in inner.tabs.iter_mut() {
            if &tab.id != tab_id {
                tab.agents.retain(|a| a != agent_id);
            }
        }
        let capacity = inner.preferences.grid_size.capacity();
        let tab = find_tab_mut(&mut inner.tabs, tab_id)?;
        if tab.contains(agent_id) {
            return Ok(());
        }
        if !tab.has_free_slot(capacity) {
            return Err(EngineError::InvalidState(format!("tab {} is full", tab_id)));
        }
        let position = position.unwrap_or(tab.agents.len()).min(tab.agents.len());
        tab.agents.insert(position, *agent_id);
        self.commit(&inner);
        Ok(())
    }

    pub fn remove_agent_from_tab(&self, agent_id: &AgentId) -> Option<TabId> {
        let mut inner = self.inner.lock();
        let mut removed_from = None;
        for tab in inner.tabs.iter_mut() {
            let before = tab.agents.len();
            tab.agents.retain(|a| a != agent_id);
            if tab.agents.len() != before {
                removed_from = Some(tab.id);
            }
        }
        if removed_from.is_some() {
            if inner.focused.as_ref() == Some(agent_id) {
                inner.focused = None;
            }
            self.commit(&inner);
        }
        removed_from
    }

    pub fn reorder_in_tab(
        &self,
        tab_id: &TabId,
        agent_id: &AgentId,
        new_position: usize,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        let tab = find_tab_mut(&mut inner.tabs, tab_id)?;
        let index = tab
            .agents
            .iter()
            .position(|a| a == agent_id)
            .ok_or_else(|| EngineError::NotFound(format!("agent {} in tab {}", agent_id, tab_id)))?;
        let agent = tab.agents.remove(index);
        let new_position = new_position.min(tab.agents.len());
        tab.agents.insert(new_position, agent);
        self.commit(&inner);
        Ok(())
    }

    pub fn move_agent_to_tab(
        &self,
        agent_id: &AgentId,
        target_tab_id: &TabId,
        position: Option<usize>,
    ) -> Result<(), EngineError> {
        self.add_agent_to_tab(agent_id, target_tab_id, position)
    }

    // --- focus ---

    pub fn set_focused(&self, agent_id: Option<AgentId>) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if let Some(ref id) = agent_id {
            if !inner.tabs.iter().any(|t| t.contains(id)) {
                return Err(EngineError::NotFound(format!("agent {} is not placed", id)));
            }
        }
        inner.focused = agent_id;
        self.commit(&inner);
        Ok(())
    }

    // --- preferences ---

    pub fn set_preferences(&self, patch: PreferencesPatch) -> Preferences {
        let mut inner = self.inner.lock();
        if let Some(mode) = patch.attention_mode {
            inner.preferences.attention_mode = mode;
        }
        if let Some(mode) = patch.operating_mode {
            inner.preferences.operating_mode = mode;
        }
        if let Some(model) = patch.agent_model {
            inner.preferences.agent_model = model;
        }
        if let Some(grid) = patch.grid_size {
            inner.preferences.grid_size = grid;
        }
        if let Some(done) = patch.tutorial_completed {
            inner.preferences.tutorial_completed = done;
        }
        let prefs = inner.preferences.clone();
        self.commit(&inner);
        prefs
    }

    // --- attention queue ---

    /// FIFO append, deduplicated. Emits `agent-waiting` and the new queue.
    pub fn attention_push(&self, agent_id: &AgentId) -> bool {
        let mut inner = self.inner.lock();
        if inner.attention.contains(agent_id) {
            return false;
        }
        inner.attention.push(*agent_id);
        let queue = inner.attention.clone();
        drop(inner);
        self.events.emit(Event::AgentWaiting { agent_id: *agent_id });
        self.events.emit(Event::WaitingQueueChanged { queue });
        true
    }

    /// Remove by id. Unknown ids are a no-op with no event.
    pub fn attention_ack(&self, agent_id: &AgentId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.attention.len();
        inner.attention.retain(|a| a != agent_id);
        if inner.attention.len() == before {
            return false;
        }
        let queue = inner.attention.clone();
        drop(inner);
        self.events.emit(Event::WaitingQueueChanged { queue });
        true
    }

    // --- active agents ---

    pub fn mark_agent_active(&self, agent_id: &AgentId) {
        let mut inner = self.inner.lock();
        if inner.active_agents.insert(*agent_id) {
            self.emit_snapshot(&inner);
        }
    }

    pub fn mark_agent_inactive(&self, agent_id: &AgentId) {
        let mut inner = self.inner.lock();
        let removed = inner.active_agents.remove(agent_id);
        inner.attention.retain(|a| a != agent_id);
        if removed {
            self.emit_snapshot(&inner);
        }
    }

    // --- internals ---

    /// Persist the durable slice and push a snapshot.
    fn commit(&self, inner: &StateInner) {
        let app = AppState {
            tabs: inner.tabs.clone(),
            active_tab_id: inner.active_tab_id,
            focused_agent_id: inner.focused,
            preferences: inner.preferences.clone(),
        };
        if let Err(e) = self.store.save_app_state(&app) {
            tracing::error!(error = %e, "state save failed, keeping in-memory value");
        }
        self.emit_snapshot(inner);
    }

    fn emit_snapshot(&self, inner: &StateInner) {
        self.events.emit(Event::StateUpdate { snapshot: snapshot_of(inner) });
    }
}

fn snapshot_of(inner: &StateInner) -> StateSnapshot {
    let mut active: Vec<AgentId> = inner.active_agents.iter().copied().collect();
    active.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    StateSnapshot {
        tabs: inner.tabs.clone(),
        active_tab_id: inner.active_tab_id,
        focused_agent_id: inner.focused,
        preferences: inner.preferences.clone(),
        attention_queue: inner.attention.clone(),
        active_agents: active,
    }
}

fn find_tab_mut<'t>(tabs: &'t mut [Tab], tab_id: &TabId) -> Result<&'t mut Tab, EngineError> {
    tabs.iter_mut()
        .find(|t| &t.id == tab_id)
        .ok_or_else(|| EngineError::NotFound(format!("tab {}", tab_id)))
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
