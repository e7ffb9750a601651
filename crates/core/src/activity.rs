// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-plan activity log entries.

use crate::plan::PlanId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for an activity entry.
    pub struct ActivityId("act-");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

/// One entry in a plan's scrollable activity feed. Transient per-task
/// problems land as `warning`; plan-fatal conditions as `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanActivity {
    pub id: ActivityId,
    pub plan_id: PlanId,
    pub at_ms: u64,
    #[serde(default)]
    pub kind: ActivityKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl PlanActivity {
    pub fn new(
        plan_id: PlanId,
        kind: ActivityKind,
        message: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id: ActivityId::generate(),
            plan_id,
            at_ms: now_ms,
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
