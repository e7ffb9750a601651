// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Headless worker records and the container event stream.
//!
//! A headless worker emits newline-delimited JSON on stdout. Events are
//! append-only per agent; the supervisor derives status from them (a `result`
//! event completes the run) and persists the log to
//! `plans/{planId}/headless/{taskId}.jsonl`.

use crate::plan::PlanId;
use crate::task::TaskId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadlessStatus {
    #[default]
    Idle,
    Starting,
    Running,
    Completed,
    Failed,
    Stopping,
}

impl HeadlessStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, HeadlessStatus::Completed | HeadlessStatus::Failed)
    }
}

impl fmt::Display for HeadlessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HeadlessStatus::Idle => "idle",
            HeadlessStatus::Starting => "starting",
            HeadlessStatus::Running => "running",
            HeadlessStatus::Completed => "completed",
            HeadlessStatus::Failed => "failed",
            HeadlessStatus::Stopping => "stopping",
        };
        write!(f, "{}", s)
    }
}

/// Final outcome reported by the worker's `result` event, or synthesized
/// from the container exit code when the stream ends without one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeadlessResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// One line of the worker's stdout stream.
///
/// Timestamps are ISO-8601 strings as emitted by the worker; the supervisor
/// never reorders events, so per-agent delivery stays timestamp-monotonic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Init {
        timestamp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    Message {
        timestamp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Value>,
    },
    ToolUse {
        timestamp: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        timestamp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        output: Value,
    },
    Result {
        timestamp: String,
        #[serde(default)]
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost_usd: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    ContentBlockDelta {
        timestamp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Assistant {
        timestamp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Value>,
    },
}

impl StreamEvent {
    pub fn timestamp(&self) -> &str {
        match self {
            StreamEvent::Init { timestamp, .. }
            | StreamEvent::Message { timestamp, .. }
            | StreamEvent::ToolUse { timestamp, .. }
            | StreamEvent::ToolResult { timestamp, .. }
            | StreamEvent::Result { timestamp, .. }
            | StreamEvent::ContentBlockDelta { timestamp, .. }
            | StreamEvent::Assistant { timestamp, .. } => timestamp,
        }
    }

    /// Textual payload of message-bearing events, used for PR-URL scanning.
    /// Tool and init events carry no scannable text.
    pub fn text_payload(&self) -> Option<String> {
        match self {
            StreamEvent::Message { text, content, .. }
            | StreamEvent::Assistant { text, content, .. } => {
                let mut out = text.clone().unwrap_or_default();
                if let Some(value) = content {
                    collect_strings(value, &mut out);
                }
                if out.is_empty() {
                    None
                } else {
                    Some(out)
                }
            }
            StreamEvent::ContentBlockDelta { text, .. } => text.clone(),
            _ => None,
        }
    }

    pub fn as_result(&self) -> Option<HeadlessResult> {
        match self {
            StreamEvent::Result { success, exit_code, cost_usd, duration_ms, .. } => {
                Some(HeadlessResult {
                    success: *success,
                    exit_code: *exit_code,
                    cost_usd: *cost_usd,
                    duration_ms: *duration_ms,
                })
            }
            _ => None,
        }
    }
}

fn collect_strings(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(s);
        }
        Value::Array(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        Value::Object(map) => {
            // Content blocks carry their text under a "text" key.
            if let Some(Value::String(s)) = map.get("text") {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(s);
            }
        }
        _ => {}
    }
}

/// In-memory + persisted record of one headless run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlessAgentInfo {
    pub task_id: TaskId,
    /// Absent for standalone runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,
    #[serde(default)]
    pub status: HeadlessStatus,
    pub worktree_path: PathBuf,
    #[serde(default)]
    pub events: Vec<StreamEvent>,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<HeadlessResult>,
}

impl HeadlessAgentInfo {
    pub fn new(
        task_id: TaskId,
        plan_id: Option<PlanId>,
        worktree_path: PathBuf,
        now_ms: u64,
    ) -> Self {
        Self {
            task_id,
            plan_id,
            status: HeadlessStatus::Idle,
            worktree_path,
            events: Vec::new(),
            started_at_ms: now_ms,
            completed_at_ms: None,
            result: None,
        }
    }

    /// Last pull-request URL mentioned anywhere in the event stream.
    pub fn pull_request_url(&self) -> Option<String> {
        let mut last = None;
        for event in &self.events {
            if let Some(text) = event.text_payload() {
                if let Some(url) = extract_pr_url(&text) {
                    last = Some(url);
                }
            }
        }
        last
    }
}

static PR_URL: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(r"https?://github\.com/[^/\s]+/[^/\s]+/pull/\d+") {
        Ok(re) => re,
        Err(_) => unreachable!("invalid PR pattern"),
    }
});

/// Last pull-request URL in `text`.
///
/// A candidate followed by `/` or a word character is rejected (so
/// `…/pull/42/files` and `…/pull/42abc` don't count, and `…/pull/new/branch`
/// never matches the digits rule in the first place). The regex crate has no
/// lookahead, so the boundary is checked manually.
pub fn extract_pr_url(text: &str) -> Option<String> {
    let mut last = None;
    for m in PR_URL.find_iter(text) {
        let tail = &text[m.end()..];
        match tail.chars().next() {
            Some(c) if c == '/' || c.is_alphanumeric() || c == '_' => continue,
            _ => last = Some(m.as_str().to_string()),
        }
    }
    last
}

#[cfg(test)]
#[path = "headless_tests.rs"]
mod tests;
