// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bm-core: domain types for the Bismark orchestration daemon

pub mod activity;
pub mod agent;
pub mod clock;
pub mod event;
pub mod headless;
pub mod id;
pub mod plan;
pub mod prefs;
pub mod repo;
pub mod scrape;
pub mod state;
pub mod tab;
pub mod task;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use activity::{ActivityId, ActivityKind, PlanActivity};
pub use agent::{AgentId, AgentRecord, AgentRole};
pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{Event, SpawnQueueStatus, TerminalId};
pub use headless::{
    extract_pr_url, HeadlessAgentInfo, HeadlessResult, HeadlessStatus, StreamEvent,
};
pub use id::short;
pub use plan::{
    slugify, BranchStrategy, CommitRef, DispatchMode, GitSummary, Plan, PlanId, PlanStatus,
    PlanWorktree, WorktreeStatus,
};
pub use prefs::{AgentModel, AttentionMode, GridSize, OperatingMode, Preferences};
pub use repo::{repo_id_for_root, Repository};
pub use scrape::{Marker, MarkerScanner};
pub use state::{AppState, StateSnapshot};
pub use tab::{Tab, TabId};
pub use task::{
    AssignmentStatus, Task, TaskAssignment, TaskId, TaskStatus, READY_LABEL, REPO_LABEL_PREFIX,
    SENT_LABEL, WORKTREE_LABEL_PREFIX,
};
