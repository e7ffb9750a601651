// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan engine tests: lifecycle, dispatch, admission, cancellation.

mod cancel;
mod dispatch;
mod lifecycle;

use crate::test_helpers::{harness, Harness};
use bm_core::{AgentRecord, Plan, PlanId};

/// A harness with a registered repository named `r1` and a reference agent.
pub(crate) async fn plan_harness() -> (Harness, AgentRecord, std::path::PathBuf) {
    let h = harness();
    let repo_dir = h.dir.path().join("r1");
    std::fs::create_dir_all(&repo_dir).unwrap();
    h.runtime.detect_repo(&repo_dir).await.unwrap();
    let reference = h.seed_agent("reference");
    (h, reference, repo_dir)
}

pub(crate) fn draft_plan(h: &Harness, title: &str) -> Plan {
    h.runtime.plans.create_plan(crate::plan::CreatePlan {
        title: title.to_string(),
        description: "test plan".to_string(),
        ..Default::default()
    })
}

pub(crate) async fn execute(h: &Harness, plan_id: &PlanId, reference: &AgentRecord) -> Plan {
    h.runtime
        .plans
        .execute_plan(plan_id, &reference.id)
        .await
        .unwrap()
}
