// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::plan::PlanId;

#[test]
fn normal_tab_fills_at_capacity() {
    let mut tab = Tab::new("main");
    assert!(tab.has_free_slot(2));
    tab.agents.push(AgentId::generate());
    tab.agents.push(AgentId::generate());
    assert!(!tab.has_free_slot(2));
}

#[test]
fn plan_tab_never_fills() {
    let mut tab = Tab::for_plan("plan", PlanId::generate());
    for _ in 0..50 {
        tab.agents.push(AgentId::generate());
    }
    assert!(tab.has_free_slot(1));
    assert!(tab.is_plan_tab);
    assert!(tab.plan_id.is_some());
}

#[test]
fn contains_checks_membership() {
    let mut tab = Tab::new("t");
    let a = AgentId::generate();
    assert!(!tab.contains(&a));
    tab.agents.push(a);
    assert!(tab.contains(&a));
}

#[test]
fn serde_camel_case() {
    let tab = Tab::for_plan("p", PlanId::from_string("pln-x"));
    let json = serde_json::to_value(&tab).unwrap();
    assert_eq!(json["isPlanTab"], true);
    assert_eq!(json["planId"], "pln-x");
}
