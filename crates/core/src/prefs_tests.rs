// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    one = { GridSize::One, 1 },
    two_by_two = { GridSize::TwoByTwo, 4 },
    two_by_three = { GridSize::TwoByThree, 6 },
    three_by_three = { GridSize::ThreeByThree, 9 },
)]
fn grid_capacity(size: GridSize, capacity: usize) {
    assert_eq!(size.capacity(), capacity);
}

#[test]
fn grid_size_serializes_as_dimensions() {
    assert_eq!(serde_json::to_string(&GridSize::TwoByThree).unwrap(), "\"2x3\"");
    let parsed: GridSize = serde_json::from_str("\"3x3\"").unwrap();
    assert_eq!(parsed, GridSize::ThreeByThree);
}

#[test]
fn preferences_default_and_round_trip() {
    let prefs = Preferences::default();
    assert_eq!(prefs.attention_mode, AttentionMode::Focus);
    assert_eq!(prefs.grid_size, GridSize::TwoByTwo);
    assert!(!prefs.tutorial_completed);

    let json = serde_json::to_string(&prefs).unwrap();
    let back: Preferences = serde_json::from_str(&json).unwrap();
    assert_eq!(back, prefs);
}

#[test]
fn preferences_tolerate_missing_fields() {
    let parsed: Preferences = serde_json::from_str("{\"operatingMode\":\"team\"}").unwrap();
    assert_eq!(parsed.operating_mode, OperatingMode::Team);
    assert_eq!(parsed.agent_model, AgentModel::Sonnet);
}
