// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    plain = { "T42", Some("T42") },
    sentence = { "Created task bm-12", Some("bm-12") },
    trailing_punct = { "Created task T9.", Some("T9") },
    multiline = { "Created task T3\nhint: run list", Some("T3") },
    empty = { "", None },
    whitespace = { "   \n", None },
)]
fn created_id_parsing(stdout: &str, expected: Option<&str>) {
    let parsed = parse_created_id(stdout);
    assert_eq!(parsed.as_ref().map(|id| id.as_str()), expected);
}

#[tokio::test]
async fn fake_store_filters_by_label_and_status() {
    let store = FakeTaskStore::new();
    let dir = Path::new("/plans/p1");
    let ready = store.seed_task(dir, "a", &["bismark-ready"]);
    store.seed_task(dir, "b", &[]);
    let closed = store.seed_task(dir, "c", &["bismark-ready"]);
    store.close_task(dir, &closed);

    let open_ready = store
        .list(dir, TaskFilter { label: Some("bismark-ready".into()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(open_ready.len(), 1);
    assert_eq!(open_ready[0].id, ready);

    let all_closed = store
        .list(dir, TaskFilter { closed: true, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(all_closed.len(), 1);
    assert_eq!(all_closed[0].id, closed);
}

#[tokio::test]
async fn fake_store_update_swaps_labels() {
    let store = FakeTaskStore::new();
    let dir = Path::new("/plans/p1");
    let id = store.seed_task(dir, "a", &["bismark-ready"]);
    store
        .update(
            dir,
            &id,
            TaskUpdate {
                add_labels: vec!["bismark-sent".into()],
                remove_labels: vec!["bismark-ready".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let labels = store.labels_of(dir, &id);
    assert_eq!(labels, vec!["bismark-sent".to_string()]);
}

#[tokio::test]
async fn fake_store_get_returns_none_for_unknown() {
    let store = FakeTaskStore::new();
    let dir = Path::new("/plans/p1");
    assert!(store.get(dir, &TaskId::new("T404")).await.unwrap().is_none());
}

#[tokio::test]
async fn fake_ensure_can_fail_once() {
    let store = FakeTaskStore::new();
    let dir = Path::new("/plans/p1");
    store.fail_ensure();
    assert!(store.ensure(dir).await.is_err());
    assert!(store.ensure(dir).await.is_ok());
    assert_eq!(store.ensured_dirs(), vec![dir.to_path_buf()]);
}
