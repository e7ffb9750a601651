// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Doc {
    name: String,
    count: u32,
}

#[test]
fn write_then_read_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    let doc = Doc { name: "a".into(), count: 3 };
    write_json(&path, &doc).unwrap();
    let back: Doc = read_json_or_default(&path);
    assert_eq!(back, doc);
}

#[test]
fn missing_file_yields_default() {
    let dir = tempfile::tempdir().unwrap();
    let back: Doc = read_json_or_default(&dir.path().join("absent.json"));
    assert_eq!(back, Doc::default());
}

#[test]
fn corrupt_file_yields_default_and_is_left_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    std::fs::write(&path, "{ not json").unwrap();
    let back: Doc = read_json_or_default(&path);
    assert_eq!(back, Doc::default());
    assert!(path.exists());
}

#[test]
fn write_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a/b/doc.json");
    write_json(&path, &Doc::default()).unwrap();
    assert!(path.exists());
}

#[test]
fn no_temp_file_remains_after_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    write_json(&path, &Doc::default()).unwrap();
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["doc.json".to_string()]);
}

#[test]
fn update_starts_from_default_and_accumulates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("list.json");
    for i in 0..3u32 {
        update_json(&path, |list: &mut Vec<u32>| list.push(i)).unwrap();
    }
    let back: Vec<u32> = read_json_or_default(&path);
    assert_eq!(back, vec![0, 1, 2]);
}

#[test]
fn jsonl_appends_and_reads_back_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.jsonl");
    append_jsonl(&path, &[Doc { name: "x".into(), count: 1 }]).unwrap();
    append_jsonl(&path, &[Doc { name: "y".into(), count: 2 }]).unwrap();
    let back: Vec<Doc> = read_jsonl(&path);
    assert_eq!(back.len(), 2);
    assert_eq!(back[0].name, "x");
    assert_eq!(back[1].name, "y");
}

#[test]
fn jsonl_skips_a_truncated_final_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.jsonl");
    append_jsonl(&path, &[Doc { name: "ok".into(), count: 1 }]).unwrap();
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"{\"name\":\"tru").unwrap();
    let back: Vec<Doc> = read_jsonl(&path);
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].name, "ok");
}

#[test]
fn empty_append_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.jsonl");
    append_jsonl::<Doc>(&path, &[]).unwrap();
    assert!(!path.exists());
}
