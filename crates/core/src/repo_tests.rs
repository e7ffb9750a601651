// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::Path;

#[test]
fn repo_id_is_stable_and_short() {
    let a = repo_id_for_root(Path::new("/srv/repo"));
    let b = repo_id_for_root(Path::new("/srv/repo"));
    let c = repo_id_for_root(Path::new("/srv/other"));
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 12);
}

#[test]
fn new_repository_derives_its_id() {
    let repo = Repository::new("/srv/repo", "repo");
    assert_eq!(repo.id, repo_id_for_root(Path::new("/srv/repo")));
    assert_eq!(repo.default_branch, "main");
}

#[test]
fn repository_serde_round_trip() {
    let mut repo = Repository::new("/srv/repo", "repo");
    repo.protected_branches = vec!["main".into(), "release".into()];
    repo.remote_url = Some("git@github.com:x/repo.git".into());
    let json = serde_json::to_string(&repo).unwrap();
    let back: Repository = serde_json::from_str(&json).unwrap();
    assert_eq!(back, repo);
}
