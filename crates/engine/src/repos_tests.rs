// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_adapters::FakeGit;
use bm_storage::{ConfigPaths, ConfigStore};

fn registry() -> (tempfile::TempDir, RepoRegistry) {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(ConfigPaths::at(dir.path()));
    let registry = RepoRegistry::load(store, Arc::new(FakeGit::new()));
    (dir, registry)
}

#[tokio::test]
async fn detect_registers_and_refreshes() {
    let (dir, registry) = registry();
    let repo_dir = dir.path().join("r1");
    std::fs::create_dir_all(&repo_dir).unwrap();

    let repo = registry.detect(&repo_dir).await.unwrap();
    assert_eq!(repo.name, "r1");
    assert_eq!(repo.default_branch, "main");
    assert_eq!(registry.list().len(), 1);

    // Second detection does not duplicate.
    registry.detect(&repo_dir).await.unwrap();
    assert_eq!(registry.list().len(), 1);
    assert!(registry.by_name("r1").is_some());
    assert!(registry.by_id(&repo.id).is_some());
}

#[tokio::test]
async fn update_keeps_user_metadata_across_redetection() {
    let (dir, registry) = registry();
    let repo_dir = dir.path().join("r1");
    std::fs::create_dir_all(&repo_dir).unwrap();
    let repo = registry.detect(&repo_dir).await.unwrap();

    registry
        .update(
            &repo.id,
            RepoPatch {
                purpose: Some("payments service".into()),
                protected_branches: Some(vec!["main".into()]),
                ..Default::default()
            },
        )
        .unwrap();

    let again = registry.detect(&repo_dir).await.unwrap();
    assert_eq!(again.purpose.as_deref(), Some("payments service"));
    assert_eq!(again.protected_branches, vec!["main".to_string()]);
}

#[test]
fn update_unknown_repo_is_not_found() {
    let (_dir, registry) = registry();
    assert!(matches!(
        registry.update("nope", RepoPatch::default()),
        Err(crate::error::EngineError::NotFound(_))
    ));
}
