// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::Path;

#[tokio::test]
async fn unique_branch_name_suffixes_on_collision() {
    let git = FakeGit::new()
        .with_branch("bismark/p1/fix-a")
        .with_branch("bismark/p1/fix-a-2");
    let name = git.unique_branch_name(Path::new("/repo"), "bismark/p1/fix-a").await;
    assert_eq!(name, "bismark/p1/fix-a-3");
}

#[tokio::test]
async fn unique_branch_name_prefers_the_bare_name() {
    let git = FakeGit::new();
    let name = git.unique_branch_name(Path::new("/repo"), "bismark/p1/fix-a").await;
    assert_eq!(name, "bismark/p1/fix-a");
}

#[tokio::test]
async fn fake_worktrees_exist_on_disk_until_removed() {
    let dir = tempfile::tempdir().unwrap();
    let git = FakeGit::new();
    let wt = dir.path().join("wt/fix-a");
    git.create_worktree(dir.path(), &wt, "b", "main").await.unwrap();
    assert!(wt.is_dir());
    assert!(git.branch_exists(dir.path(), "b").await);

    git.remove_worktree(dir.path(), &wt, true).await.unwrap();
    assert!(!wt.exists());
    assert!(git.worktrees().is_empty());
}

#[tokio::test]
async fn fake_removal_failure_is_injectable() {
    let dir = tempfile::tempdir().unwrap();
    let git = FakeGit::new();
    let wt = dir.path().join("wt");
    git.create_worktree(dir.path(), &wt, "b", "main").await.unwrap();
    git.fail_worktree_removal(true);
    assert!(git.remove_worktree(dir.path(), &wt, true).await.is_err());
    git.fail_worktree_removal(false);
    assert!(git.remove_worktree(dir.path(), &wt, true).await.is_ok());
}

// CLI-backed tests run against a real throwaway repository.
mod cli {
    use super::*;
    use crate::subprocess::run_with_timeout;
    use std::time::Duration;
    use tokio::process::Command;

    async fn sh(dir: &Path, script: &str) {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]).current_dir(dir);
        let output = run_with_timeout(cmd, Duration::from_secs(30), "setup").await.unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    }

    async fn init_repo(dir: &Path) {
        sh(
            dir,
            "git init -q -b main && \
             git config user.email t@t && git config user.name t && \
             echo hi > README && git add . && git commit -qm init",
        )
        .await;
    }

    #[tokio::test]
    async fn detect_create_and_remove_worktree() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;
        let git = CliGit::new();

        let probe = git.detect_repo(dir.path()).await.unwrap();
        assert_eq!(probe.root.canonicalize().unwrap(), dir.path().canonicalize().unwrap());
        assert_eq!(probe.default_branch, "main");

        let wt = dir.path().join("wt/fix-a");
        git.create_worktree(dir.path(), &wt, "bismark/x/fix-a", "main").await.unwrap();
        assert!(wt.join("README").exists());
        assert!(git.branch_exists(dir.path(), "bismark/x/fix-a").await);

        let head = git.head_commit(&wt).await.unwrap();
        assert_eq!(head.len(), 40);

        git.remove_worktree(dir.path(), &wt, true).await.unwrap();
        git.prune_worktrees(dir.path()).await.unwrap();
        assert!(!wt.exists());

        git.delete_branch(dir.path(), "bismark/x/fix-a", false).await.unwrap();
        assert!(!git.branch_exists(dir.path(), "bismark/x/fix-a").await);
    }

    #[tokio::test]
    async fn merge_ff_moves_the_target_branch() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;
        let git = CliGit::new();

        let wt = dir.path().join("wt/work");
        git.create_worktree(dir.path(), &wt, "work", "main").await.unwrap();
        sh(&wt, "echo change > f && git add f && git commit -qm change").await;

        git.merge_ff(dir.path(), "feature", "work").await.unwrap();
        assert!(git.branch_exists(dir.path(), "feature").await);

        let commits = git.commits_between(dir.path(), "main", "feature").await.unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, "change");

        // Second fast-forward after another commit.
        sh(&wt, "echo more > g && git add g && git commit -qm more").await;
        git.merge_ff(dir.path(), "feature", "work").await.unwrap();
        let commits = git.commits_between(dir.path(), "main", "feature").await.unwrap();
        assert_eq!(commits.len(), 2);
    }

    #[tokio::test]
    async fn detect_repo_rejects_a_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        let git = CliGit::new();
        assert!(matches!(
            git.detect_repo(dir.path()).await,
            Err(GitError::NotARepo(_))
        ));
    }
}
