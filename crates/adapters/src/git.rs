// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git worktree management.
//!
//! Worker agents never share a checkout: each task gets its own worktree on
//! its own branch. Everything shells out to `git` with a timeout; operations
//! touching one repository are serialized to keep its worktree metadata
//! consistent.

use crate::subprocess::{expect_success, run_with_timeout, GIT_TIMEOUT};
use async_trait::async_trait;
use bm_core::CommitRef;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {op} failed: {message}")]
    Command { op: String, message: String },

    #[error("not a git repository: {0}")]
    NotARepo(PathBuf),
}

/// What repo detection finds at a path.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoProbe {
    pub root: PathBuf,
    pub name: String,
    pub default_branch: String,
    pub remote_url: Option<String>,
}

#[async_trait]
pub trait GitAdapter: Send + Sync + 'static {
    async fn detect_repo(&self, path: &Path) -> Result<RepoProbe, GitError>;
    async fn branch_exists(&self, repo_root: &Path, branch: &str) -> bool;
    async fn create_worktree(
        &self,
        repo_root: &Path,
        path: &Path,
        branch: &str,
        base: &str,
    ) -> Result<(), GitError>;
    async fn remove_worktree(
        &self,
        repo_root: &Path,
        path: &Path,
        force: bool,
    ) -> Result<(), GitError>;
    async fn prune_worktrees(&self, repo_root: &Path) -> Result<(), GitError>;
    async fn push_branch(&self, repo_root: &Path, branch: &str) -> Result<(), GitError>;
    async fn push_to_remote_branch(
        &self,
        repo_root: &Path,
        local: &str,
        remote: &str,
    ) -> Result<(), GitError>;
    /// `git fetch` + `git rebase <onto>` inside the worktree.
    async fn fetch_and_rebase(&self, worktree: &Path, onto: &str) -> Result<(), GitError>;
    /// Fast-forward `target` to `source` without touching any checkout.
    async fn merge_ff(&self, repo_root: &Path, target: &str, source: &str)
        -> Result<(), GitError>;
    async fn delete_branch(
        &self,
        repo_root: &Path,
        branch: &str,
        also_remote: bool,
    ) -> Result<(), GitError>;
    async fn commits_between(
        &self,
        repo_root: &Path,
        from: &str,
        to: &str,
    ) -> Result<Vec<CommitRef>, GitError>;
    async fn head_commit(&self, path: &Path) -> Result<String, GitError>;

    /// First free name among `base`, `base-2`, `base-3`, …
    async fn unique_branch_name(&self, repo_root: &Path, base: &str) -> String {
        if !self.branch_exists(repo_root, base).await {
            return base.to_string();
        }
        for n in 2.. {
            let candidate = format!("{}-{}", base, n);
            if !self.branch_exists(repo_root, &candidate).await {
                return candidate;
            }
        }
        unreachable!("branch namespace exhausted")
    }
}

/// Shelled-out implementation.
#[derive(Clone, Default)]
pub struct CliGit {
    /// Serializes operations per repository root.
    repo_locks: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
}

impl CliGit {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, repo_root: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.repo_locks.lock();
        locks.entry(repo_root.to_path_buf()).or_default().clone()
    }

    async fn git(&self, cwd: &Path, args: &[&str]) -> Result<String, GitError> {
        let op = args.first().copied().unwrap_or("").to_string();
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(cwd)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE");
        let output = run_with_timeout(cmd, GIT_TIMEOUT, &format!("git {}", op))
            .await
            .map_err(|e| GitError::Command { op: op.clone(), message: e.to_string() })?;
        expect_success(&output, "git")
            .map_err(|message| GitError::Command { op, message })
    }

    async fn git_locked(&self, repo_root: &Path, cwd: &Path, args: &[&str]) -> Result<String, GitError> {
        let lock = self.lock_for(repo_root);
        let _guard = lock.lock().await;
        self.git(cwd, args).await
    }
}

#[async_trait]
impl GitAdapter for CliGit {
    async fn detect_repo(&self, path: &Path) -> Result<RepoProbe, GitError> {
        let root = self
            .git(path, &["rev-parse", "--show-toplevel"])
            .await
            .map_err(|_| GitError::NotARepo(path.to_path_buf()))?;
        let root = PathBuf::from(root);
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("repo")
            .to_string();

        // origin/HEAD names the default branch when the remote is configured.
        let default_branch = match self
            .git(&root, &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"])
            .await
        {
            Ok(r) => r.strip_prefix("origin/").unwrap_or(&r).to_string(),
            Err(_) => self
                .git(&root, &["symbolic-ref", "--short", "HEAD"])
                .await
                .unwrap_or_else(|_| "main".to_string()),
        };

        let remote_url = self.git(&root, &["remote", "get-url", "origin"]).await.ok();

        Ok(RepoProbe { root, name, default_branch, remote_url })
    }

    async fn branch_exists(&self, repo_root: &Path, branch: &str) -> bool {
        let r = format!("refs/heads/{}", branch);
        self.git(repo_root, &["rev-parse", "--verify", "--quiet", &r]).await.is_ok()
    }

    async fn create_worktree(
        &self,
        repo_root: &Path,
        path: &Path,
        branch: &str,
        base: &str,
    ) -> Result<(), GitError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| GitError::Command {
                op: "worktree add".into(),
                message: format!("create parent dir: {}", e),
            })?;
        }
        let path_str = path.display().to_string();
        self.git_locked(
            repo_root,
            repo_root,
            &["worktree", "add", "-b", branch, &path_str, base],
        )
        .await
        .map(|_| ())
    }

    async fn remove_worktree(
        &self,
        repo_root: &Path,
        path: &Path,
        force: bool,
    ) -> Result<(), GitError> {
        let path_str = path.display().to_string();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_str);
        self.git_locked(repo_root, repo_root, &args).await.map(|_| ())
    }

    async fn prune_worktrees(&self, repo_root: &Path) -> Result<(), GitError> {
        self.git_locked(repo_root, repo_root, &["worktree", "prune"]).await.map(|_| ())
    }

    async fn push_branch(&self, repo_root: &Path, branch: &str) -> Result<(), GitError> {
        self.git_locked(repo_root, repo_root, &["push", "-u", "origin", branch])
            .await
            .map(|_| ())
    }

    async fn push_to_remote_branch(
        &self,
        repo_root: &Path,
        local: &str,
        remote: &str,
    ) -> Result<(), GitError> {
        let refspec = format!("{}:{}", local, remote);
        self.git_locked(repo_root, repo_root, &["push", "origin", &refspec])
            .await
            .map(|_| ())
    }

    async fn fetch_and_rebase(&self, worktree: &Path, onto: &str) -> Result<(), GitError> {
        self.git(worktree, &["fetch", "--all", "--prune"]).await?;
        self.git(worktree, &["rebase", onto]).await.map(|_| ())
    }

    async fn merge_ff(
        &self,
        repo_root: &Path,
        target: &str,
        source: &str,
    ) -> Result<(), GitError> {
        if !self.branch_exists(repo_root, target).await {
            return self
                .git_locked(repo_root, repo_root, &["branch", target, source])
                .await
                .map(|_| ());
        }
        // `git fetch . src:dst` fast-forwards dst without a checkout.
        let refspec = format!("{}:{}", source, target);
        self.git_locked(repo_root, repo_root, &["fetch", ".", &refspec]).await.map(|_| ())
    }

    async fn delete_branch(
        &self,
        repo_root: &Path,
        branch: &str,
        also_remote: bool,
    ) -> Result<(), GitError> {
        self.git_locked(repo_root, repo_root, &["branch", "-D", branch]).await?;
        if also_remote {
            let refspec = format!(":{}", branch);
            self.git_locked(repo_root, repo_root, &["push", "origin", &refspec]).await?;
        }
        Ok(())
    }

    async fn commits_between(
        &self,
        repo_root: &Path,
        from: &str,
        to: &str,
    ) -> Result<Vec<CommitRef>, GitError> {
        let range = format!("{}..{}", from, to);
        let out = self
            .git(repo_root, &["log", "--format=%H%x1f%s", &range])
            .await?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let (sha, message) = line.split_once('\u{1f}')?;
                Some(CommitRef { sha: sha.to_string(), message: message.to_string() })
            })
            .collect())
    }

    async fn head_commit(&self, path: &Path) -> Result<String, GitError> {
        self.git(path, &["rev-parse", "HEAD"]).await
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct FakeGitState {
        branches: HashSet<String>,
        worktrees: HashSet<PathBuf>,
        pushed: Vec<String>,
        rebased: Vec<(PathBuf, String)>,
        ff_merges: Vec<(String, String)>,
        deleted_branches: Vec<String>,
        pruned: u32,
        fail_worktree_removal: bool,
    }

    /// In-memory git for tests. Worktree directories are really created and
    /// removed so path-existence invariants can be asserted.
    #[derive(Clone, Default)]
    pub struct FakeGit {
        state: Arc<Mutex<FakeGitState>>,
    }

    impl FakeGit {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_branch(self, branch: &str) -> Self {
            self.state.lock().branches.insert(branch.to_string());
            self
        }

        pub fn fail_worktree_removal(&self, fail: bool) {
            self.state.lock().fail_worktree_removal = fail;
        }

        pub fn worktrees(&self) -> Vec<PathBuf> {
            self.state.lock().worktrees.iter().cloned().collect()
        }

        pub fn pushed_branches(&self) -> Vec<String> {
            self.state.lock().pushed.clone()
        }

        pub fn ff_merges(&self) -> Vec<(String, String)> {
            self.state.lock().ff_merges.clone()
        }

        pub fn rebases(&self) -> Vec<(PathBuf, String)> {
            self.state.lock().rebased.clone()
        }

        pub fn deleted_branches(&self) -> Vec<String> {
            self.state.lock().deleted_branches.clone()
        }

        pub fn prune_count(&self) -> u32 {
            self.state.lock().pruned
        }
    }

    #[async_trait]
    impl GitAdapter for FakeGit {
        async fn detect_repo(&self, path: &Path) -> Result<RepoProbe, GitError> {
            Ok(RepoProbe {
                root: path.to_path_buf(),
                name: path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("repo")
                    .to_string(),
                default_branch: "main".to_string(),
                remote_url: None,
            })
        }

        async fn branch_exists(&self, _repo_root: &Path, branch: &str) -> bool {
            self.state.lock().branches.contains(branch)
        }

        async fn create_worktree(
            &self,
            _repo_root: &Path,
            path: &Path,
            branch: &str,
            _base: &str,
        ) -> Result<(), GitError> {
            std::fs::create_dir_all(path).map_err(|e| GitError::Command {
                op: "worktree add".into(),
                message: e.to_string(),
            })?;
            let mut state = self.state.lock();
            state.branches.insert(branch.to_string());
            state.worktrees.insert(path.to_path_buf());
            Ok(())
        }

        async fn remove_worktree(
            &self,
            _repo_root: &Path,
            path: &Path,
            _force: bool,
        ) -> Result<(), GitError> {
            {
                let state = self.state.lock();
                if state.fail_worktree_removal {
                    return Err(GitError::Command {
                        op: "worktree remove".into(),
                        message: "forced failure".into(),
                    });
                }
            }
            let _ = std::fs::remove_dir_all(path);
            self.state.lock().worktrees.remove(path);
            Ok(())
        }

        async fn prune_worktrees(&self, _repo_root: &Path) -> Result<(), GitError> {
            self.state.lock().pruned += 1;
            Ok(())
        }

        async fn push_branch(&self, _repo_root: &Path, branch: &str) -> Result<(), GitError> {
            self.state.lock().pushed.push(branch.to_string());
            Ok(())
        }

        async fn push_to_remote_branch(
            &self,
            _repo_root: &Path,
            local: &str,
            remote: &str,
        ) -> Result<(), GitError> {
            self.state.lock().pushed.push(format!("{}:{}", local, remote));
            Ok(())
        }

        async fn fetch_and_rebase(&self, worktree: &Path, onto: &str) -> Result<(), GitError> {
            self.state.lock().rebased.push((worktree.to_path_buf(), onto.to_string()));
            Ok(())
        }

        async fn merge_ff(
            &self,
            _repo_root: &Path,
            target: &str,
            source: &str,
        ) -> Result<(), GitError> {
            let mut state = self.state.lock();
            state.branches.insert(target.to_string());
            state.ff_merges.push((target.to_string(), source.to_string()));
            Ok(())
        }

        async fn delete_branch(
            &self,
            _repo_root: &Path,
            branch: &str,
            _also_remote: bool,
        ) -> Result<(), GitError> {
            let mut state = self.state.lock();
            state.branches.remove(branch);
            state.deleted_branches.push(branch.to_string());
            Ok(())
        }

        async fn commits_between(
            &self,
            _repo_root: &Path,
            _from: &str,
            _to: &str,
        ) -> Result<Vec<CommitRef>, GitError> {
            Ok(vec![CommitRef { sha: "f".repeat(40), message: "fake commit".into() }])
        }

        async fn head_commit(&self, _path: &Path) -> Result<String, GitError> {
            Ok("f".repeat(40))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeGit;

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
