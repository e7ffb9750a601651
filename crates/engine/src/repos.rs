// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registered repositories (`repositories.json`).

use crate::error::EngineError;
use bm_adapters::GitAdapter;
use bm_core::{repo_id_for_root, Repository};
use bm_storage::ConfigStore;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

pub struct RepoRegistry {
    store: ConfigStore,
    git: Arc<dyn GitAdapter>,
    repos: Mutex<Vec<Repository>>,
}

/// Mutable repository metadata accepted by `update`.
#[derive(Debug, Clone, Default)]
pub struct RepoPatch {
    pub purpose: Option<String>,
    pub completion_criteria: Option<String>,
    pub protected_branches: Option<Vec<String>>,
    pub default_branch: Option<String>,
}

impl RepoRegistry {
    pub fn load(store: ConfigStore, git: Arc<dyn GitAdapter>) -> Self {
        let repos = store.load_repositories();
        Self { store, git, repos: Mutex::new(repos) }
    }

    pub fn list(&self) -> Vec<Repository> {
        self.repos.lock().clone()
    }

    pub fn by_name(&self, name: &str) -> Option<Repository> {
        self.repos.lock().iter().find(|r| r.name == name).cloned()
    }

    pub fn by_id(&self, id: &str) -> Option<Repository> {
        self.repos.lock().iter().find(|r| r.id == id).cloned()
    }

    /// Probe a path with git and register (or refresh) the repository.
    pub async fn detect(&self, path: &Path) -> Result<Repository, EngineError> {
        let probe = self.git.detect_repo(path).await?;
        let repo = Repository {
            id: repo_id_for_root(&probe.root),
            root: probe.root,
            name: probe.name,
            default_branch: probe.default_branch,
            remote_url: probe.remote_url,
            purpose: None,
            completion_criteria: None,
            protected_branches: Vec::new(),
        };

        let mut repos = self.repos.lock();
        match repos.iter_mut().find(|r| r.id == repo.id) {
            Some(existing) => {
                // Re-detection refreshes probed fields, keeps user metadata.
                existing.default_branch = repo.default_branch.clone();
                existing.remote_url = repo.remote_url.clone();
                existing.name = repo.name.clone();
            }
            None => repos.push(repo.clone()),
        }
        self.persist(&repos);
        Ok(repos
            .iter()
            .find(|r| r.id == repo.id)
            .cloned()
            .unwrap_or(repo))
    }

    pub fn update(&self, id: &str, patch: RepoPatch) -> Result<Repository, EngineError> {
        let mut repos = self.repos.lock();
        let repo = repos
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("repository {}", id)))?;
        if let Some(purpose) = patch.purpose {
            repo.purpose = Some(purpose);
        }
        if let Some(criteria) = patch.completion_criteria {
            repo.completion_criteria = Some(criteria);
        }
        if let Some(branches) = patch.protected_branches {
            repo.protected_branches = branches;
        }
        if let Some(branch) = patch.default_branch {
            repo.default_branch = branch;
        }
        let updated = repo.clone();
        self.persist(&repos);
        Ok(updated)
    }

    fn persist(&self, repos: &[Repository]) {
        if let Err(e) = self.store.save_repositories(repos) {
            tracing::error!(error = %e, "repository save failed, keeping in-memory value");
        }
    }
}

#[cfg(test)]
#[path = "repos_tests.rs"]
mod tests;
