// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registered repositories.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Stable repository id: truncated SHA-256 of the canonical root path.
pub fn repo_id_for_root(root: &Path) -> String {
    let digest = Sha256::digest(root.display().to_string().as_bytes());
    let hex = format!("{:x}", digest);
    hex[..12].to_string()
}

/// A repository the orchestrator may allocate worktrees in,
/// one entry in `repositories.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    pub root: PathBuf,
    pub name: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protected_branches: Vec<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Repository {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            id: repo_id_for_root(&root),
            root,
            name: name.into(),
            default_branch: default_branch(),
            remote_url: None,
            purpose: None,
            completion_criteria: None,
            protected_branches: Vec::new(),
        }
    }
}

#[cfg(test)]
#[path = "repo_tests.rs"]
mod tests;
