// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine-level errors surfaced to the operations layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("external tool failed: {0}")]
    ExternalTool(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] bm_storage::PersistError),

    #[error("auth: {0}")]
    Auth(String),
}

impl From<bm_adapters::TaskStoreError> for EngineError {
    fn from(e: bm_adapters::TaskStoreError) -> Self {
        match e {
            bm_adapters::TaskStoreError::NotFound(id) => {
                EngineError::NotFound(format!("task {}", id))
            }
            bm_adapters::TaskStoreError::BadOutput(msg) => EngineError::Parse(msg),
            bm_adapters::TaskStoreError::Unavailable(msg) => EngineError::ExternalTool(msg),
        }
    }
}

impl From<bm_adapters::GitError> for EngineError {
    fn from(e: bm_adapters::GitError) -> Self {
        EngineError::ExternalTool(e.to_string())
    }
}

impl From<bm_adapters::ContainerError> for EngineError {
    fn from(e: bm_adapters::ContainerError) -> Self {
        EngineError::ExternalTool(e.to_string())
    }
}

impl From<bm_adapters::PtyError> for EngineError {
    fn from(e: bm_adapters::PtyError) -> Self {
        EngineError::ExternalTool(e.to_string())
    }
}

impl From<bm_adapters::AttentionError> for EngineError {
    fn from(e: bm_adapters::AttentionError) -> Self {
        EngineError::ResourceUnavailable(e.to_string())
    }
}

impl From<bm_adapters::ProxyError> for EngineError {
    fn from(e: bm_adapters::ProxyError) -> Self {
        EngineError::ResourceUnavailable(e.to_string())
    }
}
