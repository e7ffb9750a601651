// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assistant credential resolution.
//!
//! Headless containers run isolated from the host keychain and config, so
//! the daemon resolves a token on the host at spawn time and injects it as
//! an environment variable.
//!
//! Resolution order:
//!
//! ```text
//! 1. CLAUDE_CODE_OAUTH_TOKEN env var
//! 2. the daemon's own token file (set via the auth operations)
//! 3. ~/.claude/.credentials.json → claudeAiOauth.accessToken
//! ```

use crate::subprocess::run_with_timeout;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Environment variable the worker container expects the token in.
pub const TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("token setup flow failed: {0}")]
    SetupFailed(String),
}

/// Resolve a token, preferring the environment over the stored token over
/// the assistant's own credentials file.
pub fn resolve(stored: Option<String>) -> Option<String> {
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.is_empty() {
            return Some(token);
        }
    }
    if stored.as_deref().is_some_and(|t| !t.is_empty()) {
        return stored;
    }
    read_credentials_file()
}

/// OAuth token from `~/.claude/.credentials.json`, if present.
fn read_credentials_file() -> Option<String> {
    let path = claude_dir()?.join(".credentials.json");
    let content = std::fs::read_to_string(&path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&content).ok()?;
    value
        .get("claudeAiOauth")
        .and_then(|v| v.get("accessToken"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn claude_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude"))
}

/// Run the assistant's token setup flow and return the minted token.
/// The flow prints the token as its last non-empty stdout line.
pub async fn run_setup(assistant_bin: &str) -> Result<String, CredentialError> {
    let mut cmd = Command::new(assistant_bin);
    cmd.arg("setup-token");
    let output = run_with_timeout(cmd, Duration::from_secs(300), "token setup")
        .await
        .map_err(|e| CredentialError::SetupFailed(e.to_string()))?;
    if !output.status.success() {
        return Err(CredentialError::SetupFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CredentialError::SetupFailed("setup flow printed no token".into()))
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
