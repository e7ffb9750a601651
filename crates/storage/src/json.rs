// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Whole-file JSON persistence primitives.
//!
//! Writes are temp-file-then-rename so readers never observe a partial
//! document. Writes to the same path are serialized through a process-wide
//! lock registry; distinct paths proceed concurrently.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed for {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

static PATH_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Per-path serialization lock.
pub(crate) fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    let mut locks = PATH_LOCKS.lock();
    locks.entry(path.to_path_buf()).or_default().clone()
}

fn io_err(path: &Path, source: std::io::Error) -> PersistError {
    PersistError::Io { path: path.to_path_buf(), source }
}

/// Atomically replace `path` with `bytes`. The caller holds the path lock.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(path, e))?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
        file.write_all(bytes).map_err(|e| io_err(&tmp, e))?;
        file.sync_all().map_err(|e| io_err(&tmp, e))?;
    }
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))
}

/// Serialize `value` and atomically replace the document at `path`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| PersistError::Serde { path: path.to_path_buf(), source: e })?;
    let lock = lock_for(path);
    let _guard = lock.lock();
    replace_file(path, &bytes)
}

/// Read a document, returning the default when the file is missing or does
/// not parse. Corrupt files are logged and left in place.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let lock = lock_for(path);
    let _guard = lock.lock();
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "read failed, using default");
            return T::default();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt document, using default");
            T::default()
        }
    }
}

/// Read-modify-replace under one hold of the path lock, so concurrent
/// updaters cannot lose each other's writes.
pub fn update_json<T>(path: &Path, mutate: impl FnOnce(&mut T)) -> Result<(), PersistError>
where
    T: DeserializeOwned + Default + Serialize,
{
    let lock = lock_for(path);
    let _guard = lock.lock();
    let mut value: T = match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "corrupt document, rebuilding");
            T::default()
        }),
        Err(_) => T::default(),
    };
    mutate(&mut value);
    let bytes = serde_json::to_vec_pretty(&value)
        .map_err(|e| PersistError::Serde { path: path.to_path_buf(), source: e })?;
    replace_file(path, &bytes)
}

/// Read a document that may legitimately be absent.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let lock = lock_for(path);
    let _guard = lock.lock();
    let bytes = std::fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt document, skipping");
            None
        }
    }
}

/// Append newline-delimited JSON values to a log file.
pub fn append_jsonl<T: Serialize>(path: &Path, values: &[T]) -> Result<(), PersistError> {
    if values.is_empty() {
        return Ok(());
    }
    let mut buf = Vec::new();
    for value in values {
        serde_json::to_writer(&mut buf, value)
            .map_err(|e| PersistError::Serde { path: path.to_path_buf(), source: e })?;
        buf.push(b'\n');
    }
    let lock = lock_for(path);
    let _guard = lock.lock();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(path, e))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    file.write_all(&buf).map_err(|e| io_err(path, e))
}

/// Read every parseable line of a JSONL log. Unparseable lines are counted
/// and skipped, not fatal — a crash can truncate the final line.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let lock = lock_for(path);
    let _guard = lock.lock();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };
    let mut out = Vec::new();
    let mut skipped = 0usize;
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(value) => out.push(value),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::warn!(path = %path.display(), skipped, "skipped unparseable log lines");
    }
    out
}

#[cfg(test)]
#[path = "json_tests.rs"]
mod tests;
