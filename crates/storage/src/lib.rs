// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bm-storage: durable JSON persistence for the Bismark daemon.
//!
//! One JSON document per logical collection under the config root, replaced
//! whole-file via temp-then-rename. Headless worker event logs append
//! line-delimited JSON instead. Reads never fail: a missing or corrupt
//! document yields the collection's default and a warning.

pub mod json;
pub mod paths;
pub mod store;

pub use json::PersistError;
pub use paths::ConfigPaths;
pub use store::ConfigStore;
