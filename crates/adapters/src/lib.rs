// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bm-adapters: everything the daemon touches outside its own process —
//! PTYs, attention sockets, the task-store CLI, git, containers, the tool
//! proxy, desktop notifications, and credentials.

pub mod attention;
pub mod container;
pub mod credential;
pub mod git;
pub mod notify;
pub mod proxy;
pub mod pty;
pub mod stream;
pub mod subprocess;
pub mod taskstore;

pub use attention::{new_instance_id, AttentionError, AttentionSignal, AttentionSockets};
pub use container::{
    ContainerError, ContainerHandle, ContainerRuntime, ContainerSpec, DockerRuntime, Mount,
};
pub use credential::{resolve as resolve_credential, run_setup, CredentialError, TOKEN_ENV};
pub use git::{CliGit, GitAdapter, GitError, RepoProbe};
pub use notify::{DesktopNotifier, NotifyAdapter, NotifyError};
pub use proxy::{
    probe_health, GhAudit, GhRequest, GhResponse, ProxyError, ToolProxy, DEFAULT_PROXY_PORT,
};
pub use pty::{
    NativePty, PtyAdapter, PtyController, PtyError, PtyEvent, PtySession, PtySpawnSpec,
};
pub use stream::StreamParser;
pub use subprocess::{run_with_timeout, SubprocessError};
pub use taskstore::{
    CliTaskStore, CreateTask, TaskFilter, TaskStore, TaskStoreError, TaskUpdate,
};

#[cfg(any(test, feature = "test-support"))]
pub use container::{FakeContainer, FakeContainerRuntime};
#[cfg(any(test, feature = "test-support"))]
pub use git::FakeGit;
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotifier, NotifyCall};
#[cfg(any(test, feature = "test-support"))]
pub use pty::{FakePtyAdapter, FakePtyHandle};
#[cfg(any(test, feature = "test-support"))]
pub use taskstore::FakeTaskStore;
