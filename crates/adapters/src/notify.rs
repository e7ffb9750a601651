// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Desktop notifications, raised when an agent signals for attention.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Adapter for surfacing a notification on the host desktop.
#[async_trait]
pub trait NotifyAdapter: Send + Sync + 'static {
    async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError>;
}

/// Desktop notification adapter using notify-rust.
///
/// On macOS the backing library runs an AppleScript bundle-id lookup on first
/// use, which hangs forever in daemon processes without Automation
/// permissions. The bundle id is pre-set at construction to skip the lookup.
#[derive(Clone, Copy, Debug, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        #[cfg(target_os = "macos")]
        {
            let _ = mac_notification_sys::set_application("com.apple.Terminal");
        }
        Self
    }
}

#[async_trait]
impl NotifyAdapter for DesktopNotifier {
    async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        let title = title.to_string();
        let message = message.to_string();
        // show() blocks on macOS; run it off the async runtime and don't
        // wait — a lost notification is not worth stalling the engine.
        tokio::task::spawn_blocking(move || {
            if let Err(e) =
                notify_rust::Notification::new().summary(&title).body(&message).show()
            {
                tracing::warn!(%title, error = %e, "desktop notification failed");
            }
        });
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct NotifyCall {
        pub title: String,
        pub message: String,
    }

    /// Records notifications instead of showing them.
    #[derive(Clone, Default)]
    pub struct FakeNotifier {
        calls: Arc<Mutex<Vec<NotifyCall>>>,
    }

    impl FakeNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<NotifyCall> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl NotifyAdapter for FakeNotifier {
        async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError> {
            self.calls
                .lock()
                .push(NotifyCall { title: title.to_string(), message: message.to_string() });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotifier, NotifyCall};
