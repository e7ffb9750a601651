// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound event channel shared by every engine component.
//!
//! Unbounded on purpose: emitters are synchronous mutators holding locks, and
//! the daemon-side bus drains continuously. A lagging UI subscriber is the
//! bus's problem, not the engine's.

use bm_core::Event;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct EventTx {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventTx {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: Event) {
        tracing::trace!(event = event.name(), "emit");
        // A closed receiver means the daemon is shutting down.
        let _ = self.tx.send(event);
    }
}
