// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out of engine events to subscribed connections.
//!
//! The engine emits on one ordered channel; the bus re-broadcasts. A slow
//! subscriber can lag and lose frames (broadcast semantics) — the UI
//! recovers by re-querying state, which every notification payload permits.

use bm_core::Event;
use tokio::sync::{broadcast, mpsc};

const BUS_CAPACITY: usize = 4096;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Pump the engine's ordered event stream into the bus until it closes.
    pub fn pump_from(&self, mut rx: mpsc::UnboundedReceiver<Event>) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                // No subscribers is fine; frames are simply dropped.
                let _ = tx.send(event);
            }
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
