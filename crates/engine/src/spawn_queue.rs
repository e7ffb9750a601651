// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded admission queue for PTY creation.
//!
//! A burst of agent restores at boot would otherwise fork dozens of shells at
//! once. Requests are FIFO; at most [`SPAWN_CONCURRENCY`] spawns run at a
//! time, with a short gap between starts to ease kernel pressure. The queue
//! is an actor: one task owns the counters, callers talk to it over a
//! channel, so admission order is exactly arrival order.

use crate::bus::EventTx;
use bm_core::{AgentId, Event, SpawnQueueStatus};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub const SPAWN_CONCURRENCY: usize = 10;
pub const SPAWN_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpawnQueueError {
    #[error("spawn request cancelled")]
    Cancelled,

    #[error("spawn queue shut down")]
    Closed,
}

enum Command {
    Enqueue { agent_id: AgentId, grant: oneshot::Sender<Result<SpawnPermit, SpawnQueueError>> },
    Release,
    CancelAll,
}

/// Held while a spawn is in flight; dropping it frees the slot.
#[derive(Debug)]
pub struct SpawnPermit {
    release: mpsc::UnboundedSender<Command>,
}

impl Drop for SpawnPermit {
    fn drop(&mut self) {
        let _ = self.release.send(Command::Release);
    }
}

#[derive(Clone)]
pub struct SpawnQueue {
    tx: mpsc::UnboundedSender<Command>,
}

impl SpawnQueue {
    pub fn start(events: EventTx) -> Self {
        Self::with_limits(events, SPAWN_CONCURRENCY, SPAWN_DELAY)
    }

    pub fn with_limits(events: EventTx, concurrency: usize, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pump_tx = tx.clone();
        tokio::spawn(pump(rx, pump_tx, events, concurrency, delay));
        Self { tx }
    }

    /// Wait for a spawn slot. Resolves in FIFO order.
    pub async fn acquire(&self, agent_id: AgentId) -> Result<SpawnPermit, SpawnQueueError> {
        let (grant_tx, grant_rx) = oneshot::channel();
        self.tx
            .send(Command::Enqueue { agent_id, grant: grant_tx })
            .map_err(|_| SpawnQueueError::Closed)?;
        grant_rx.await.map_err(|_| SpawnQueueError::Closed)?
    }

    /// Reject every queued request.
    pub fn cancel_all(&self) {
        let _ = self.tx.send(Command::CancelAll);
    }
}

async fn pump(
    mut rx: mpsc::UnboundedReceiver<Command>,
    tx: mpsc::UnboundedSender<Command>,
    events: EventTx,
    concurrency: usize,
    delay: Duration,
) {
    let mut pending: VecDeque<(AgentId, oneshot::Sender<Result<SpawnPermit, SpawnQueueError>>)> =
        VecDeque::new();
    let mut active = 0usize;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Enqueue { agent_id, grant } => {
                pending.push_back((agent_id, grant));
            }
            Command::Release => {
                active = active.saturating_sub(1);
            }
            Command::CancelAll => {
                for (_, grant) in pending.drain(..) {
                    let _ = grant.send(Err(SpawnQueueError::Cancelled));
                }
            }
        }

        let mut started = false;
        while active < concurrency {
            let Some((_, grant)) = pending.pop_front() else { break };
            if started {
                // Space out consecutive starts.
                tokio::time::sleep(delay).await;
            }
            if grant.send(Ok(SpawnPermit { release: tx.clone() })).is_ok() {
                active += 1;
                started = true;
            }
        }

        emit_status(&events, &pending, active);
    }
}

fn emit_status(
    events: &EventTx,
    pending: &VecDeque<(AgentId, oneshot::Sender<Result<SpawnPermit, SpawnQueueError>>)>,
    active: usize,
) {
    events.emit(Event::TerminalQueueStatus {
        status: SpawnQueueStatus {
            queued: pending.len(),
            active,
            pending: pending.iter().map(|(id, _)| *id).collect(),
        },
    });
}

#[cfg(test)]
#[path = "spawn_queue_tests.rs"]
mod tests;
