// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bus::EventTx;
use bm_core::AgentId;
use std::sync::Arc;

#[tokio::test]
async fn grants_resolve_in_fifo_order() {
    let (events, _rx) = EventTx::channel();
    let queue = SpawnQueue::with_limits(events, 2, Duration::from_millis(1));

    let first = queue.acquire(AgentId::generate()).await.unwrap();
    let _second = queue.acquire(AgentId::generate()).await.unwrap();

    // Queue is saturated; a third waits until a permit drops.
    let queue2 = queue.clone();
    let third = tokio::spawn(async move { queue2.acquire(AgentId::generate()).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!third.is_finished());

    drop(first);
    let permit = third.await.unwrap().unwrap();
    drop(permit);
}

#[tokio::test]
async fn concurrency_bound_holds_under_burst() {
    let (events, _rx) = EventTx::channel();
    let queue = SpawnQueue::with_limits(events, 3, Duration::from_millis(1));

    let in_flight = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let queue = queue.clone();
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            let permit = queue.acquire(AgentId::generate()).await.unwrap();
            let now = in_flight.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            peak.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            in_flight.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            drop(permit);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert!(peak.load(std::sync::atomic::Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn cancel_all_rejects_pending() {
    let (events, _rx) = EventTx::channel();
    let queue = SpawnQueue::with_limits(events, 1, Duration::from_millis(1));

    let held = queue.acquire(AgentId::generate()).await.unwrap();
    let queue2 = queue.clone();
    let waiting = tokio::spawn(async move { queue2.acquire(AgentId::generate()).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    queue.cancel_all();
    assert_eq!(waiting.await.unwrap().unwrap_err(), SpawnQueueError::Cancelled);

    // The held permit is unaffected and future requests still work.
    drop(held);
    assert!(queue.acquire(AgentId::generate()).await.is_ok());
}

#[tokio::test]
async fn status_events_track_queue_depth() {
    let (events, mut rx) = EventTx::channel();
    let queue = SpawnQueue::with_limits(events, 1, Duration::from_millis(1));

    let agent_a = AgentId::generate();
    let agent_b = AgentId::generate();
    let _held = queue.acquire(agent_a).await.unwrap();
    let queue2 = queue.clone();
    let _waiting = tokio::spawn(async move { queue2.acquire(agent_b).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut saw_queued = false;
    while let Ok(event) = rx.try_recv() {
        if let bm_core::Event::TerminalQueueStatus { status } = event {
            if status.queued == 1 && status.active == 1 && status.pending == vec![agent_b] {
                saw_queued = true;
            }
        }
    }
    assert!(saw_queued, "no status event showed the queued agent");
}
