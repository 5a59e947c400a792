//! Per-collection delta buffer.
//!
//! Holds at most one pending [`Delta`] per key. A delta arriving for a key that
//! is still buffered is folded into the buffered one (see
//! [`Delta::coalesce`]) and keeps its position, so a key can never overtake
//! itself. Capacity counts distinct keys; pushes for a new key wait while the
//! queue is full, pushes that coalesce never wait.
//!
//! A sync marker may sit between keys. It fires once the consumer comes back
//! for more after taking every delta queued ahead of it, i.e. after those
//! deltas were applied.

use std::collections::HashMap;
use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::Delta;
use super::WatcherStateHandle;
use crate::metrics::QUEUE_DEPTH;
use crate::ResourceKey;
use crate::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Queued,
    Coalesced,
    Cancelled,
}

#[derive(Debug)]
enum Slot {
    Key(ResourceKey),
    SyncMarker(WatcherStateHandle),
}

impl Slot {
    fn holds(
        &self,
        key: &ResourceKey,
    ) -> bool {
        matches!(self, Slot::Key(k) if k == key)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    order: VecDeque<Slot>,
    pending: HashMap<ResourceKey, Delta>,
    closed: bool,
}

impl QueueState {
    fn insert(
        &mut self,
        delta: Delta,
    ) -> PushOutcome {
        let key = delta.key.clone();
        match self.pending.remove(&key) {
            Some(existing) => match existing.coalesce(delta) {
                Some(merged) => {
                    self.pending.insert(key, merged);
                    PushOutcome::Coalesced
                }
                None => {
                    self.order.retain(|slot| !slot.holds(&key));
                    PushOutcome::Cancelled
                }
            },
            None => {
                self.order.push_back(Slot::Key(key.clone()));
                self.pending.insert(key, delta);
                PushOutcome::Queued
            }
        }
    }

    /// Markers passed on the way are moved into `reached`.
    fn pop_front(
        &mut self,
        reached: &mut Vec<WatcherStateHandle>,
    ) -> Option<Delta> {
        while let Some(slot) = self.order.pop_front() {
            match slot {
                Slot::Key(key) => {
                    if let Some(delta) = self.pending.remove(&key) {
                        return Some(delta);
                    }
                }
                Slot::SyncMarker(handle) => reached.push(handle),
            }
        }
        None
    }
}

fn fire(reached: Vec<WatcherStateHandle>) {
    for handle in reached {
        handle.mark_synced();
    }
}

#[derive(Debug)]
pub struct DeltaQueue {
    kind: ResourceKind,
    capacity: usize,
    state: Mutex<QueueState>,
    not_empty: Notify,
    not_full: Notify,
}

impl DeltaQueue {
    pub fn new(
        kind: ResourceKind,
        capacity: usize,
    ) -> Self {
        Self {
            kind,
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Buffers `delta`, waiting for room if its key is new and the queue is full.
    ///
    /// Returns `false` when the delta was dropped because the queue is closed
    /// or `cancel` fired.
    pub async fn push(
        &self,
        delta: Delta,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            let not_full = self.not_full.notified();
            tokio::pin!(not_full);
            not_full.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed || cancel.is_cancelled() {
                    trace!(key = %delta.key, kind = %delta.kind, "queue closed, delta dropped");
                    return false;
                }
                if state.pending.contains_key(&delta.key) || state.pending.len() < self.capacity {
                    let key = delta.key.clone();
                    let outcome = state.insert(delta);
                    let depth = state.pending.len();
                    drop(state);

                    trace!(%key, ?outcome, depth, "delta pushed");
                    QUEUE_DEPTH.with_label_values(&[self.kind.as_str()]).set(depth as i64);
                    match outcome {
                        PushOutcome::Cancelled => self.not_full.notify_one(),
                        _ => self.not_empty.notify_one(),
                    }
                    return true;
                }
            }

            tokio::select! {
                _ = &mut not_full => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    /// Takes the oldest pending delta, waiting until one is available.
    ///
    /// Once `cancel` fired or the queue is closed, whatever is still buffered
    /// is handed out first; `None` means there is nothing left.
    pub async fn pop(
        &self,
        cancel: &CancellationToken,
    ) -> Option<Delta> {
        loop {
            let not_empty = self.not_empty.notified();
            tokio::pin!(not_empty);
            not_empty.as_mut().enable();

            let mut reached = Vec::new();
            let (popped, finished) = {
                let mut state = self.state.lock();
                let popped = state.pop_front(&mut reached).map(|delta| (delta, state.pending.len()));
                let finished = state.closed || cancel.is_cancelled();
                (popped, finished)
            };
            fire(reached);

            if let Some((delta, depth)) = popped {
                QUEUE_DEPTH.with_label_values(&[self.kind.as_str()]).set(depth as i64);
                self.not_full.notify_one();
                return Some(delta);
            }
            if finished {
                return None;
            }

            tokio::select! {
                _ = &mut not_empty => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    /// Non-blocking variant of [`DeltaQueue::pop`].
    pub fn try_pop(&self) -> Option<Delta> {
        let mut reached = Vec::new();
        let mut state = self.state.lock();
        let popped = state.pop_front(&mut reached);
        let depth = state.pending.len();
        drop(state);

        fire(reached);
        let delta = popped?;

        QUEUE_DEPTH.with_label_values(&[self.kind.as_str()]).set(depth as i64);
        self.not_full.notify_one();
        Some(delta)
    }

    /// Queues a marker behind every pending delta; `handle` is marked synced
    /// once the consumer gets past it. Returns `false` if the queue is closed.
    pub(crate) fn push_sync_marker(
        &self,
        handle: WatcherStateHandle,
    ) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.order.push_back(Slot::SyncMarker(handle));
        }
        self.not_empty.notify_one();
        true
    }

    /// Stops accepting pushes. Buffered deltas stay available to `pop`.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
