//! Cache sync barrier.
//!
//! Every watcher publishes its [`WatcherStatus`] through a `watch` channel;
//! [`SyncCoordinator::wait_for_sync`] sleeps on those channels until every
//! collection reports `synced`. A collection is synced once its dispatcher
//! has applied every delta of the initial listing, which the watcher signals
//! by queueing a marker behind them (see [`crate::DeltaQueue`]).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::ResourceKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatcherState {
    #[default]
    NotStarted,
    Listing,
    Watching,
    Error,
    Stopped,
}

impl fmt::Display for WatcherState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            WatcherState::NotStarted => "not_started",
            WatcherState::Listing => "listing",
            WatcherState::Watching => "watching",
            WatcherState::Error => "error",
            WatcherState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStatus {
    pub state: WatcherState,
    /// Set once the store holds the initial listing; never cleared.
    pub synced: bool,
}

/// Write side of one collection's status. The watcher task owns it; a clone
/// rides through the delta queue as the sync marker.
#[derive(Debug, Clone)]
pub struct WatcherStateHandle {
    kind: ResourceKind,
    tx: Arc<watch::Sender<WatcherStatus>>,
}

impl WatcherStateHandle {
    pub(crate) fn set(
        &self,
        state: WatcherState,
    ) {
        self.tx.send_modify(|status| status.state = state);
        debug!(kind = %self.kind, %state, "watcher state changed");
    }

    pub(crate) fn mark_synced(&self) {
        let first_sync = self.tx.send_if_modified(|status| !std::mem::replace(&mut status.synced, true));
        if first_sync {
            info!(kind = %self.kind, "collection synced");
        }
    }

    pub fn status(&self) -> WatcherStatus {
        *self.tx.borrow()
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

#[derive(Debug, Default)]
pub struct SyncCoordinator {
    watchers: Mutex<Vec<(ResourceKind, watch::Receiver<WatcherStatus>)>>,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a watcher and hands back the handle it reports through.
    pub fn register(
        &self,
        kind: ResourceKind,
    ) -> WatcherStateHandle {
        let (tx, rx) = watch::channel(WatcherStatus::default());
        self.watchers.lock().push((kind, rx));
        WatcherStateHandle { kind, tx: Arc::new(tx) }
    }

    /// Blocks until every registered collection has synced.
    ///
    /// Returns `false` if `stop` fires or `deadline` elapses first, or if a
    /// watcher exits without ever syncing.
    pub async fn wait_for_sync(
        &self,
        deadline: Duration,
        stop: &CancellationToken,
    ) -> bool {
        if self.has_synced() {
            return true;
        }
        let receivers: Vec<_> = self.watchers.lock().iter().map(|(_, rx)| rx.clone()).collect();

        let all_synced = async move {
            for mut rx in receivers {
                if rx.wait_for(|status| status.synced).await.is_err() {
                    return false;
                }
            }
            true
        };

        tokio::select! {
            biased;
            _ = stop.cancelled() => false,
            result = tokio::time::timeout(deadline, all_synced) => result.unwrap_or(false),
        }
    }

    pub fn has_synced(&self) -> bool {
        self.watchers.lock().iter().all(|(_, rx)| rx.borrow().synced)
    }

    pub fn states(&self) -> Vec<(ResourceKind, WatcherStatus)> {
        self.watchers
            .lock()
            .iter()
            .map(|(kind, rx)| (*kind, *rx.borrow()))
            .collect()
    }
}
