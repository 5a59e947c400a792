//! List-then-watch loop for one collection.
//!
//! The watcher keeps its own view of the collection (`known`): the state the
//! store will hold once every delta it has pushed is dispatched. After an
//! expired resume point the fresh listing is diffed against that view, so a
//! relist emits only what actually changed while the stream was down.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Delta;
use super::DeltaQueue;
use super::WatcherState;
use super::WatcherStateHandle;
use crate::metrics::RELISTS;
use crate::metrics::WATCH_RESTARTS;
use crate::utils::async_task::call_with_timeout;
use crate::utils::async_task::Backoff;
use crate::Listing;
use crate::ListOptions;
use crate::RemoteStore;
use crate::Resource;
use crate::ResourceKey;
use crate::ResourceKind;
use crate::ResourceVersion;
use crate::Result;
use crate::RetryPolicies;
use crate::WatchError;
use crate::WatchEvent;

pub struct ResourceWatcher {
    kind: ResourceKind,
    options: ListOptions,
    remote: Arc<dyn RemoteStore>,
    queue: Arc<DeltaQueue>,
    state: WatcherStateHandle,
    retry: RetryPolicies,

    known: BTreeMap<ResourceKey, Resource>,
    last_version: ResourceVersion,
    listed_once: bool,
}

impl ResourceWatcher {
    pub fn new(
        options: ListOptions,
        remote: Arc<dyn RemoteStore>,
        queue: Arc<DeltaQueue>,
        state: WatcherStateHandle,
        retry: RetryPolicies,
    ) -> Self {
        Self {
            kind: queue.kind(),
            options,
            remote,
            queue,
            state,
            retry,
            known: BTreeMap::new(),
            last_version: ResourceVersion::default(),
            listed_once: false,
        }
    }

    /// Runs until `cancel` fires (`Ok`) or a fatal remote error occurs (`Err`).
    pub async fn run(
        mut self,
        cancel: CancellationToken,
    ) -> Result<()> {
        info!(kind = %self.kind, selector = %self.options.label_selector, "watcher started");

        let result = self.run_loop(&cancel).await;
        match &result {
            Ok(()) => {
                self.state.set(WatcherState::Stopped);
                info!(kind = %self.kind, version = %self.last_version, "watcher stopped");
            }
            Err(e) => {
                self.state.set(WatcherState::Error);
                error!(kind = %self.kind, "watcher aborted: {e}");
            }
        }
        result
    }

    async fn run_loop(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut list_backoff = Backoff::new(self.retry.list);
        let mut watch_backoff = Backoff::new(self.retry.watch);
        let mut need_list = true;

        while !cancel.is_cancelled() {
            if need_list {
                self.state.set(WatcherState::Listing);
                match self.list_and_reconcile(cancel).await {
                    Ok(true) => {
                        need_list = false;
                        list_backoff.reset();
                    }
                    Ok(false) => break,
                    Err(e) => {
                        self.on_failure(e, &mut list_backoff, cancel).await?;
                        continue;
                    }
                }
            }

            match self.watch(cancel, &mut watch_backoff).await {
                Ok(()) => {}
                Err(e) if e.is_expired() => {
                    info!(kind = %self.kind, version = %self.last_version, "resume point expired, relisting");
                    WATCH_RESTARTS.with_label_values(&[self.kind.as_str(), e.reason()]).inc();
                    need_list = true;
                }
                Err(e) => self.on_failure(e, &mut watch_backoff, cancel).await?,
            }
        }
        Ok(())
    }

    /// Fatal errors propagate; anything else waits out the backoff.
    async fn on_failure(
        &self,
        error: WatchError,
        backoff: &mut Backoff,
        cancel: &CancellationToken,
    ) -> Result<()> {
        WATCH_RESTARTS.with_label_values(&[self.kind.as_str(), error.reason()]).inc();

        if error.is_fatal() {
            return Err(error.into());
        }
        if backoff.exhausted() {
            return Err(WatchError::RetriesExhausted {
                attempts: backoff.attempts() + 1,
                last: error.to_string(),
            }
            .into());
        }

        warn!(kind = %self.kind, attempts = backoff.attempts() + 1, "remote call failed: {error}");
        self.state.set(WatcherState::Error);
        backoff.wait(cancel).await;
        Ok(())
    }

    /// Lists the collection and pushes the deltas that bring consumers in line
    /// with it. Returns `Ok(false)` if stopped before every delta was pushed.
    async fn list_and_reconcile(
        &mut self,
        cancel: &CancellationToken,
    ) -> std::result::Result<bool, WatchError> {
        let listing = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(false),
            listing = call_with_timeout(
                self.retry.list.timeout(),
                self.remote.list(self.kind, &self.options),
            ) => listing?,
        };

        if let Some(stray) = listing.items.iter().find(|o| o.kind() != self.kind) {
            return Err(WatchError::KindMismatch {
                expected: self.kind,
                actual: stray.kind(),
            });
        }

        let items = listing.items.len();
        let deltas = self.reconcile(listing);
        let initial = !self.listed_once;
        if !initial {
            RELISTS.with_label_values(&[self.kind.as_str()]).inc();
        }
        self.listed_once = true;
        info!(
            kind = %self.kind,
            items,
            deltas = deltas.len(),
            version = %self.last_version,
            "collection listed"
        );

        for delta in deltas {
            if !self.queue.push(delta, cancel).await {
                return Ok(false);
            }
        }
        if initial && !self.queue.push_sync_marker(self.state.clone()) {
            return Ok(false);
        }
        Ok(true)
    }

    /// Diffs `listing` against the current view and adopts it.
    ///
    /// Vanished keys become Deletes, new keys Adds, keys whose version moved
    /// Updates; unchanged keys produce nothing.
    pub(crate) fn reconcile(
        &mut self,
        listing: Listing,
    ) -> Vec<Delta> {
        let mut version = listing.version;
        let fresh: BTreeMap<ResourceKey, Resource> = listing
            .items
            .into_iter()
            .map(|o| {
                version = version.max(o.version());
                (o.key(), o)
            })
            .collect();

        let mut deltas = Vec::new();
        for (key, old) in &self.known {
            if !fresh.contains_key(key) {
                deltas.push(Delta::delete(old.clone()));
            }
        }
        for (key, object) in &fresh {
            match self.known.get(key) {
                None => deltas.push(Delta::add(object.clone())),
                Some(old) if old.version() == object.version() => {}
                Some(old) => deltas.push(Delta::update(old.clone(), object.clone())),
            }
        }

        self.known = fresh;
        self.last_version = version;
        deltas
    }

    /// Consumes one change stream. `Ok` means stopped or the stream ended
    /// cleanly; the caller re-opens from the recorded version.
    ///
    /// A stream that ends or expires before delivering anything waits out
    /// `backoff` first, so a remote that keeps expiring right after every
    /// list is not hammered.
    async fn watch(
        &mut self,
        cancel: &CancellationToken,
        backoff: &mut Backoff,
    ) -> std::result::Result<(), WatchError> {
        let since = self.last_version;
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            stream = call_with_timeout(
                self.retry.watch.timeout(),
                self.remote.watch(self.kind, &self.options, since),
            ) => stream,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                if e.is_expired() {
                    backoff.wait(cancel).await;
                }
                return Err(e);
            }
        };

        self.state.set(WatcherState::Watching);
        backoff.reset();
        debug!(kind = %self.kind, %since, "watch established");

        let mut received = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    received += 1;
                    if !self.handle_event(event, cancel).await? {
                        return Ok(());
                    }
                }
                Some(Err(e)) => {
                    if e.is_expired() && received == 0 {
                        backoff.wait(cancel).await;
                    }
                    return Err(e);
                }
                None => {
                    debug!(kind = %self.kind, received, "watch stream ended, reopening");
                    if received == 0 {
                        backoff.wait(cancel).await;
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Translates one notification into a delta. Returns `Ok(false)` if the
    /// delta could not be pushed because the informer is stopping.
    pub(crate) async fn handle_event(
        &mut self,
        event: WatchEvent,
        cancel: &CancellationToken,
    ) -> std::result::Result<bool, WatchError> {
        let version = event.version();
        if version <= self.last_version {
            trace!(kind = %self.kind, %version, last = %self.last_version, "stale event skipped");
            return Ok(true);
        }

        if let Some(object) = event.object() {
            if object.kind() != self.kind {
                return Err(WatchError::KindMismatch {
                    expected: self.kind,
                    actual: object.kind(),
                });
            }
        }

        let delta = match event {
            WatchEvent::Bookmark(_) => None,
            WatchEvent::Added(object) | WatchEvent::Modified(object) => {
                match self.known.insert(object.key(), object.clone()) {
                    None => Some(Delta::add(object)),
                    Some(old) => Some(Delta::update(old, object)),
                }
            }
            WatchEvent::Deleted(object) => match self.known.remove(&object.key()) {
                Some(_) => Some(Delta::delete(object)),
                None => {
                    trace!(key = %object.key(), "delete for unknown key skipped");
                    None
                }
            },
        };
        self.last_version = version;

        match delta {
            Some(delta) => Ok(self.queue.push(delta, cancel).await),
            None => Ok(true),
        }
    }

    #[cfg(test)]
    pub(crate) fn last_version(&self) -> ResourceVersion {
        self.last_version
    }

    #[cfg(test)]
    pub(crate) fn known_len(&self) -> usize {
        self.known.len()
    }
}
