//! In-memory [`RemoteStore`].
//!
//! Keeps a single version counter across all collections, an event history
//! that can be compacted to expire old resume points, and hooks to inject
//! failures into the next list or watch call.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use super::Listing;
use super::RemoteStore;
use super::WatchEvent;
use super::WatchStream;
use crate::ListOptions;
use crate::Resource;
use crate::ResourceKey;
use crate::ResourceKind;
use crate::ResourceVersion;
use crate::WatchError;

type Broadcast = std::result::Result<Change, WatchError>;

const EVENT_BUFFER: usize = 16 * 1024;

/// One recorded mutation. `previous` is the object a modification replaced,
/// so each watcher can tell whether the object entered or left its selector.
#[derive(Debug, Clone)]
struct Change {
    kind: ResourceKind,
    event: WatchEvent,
    previous: Option<Resource>,
}

impl Change {
    /// The event as seen through `options`, if it concerns that watcher at all.
    fn project(
        &self,
        options: &ListOptions,
    ) -> Option<WatchEvent> {
        let selector = &options.label_selector;
        match &self.event {
            WatchEvent::Modified(object) => {
                let was = self.previous.as_ref().map_or(false, |o| selector.matches(o));
                match (was, selector.matches(object)) {
                    (true, true) => Some(WatchEvent::Modified(object.clone())),
                    (false, true) => Some(WatchEvent::Added(object.clone())),
                    (true, false) => Some(WatchEvent::Deleted(object.clone())),
                    (false, false) => None,
                }
            }
            event => match event.object() {
                Some(object) if !selector.matches(object) => None,
                _ => Some(event.clone()),
            },
        }
    }
}

#[derive(Debug, Default)]
struct MemState {
    version: u64,
    objects: BTreeMap<ResourceKey, Resource>,
    history: VecDeque<Change>,
    /// Watches starting before this version can no longer be served.
    compacted: ResourceVersion,
    list_failures: VecDeque<WatchError>,
    watch_failures: VecDeque<WatchError>,
    list_delay: Option<Duration>,
}

impl MemState {
    fn next_version(&mut self) -> ResourceVersion {
        self.version += 1;
        ResourceVersion(self.version)
    }
}

#[derive(Debug)]
pub struct MemoryRemote {
    state: Mutex<MemState>,
    events: broadcast::Sender<Broadcast>,
    list_calls: AtomicUsize,
    watch_calls: AtomicUsize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Mutex::new(MemState::default()),
            events,
            list_calls: AtomicUsize::new(0),
            watch_calls: AtomicUsize::new(0),
        }
    }

    /// Stores `object` at a fresh version, emitting Added or Modified.
    pub fn apply(
        &self,
        object: impl Into<Resource>,
    ) -> Resource {
        let mut object = object.into();
        let mut state = self.state.lock();
        object.metadata_mut().resource_version = state.next_version();

        let previous = state.objects.insert(object.key(), object.clone());
        let event = match previous {
            Some(_) => WatchEvent::Modified(object.clone()),
            None => WatchEvent::Added(object.clone()),
        };
        self.record(&mut state, Change {
            kind: object.kind(),
            event,
            previous,
        });
        object
    }

    /// Removes `key`, emitting Deleted. Returns the removed object.
    pub fn delete(
        &self,
        key: &ResourceKey,
    ) -> Option<Resource> {
        let mut state = self.state.lock();
        let mut object = state.objects.remove(key)?;
        object.metadata_mut().resource_version = state.next_version();
        self.record(&mut state, Change {
            kind: key.kind,
            event: WatchEvent::Deleted(object.clone()),
            previous: None,
        });
        Some(object)
    }

    /// Mutates the store without notifying any watcher, as if the events
    /// happened while every watcher was disconnected and got compacted away.
    pub fn apply_silently(
        &self,
        object: impl Into<Resource>,
    ) -> Resource {
        let mut object = object.into();
        let mut state = self.state.lock();
        object.metadata_mut().resource_version = state.next_version();
        state.objects.insert(object.key(), object.clone());
        state.compacted = ResourceVersion(state.version);
        state.history.clear();
        object
    }

    pub fn delete_silently(
        &self,
        key: &ResourceKey,
    ) -> Option<Resource> {
        let mut state = self.state.lock();
        let object = state.objects.remove(key)?;
        state.next_version();
        state.compacted = ResourceVersion(state.version);
        state.history.clear();
        Some(object)
    }

    /// Drops the event history; resuming from any older version now fails.
    pub fn compact(&self) {
        let mut state = self.state.lock();
        state.compacted = ResourceVersion(state.version);
        state.history.clear();
        debug!(compacted = %state.compacted, "history compacted");
    }

    /// Ends every open change stream with `error`.
    pub fn disconnect_watchers(
        &self,
        error: WatchError,
    ) {
        let _ = self.events.send(Err(error));
    }

    /// Compacts and ends every open change stream with an expired resume point.
    pub fn expire_watchers(&self) {
        self.compact();
        let version = self.current_version();
        self.disconnect_watchers(WatchError::Expired { version });
    }

    pub fn fail_next_list(
        &self,
        error: WatchError,
    ) {
        self.state.lock().list_failures.push_back(error);
    }

    pub fn fail_next_watch(
        &self,
        error: WatchError,
    ) {
        self.state.lock().watch_failures.push_back(error);
    }

    /// Makes every subsequent list call take at least `delay`.
    pub fn set_list_delay(
        &self,
        delay: Option<Duration>,
    ) {
        self.state.lock().list_delay = delay;
    }

    pub fn current_version(&self) -> ResourceVersion {
        ResourceVersion(self.state.lock().version)
    }

    pub fn get(
        &self,
        key: &ResourceKey,
    ) -> Option<Resource> {
        self.state.lock().objects.get(key).cloned()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Acquire)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::Acquire)
    }

    fn record(
        &self,
        state: &mut MemState,
        change: Change,
    ) {
        state.history.push_back(change.clone());
        // Sent under the state lock so a concurrent `watch` sees each event
        // either in its backlog or on its subscription, never both.
        let _ = self.events.send(Ok(change));
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn list(
        &self,
        kind: ResourceKind,
        options: &ListOptions,
    ) -> std::result::Result<Listing, WatchError> {
        self.list_calls.fetch_add(1, Ordering::AcqRel);

        let delay = self.state.lock().list_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(error) = state.list_failures.pop_front() {
            return Err(error);
        }

        let items = state
            .objects
            .values()
            .filter(|o| o.kind() == kind && options.label_selector.matches(o))
            .cloned()
            .collect();
        Ok(Listing {
            items,
            version: ResourceVersion(state.version),
        })
    }

    async fn watch(
        &self,
        kind: ResourceKind,
        options: &ListOptions,
        since: ResourceVersion,
    ) -> std::result::Result<WatchStream, WatchError> {
        self.watch_calls.fetch_add(1, Ordering::AcqRel);

        let mut state = self.state.lock();
        if let Some(error) = state.watch_failures.pop_front() {
            return Err(error);
        }
        if since < state.compacted {
            return Err(WatchError::Expired { version: since });
        }

        let backlog: Vec<_> = state
            .history
            .iter()
            .filter(|c| c.kind == kind && c.event.version() > since)
            .filter_map(|c| c.project(options))
            .map(Ok)
            .collect();
        let receiver = self.events.subscribe();
        drop(state);

        let options = options.clone();
        let live = BroadcastStream::new(receiver).filter_map(move |item| {
            let out = match item {
                Ok(Ok(change)) if change.kind == kind => change.project(&options).map(Ok),
                Ok(Ok(_)) => None,
                Ok(Err(error)) => Some(Err(error)),
                Err(BroadcastStreamRecvError::Lagged(_)) => Some(Err(WatchError::Expired { version: since })),
            };
            futures::future::ready(out)
        });

        Ok(stream::iter(backlog).chain(live).boxed())
    }
}
