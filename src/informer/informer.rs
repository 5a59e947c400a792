//! Running informer: one watcher and one dispatcher task per collection,
//! sharing a counter table, a sync barrier and a stop signal.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use super::builder::CollectionEntry;
use crate::metrics;
use crate::CounterSnapshot;
use crate::Counters;
use crate::DeltaQueue;
use crate::EventDispatcher;
use crate::InformerConfig;
use crate::LifecycleError;
use crate::ListOptions;
use crate::RemoteStore;
use crate::ResourceEventHandler;
use crate::ResourceKind;
use crate::ResourceWatcher;
use crate::Result;
use crate::StopController;
use crate::Store;
use crate::SyncCoordinator;
use crate::WatcherStateHandle;
use crate::WatcherStatus;

struct Collection {
    options: ListOptions,
    queue: Arc<DeltaQueue>,
    store: Arc<Store>,
    handler: Option<Arc<dyn ResourceEventHandler>>,
    /// Taken by the watcher task on start.
    state: Mutex<Option<WatcherStateHandle>>,
}

pub struct Informer {
    config: InformerConfig,
    remote: Arc<dyn RemoteStore>,
    collections: BTreeMap<ResourceKind, Collection>,
    counters: Arc<Counters>,
    sync: Arc<SyncCoordinator>,
    controller: StopController,
    started: AtomicBool,
}

impl Informer {
    pub(super) fn new(
        config: InformerConfig,
        remote: Arc<dyn RemoteStore>,
        entries: Vec<CollectionEntry>,
    ) -> Self {
        let sync = Arc::new(SyncCoordinator::new());
        let controller = StopController::new();

        let collections = entries
            .into_iter()
            .map(|entry| {
                let queue = Arc::new(DeltaQueue::new(entry.kind, config.queue.capacity));
                controller.register_queue(queue.clone());
                let collection = Collection {
                    options: entry.options,
                    queue,
                    store: Arc::new(Store::new(entry.kind)),
                    handler: entry.handler,
                    state: Mutex::new(Some(sync.register(entry.kind))),
                };
                (entry.kind, collection)
            })
            .collect();

        Self {
            config,
            remote,
            collections,
            counters: Arc::new(Counters::new()),
            sync,
            controller,
            started: AtomicBool::new(false),
        }
    }

    /// Spawns every watcher and dispatcher. Must be called inside a tokio
    /// runtime, and only once.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(LifecycleError::AlreadyStarted.into());
        }

        let token = self.controller.token();
        if self.config.monitoring.prometheus_enabled {
            let port = self.config.monitoring.prometheus_port;
            let shutdown = token.clone();
            self.controller.spawn("metrics-server", async move {
                metrics::start_server(port, shutdown).await;
                Ok(())
            });
        }

        for (kind, collection) in &self.collections {
            let Some(state) = collection.state.lock().take() else {
                continue;
            };
            let watcher = ResourceWatcher::new(
                collection.options.clone(),
                self.remote.clone(),
                collection.queue.clone(),
                state,
                self.config.retry.clone(),
            );
            let dispatcher = EventDispatcher::new(
                collection.queue.clone(),
                collection.store.clone(),
                self.counters.clone(),
                collection.handler.clone(),
            );

            self.controller.spawn(&format!("watcher-{kind}"), watcher.run(token.clone()));
            self.controller.spawn(&format!("dispatcher-{kind}"), dispatcher.run(token.clone()));
        }

        info!(collections = self.collections.len(), "informer started");
        Ok(())
    }

    /// Resolves `true` once every store holds its collection's initial
    /// listing, with the matching handler calls made; `false` on stop,
    /// timeout, or a watcher that died before syncing.
    pub async fn wait_for_sync(
        &self,
        deadline: Duration,
    ) -> bool {
        self.sync.wait_for_sync(deadline, &self.controller.token()).await
    }

    /// [`Informer::wait_for_sync`] with the configured `sync.timeout_ms`.
    pub async fn wait_for_sync_default(&self) -> bool {
        self.wait_for_sync(self.config.sync.timeout()).await
    }

    pub fn has_synced(&self) -> bool {
        self.sync.has_synced()
    }

    /// Signals every task to finish; buffered deltas are still dispatched.
    pub fn stop(&self) {
        self.controller.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.controller.is_stopped()
    }

    /// Waits for every task to exit, returning the fatal error that caused an
    /// unrequested shutdown, if any.
    pub async fn wait(&self) -> Result<()> {
        if !self.started.load(Ordering::Acquire) {
            return Err(LifecycleError::NotStarted.into());
        }
        self.controller.wait().await?;
        info!(counters = ?self.counters.snapshot().events, "informer stopped");
        Ok(())
    }

    /// Read-only view of one collection.
    pub fn store(
        &self,
        kind: ResourceKind,
    ) -> Option<Arc<Store>> {
        self.collections.get(&kind).map(|c| c.store.clone())
    }

    pub fn collections(&self) -> Vec<ResourceKind> {
        self.collections.keys().copied().collect()
    }

    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    pub fn counter_snapshot(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    pub fn watcher_states(&self) -> Vec<(ResourceKind, WatcherStatus)> {
        self.sync.states()
    }
}

impl Drop for Informer {
    fn drop(&mut self) {
        self.controller.stop();
    }
}
