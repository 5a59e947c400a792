//! Assembles an [`Informer`] from a remote store, a configuration and the
//! collections to watch.
//!
//! ## Example
//! ```ignore
//! let informer = InformerBuilder::new(config, remote)
//!     .watch(ResourceKind::Pod)
//!     .watch(ResourceKind::ConfigMap)
//!     .handler(ResourceKind::Pod, my_pod_handler)
//!     .build()?;
//! informer.start()?;
//! informer.wait_for_sync(Duration::from_secs(30)).await;
//! ```
//!
//! Misuse such as handlers for unwatched collections is collected while
//! chaining and reported by [`InformerBuilder::build`].

use std::sync::Arc;

use tracing::info;

use super::Informer;
use crate::InformerConfig;
use crate::LabelSelector;
use crate::LifecycleError;
use crate::ListOptions;
use crate::RemoteStore;
use crate::ResourceEventHandler;
use crate::ResourceKind;
use crate::Result;

pub(super) struct CollectionEntry {
    pub(super) kind: ResourceKind,
    pub(super) options: ListOptions,
    pub(super) handler: Option<Arc<dyn ResourceEventHandler>>,
}

pub struct InformerBuilder {
    config: InformerConfig,
    remote: Arc<dyn RemoteStore>,
    collections: Vec<CollectionEntry>,
    error: Option<LifecycleError>,
}

impl InformerBuilder {
    pub fn new(
        config: InformerConfig,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            config,
            remote,
            collections: Vec::new(),
            error: None,
        }
    }

    /// Loads configuration from the default sources (see [`InformerConfig::new`]).
    pub fn from_env(remote: Arc<dyn RemoteStore>) -> Result<Self> {
        let config = InformerConfig::new()?;
        Ok(Self::new(config, remote))
    }

    pub fn watch(
        self,
        kind: ResourceKind,
    ) -> Self {
        self.watch_with_options(kind, ListOptions::default())
    }

    pub fn watch_with_selector(
        self,
        kind: ResourceKind,
        selector: LabelSelector,
    ) -> Self {
        self.watch_with_options(kind, ListOptions::with_selector(selector))
    }

    pub fn watch_with_options(
        mut self,
        kind: ResourceKind,
        options: ListOptions,
    ) -> Self {
        if self.collections.iter().any(|c| c.kind == kind) {
            self.record(LifecycleError::DuplicateCollection(kind));
            return self;
        }
        self.collections.push(CollectionEntry {
            kind,
            options,
            handler: None,
        });
        self
    }

    /// Attaches the event handler of an already watched collection.
    pub fn handler(
        self,
        kind: ResourceKind,
        handler: impl ResourceEventHandler,
    ) -> Self {
        self.shared_handler(kind, Arc::new(handler))
    }

    pub fn shared_handler(
        mut self,
        kind: ResourceKind,
        handler: Arc<dyn ResourceEventHandler>,
    ) -> Self {
        match self.collections.iter_mut().find(|c| c.kind == kind) {
            None => self.record(LifecycleError::UnknownCollection(kind)),
            Some(c) if c.handler.is_some() => self.record(LifecycleError::DuplicateHandler(kind)),
            Some(c) => c.handler = Some(handler),
        }
        self
    }

    pub fn build(self) -> Result<Informer> {
        if let Some(e) = self.error {
            return Err(e.into());
        }
        if self.collections.is_empty() {
            return Err(LifecycleError::NoCollections.into());
        }
        let config = self.config.validate()?;

        info!(
            collections = ?self.collections.iter().map(|c| c.kind).collect::<Vec<_>>(),
            ?config,
            "informer assembled"
        );
        Ok(Informer::new(config, self.remote, self.collections))
    }

    fn record(
        &mut self,
        error: LifecycleError,
    ) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}
