//! Local mirror of one collection.
//!
//! Reads are lock-protected per shard and never wait on the dispatcher.
//! Writes are crate-private: only the [`crate::EventDispatcher`] mutates a
//! store.

use dashmap::DashMap;

use crate::Resource;
use crate::ResourceKey;
use crate::ResourceKind;

#[derive(Debug)]
pub struct Store {
    kind: ResourceKind,
    entries: DashMap<ResourceKey, Resource>,
}

impl Store {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn get(
        &self,
        key: &ResourceKey,
    ) -> Option<Resource> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn get_by_name(
        &self,
        namespace: &str,
        name: &str,
    ) -> Option<Resource> {
        self.get(&ResourceKey::new(self.kind, namespace, name))
    }

    pub fn contains(
        &self,
        key: &ResourceKey,
    ) -> bool {
        self.entries.contains_key(key)
    }

    /// Snapshot of every object, in no particular order.
    pub fn list(&self) -> Vec<Resource> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    pub fn list_namespace(
        &self,
        namespace: &str,
    ) -> Vec<Resource> {
        self.entries
            .iter()
            .filter(|e| e.key().namespace == namespace)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or replaces, returning the previous object.
    pub(crate) fn upsert(
        &self,
        object: Resource,
    ) -> Option<Resource> {
        self.entries.insert(object.key(), object)
    }

    pub(crate) fn remove(
        &self,
        key: &ResourceKey,
    ) -> Option<Resource> {
        self.entries.remove(key).map(|(_, v)| v)
    }
}
