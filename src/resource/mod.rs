//! Typed resource payloads for the closed set of watched kinds.
//!
//! The remote store hands back one of these variants; the kind is decided
//! once, when the watcher receives the object, and every later stage works on
//! the typed [`Resource`] enum.

mod selector;

pub use selector::*;


use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Closed set of resource kinds the informer can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Pod,
    ConfigMap,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Pod, ResourceKind::ConfigMap];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "Pod",
            ResourceKind::ConfigMap => "ConfigMap",
        }
    }

    /// Dense index used by fixed-size per-kind tables.
    pub(crate) fn index(&self) -> usize {
        match self {
            ResourceKind::Pod => 0,
            ResourceKind::ConfigMap => 1,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote-assigned, monotonically increasing version token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersion(pub u64);

impl fmt::Display for ResourceVersion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of an entity inside its collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(
        kind: ResourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub resource_version: ResourceVersion,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub phase: PodPhase,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMap {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// A watched object, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    Pod(Pod),
    ConfigMap(ConfigMap),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Pod(_) => ResourceKind::Pod,
            Resource::ConfigMap(_) => ResourceKind::ConfigMap,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Resource::Pod(p) => &p.metadata,
            Resource::ConfigMap(c) => &c.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Resource::Pod(p) => &mut p.metadata,
            Resource::ConfigMap(c) => &mut c.metadata,
        }
    }

    pub fn key(&self) -> ResourceKey {
        let meta = self.metadata();
        ResourceKey::new(self.kind(), meta.namespace.clone(), meta.name.clone())
    }

    pub fn version(&self) -> ResourceVersion {
        self.metadata().resource_version
    }

    pub fn namespace(&self) -> &str {
        &self.metadata().namespace
    }

    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.metadata().labels
    }

    pub fn as_pod(&self) -> Option<&Pod> {
        match self {
            Resource::Pod(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_config_map(&self) -> Option<&ConfigMap> {
        match self {
            Resource::ConfigMap(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Pod> for Resource {
    fn from(pod: Pod) -> Self {
        Resource::Pod(pod)
    }
}

impl From<ConfigMap> for Resource {
    fn from(cm: ConfigMap) -> Self {
        Resource::ConfigMap(cm)
    }
}
