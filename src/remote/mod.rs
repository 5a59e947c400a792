//! Remote store collaborator.
//!
//! Anything that can hand out a versioned snapshot of a collection and a
//! change stream resumable from a version can back an informer.

mod memory;

pub use memory::*;


use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;

use async_trait::async_trait;

use crate::ListOptions;
use crate::Resource;
use crate::ResourceKind;
use crate::ResourceVersion;
use crate::WatchError;

/// Full snapshot of a collection at `version`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub items: Vec<Resource>,
    pub version: ResourceVersion,
}

/// One notification from a change stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(Resource),
    Modified(Resource),
    Deleted(Resource),
    /// Progress marker: everything up to this version has been delivered.
    Bookmark(ResourceVersion),
}

impl WatchEvent {
    pub fn version(&self) -> ResourceVersion {
        match self {
            WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => o.version(),
            WatchEvent::Bookmark(v) => *v,
        }
    }

    pub fn object(&self) -> Option<&Resource> {
        match self {
            WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => Some(o),
            WatchEvent::Bookmark(_) => None,
        }
    }
}

pub type WatchStream = BoxStream<'static, std::result::Result<WatchEvent, WatchError>>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Fetches every object of `kind` matching `options`.
    async fn list(
        &self,
        kind: ResourceKind,
        options: &ListOptions,
    ) -> std::result::Result<Listing, WatchError>;

    /// Opens a change stream delivering events strictly newer than `since`.
    ///
    /// Fails with [`WatchError::Expired`] when `since` can no longer be
    /// resumed from; the stream itself may also end with that error.
    async fn watch(
        &self,
        kind: ResourceKind,
        options: &ListOptions,
        since: ResourceVersion,
    ) -> std::result::Result<WatchStream, WatchError>;
}
