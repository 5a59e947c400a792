//! Informer Error Hierarchy
//!
//! Remote failures are classified once, at the watcher boundary, into the
//! three outcomes the watcher acts on: retry with backoff, relist, or shut
//! the whole informer down.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

use crate::ResourceKind;
use crate::ResourceVersion;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Remote list/watch failures that escaped the watcher's retry loop
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Informer assembly and lifecycle misuse
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Background task panicked or was aborted
    #[error("Background task failed: {0}")]
    Join(#[from] JoinError),
}

/// Failures returned by a [`crate::RemoteStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    /// The remote store can no longer resume from the given version
    #[error("Resume point {version} expired")]
    Expired { version: ResourceVersion },

    /// Network blip, throttling, temporary unavailability
    #[error("Transient remote error: {0}")]
    Transient(String),

    /// A list or watch call did not answer in time
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The collection identity is unknown to the remote store
    #[error("Invalid collection: {0}")]
    InvalidCollection(String),

    /// The remote store returned an object outside the watched collection
    #[error("Collection {expected} received object of kind {actual}")]
    KindMismatch {
        expected: ResourceKind,
        actual: ResourceKind,
    },

    /// Retry policy exhaustion
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: usize, last: String },
}

impl WatchError {
    /// Fatal errors are never retried and shut the informer down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WatchError::Unauthorized(_)
                | WatchError::Forbidden(_)
                | WatchError::InvalidCollection(_)
                | WatchError::KindMismatch { .. }
                | WatchError::RetriesExhausted { .. }
        )
    }

    /// Expired resume points are answered with a relist.
    pub fn is_expired(&self) -> bool {
        matches!(self, WatchError::Expired { .. })
    }

    /// Short label used for the watch restart metric.
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            WatchError::Expired { .. } => "expired",
            WatchError::Transient(_) => "transient",
            WatchError::Timeout(_) => "timeout",
            WatchError::Unauthorized(_) => "unauthorized",
            WatchError::Forbidden(_) => "forbidden",
            WatchError::InvalidCollection(_) => "invalid_collection",
            WatchError::KindMismatch { .. } => "kind_mismatch",
            WatchError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Informer already started")]
    AlreadyStarted,

    #[error("Informer has not been started")]
    NotStarted,

    #[error("Informer needs at least one collection")]
    NoCollections,

    #[error("Collection {0} registered twice")]
    DuplicateCollection(ResourceKind),

    #[error("Collection {0} already has a handler")]
    DuplicateHandler(ResourceKind),

    #[error("Collection {0} is not watched")]
    UnknownCollection(ResourceKind),
}

/// Handler failures are counted and logged by the dispatcher; they never
/// escape as an [`Error`].
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Handler returned an error
    #[error("Handler failed: {0}")]
    Failed(String),

    /// Handler panicked; the payload is rendered when it is a string
    #[error("Handler panicked: {0}")]
    Panicked(String),
}
