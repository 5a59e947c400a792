//! Applies deltas to the local store and fans them out to the handler.
//!
//! One dispatcher per collection, so store mutations and handler calls for a
//! collection happen strictly in delta order. The delta kind is re-derived
//! from what the store actually holds: consumers always see Add before any
//! Update of a key and never see a Delete for a key they were not told about.

use std::any::Any;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Counters;
use super::Delta;
use super::DeltaQueue;
use super::DeltaType;
use super::ResourceEventHandler;
use super::Store;
use crate::metrics::EVENTS_DISPATCHED;
use crate::metrics::HANDLER_FAILURES;
use crate::HandlerError;
use crate::Resource;
use crate::ResourceKind;
use crate::Result;

/// Store transition actually performed for one delta.
#[derive(Debug)]
enum Applied {
    Added(Resource),
    Updated { old: Resource, new: Resource },
    Deleted(Resource),
}

impl Applied {
    fn event_type(&self) -> DeltaType {
        match self {
            Applied::Added(_) => DeltaType::Add,
            Applied::Updated { .. } => DeltaType::Update,
            Applied::Deleted(_) => DeltaType::Delete,
        }
    }
}

pub struct EventDispatcher {
    kind: ResourceKind,
    queue: Arc<DeltaQueue>,
    store: Arc<Store>,
    counters: Arc<Counters>,
    handler: Option<Arc<dyn ResourceEventHandler>>,
}

impl EventDispatcher {
    pub fn new(
        queue: Arc<DeltaQueue>,
        store: Arc<Store>,
        counters: Arc<Counters>,
        handler: Option<Arc<dyn ResourceEventHandler>>,
    ) -> Self {
        Self {
            kind: queue.kind(),
            queue,
            store,
            counters,
            handler,
        }
    }

    /// Drains the queue until it is closed or `cancel` fires and nothing
    /// buffered is left.
    pub async fn run(
        self,
        cancel: CancellationToken,
    ) -> Result<()> {
        info!(kind = %self.kind, handler = self.handler.is_some(), "dispatcher started");

        let mut dispatched = 0u64;
        while let Some(delta) = self.queue.pop(&cancel).await {
            if self.process(delta).is_some() {
                dispatched += 1;
            }
        }

        info!(kind = %self.kind, dispatched, "dispatcher stopped");
        Ok(())
    }

    /// Applies one delta; returns the event type delivered, if any.
    pub(crate) fn process(
        &self,
        delta: Delta,
    ) -> Option<DeltaType> {
        let Delta { key, kind, new, old } = delta;

        let applied = match kind {
            DeltaType::Add | DeltaType::Update => {
                let Some(new) = new else {
                    warn!(%key, %kind, "delta without object dropped");
                    return None;
                };
                match self.store.upsert(new.clone()) {
                    None => Applied::Added(new),
                    Some(previous) => Applied::Updated {
                        old: old.unwrap_or(previous),
                        new,
                    },
                }
            }
            DeltaType::Delete => match self.store.remove(&key) {
                Some(previous) => Applied::Deleted(old.unwrap_or(previous)),
                None => {
                    debug!(%key, "delete for absent key ignored");
                    return None;
                }
            },
        };

        let event = applied.event_type();
        let total = self.counters.record_event(self.kind, event);
        EVENTS_DISPATCHED.with_label_values(&[self.kind.as_str(), event.as_str()]).inc();
        trace!(%key, %event, total, "delta applied");

        if let Some(handler) = &self.handler {
            if let Err(e) = invoke(handler.as_ref(), &applied) {
                self.counters.record_handler_failure(self.kind, event);
                HANDLER_FAILURES.with_label_values(&[self.kind.as_str(), event.as_str()]).inc();
                error!(%key, %event, "handler failed: {e}");
            }
        }
        Some(event)
    }
}

/// Calls the matching callback; a panic is turned into an error.
fn invoke(
    handler: &dyn ResourceEventHandler,
    applied: &Applied,
) -> std::result::Result<(), HandlerError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match applied {
        Applied::Added(object) => handler.on_add(object),
        Applied::Updated { old, new } => handler.on_update(old, new),
        Applied::Deleted(object) => handler.on_delete(object),
    }));

    match outcome {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
