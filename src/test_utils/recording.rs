use std::sync::Arc;

use parking_lot::Mutex;

use crate::DeltaType;
use crate::HandlerResult;
use crate::Resource;
use crate::ResourceEventHandler;
use crate::ResourceKey;

/// Handler that remembers every callback, in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<(DeltaType, ResourceKey)>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(DeltaType, ResourceKey)> {
        self.events.lock().clone()
    }

    pub fn count(
        &self,
        event: DeltaType,
    ) -> usize {
        self.events.lock().iter().filter(|(e, _)| *e == event).count()
    }

    fn record(
        &self,
        event: DeltaType,
        object: &Resource,
    ) {
        self.events.lock().push((event, object.key()));
    }
}

impl ResourceEventHandler for RecordingHandler {
    fn on_add(
        &self,
        object: &Resource,
    ) -> HandlerResult {
        self.record(DeltaType::Add, object);
        Ok(())
    }

    fn on_update(
        &self,
        _old: &Resource,
        new: &Resource,
    ) -> HandlerResult {
        self.record(DeltaType::Update, new);
        Ok(())
    }

    fn on_delete(
        &self,
        object: &Resource,
    ) -> HandlerResult {
        self.record(DeltaType::Delete, object);
        Ok(())
    }
}
