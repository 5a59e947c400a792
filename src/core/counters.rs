use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use super::DeltaType;
use crate::ResourceKind;

const KINDS: usize = ResourceKind::ALL.len();
const EVENTS: usize = DeltaType::ALL.len();

type Table = [[AtomicU64; EVENTS]; KINDS];

/// Per `(kind, event)` totals of dispatched events and handler failures.
///
/// Only dispatchers increment; everyone else reads.
#[derive(Debug, Default)]
pub struct Counters {
    events: Table,
    handler_failures: Table,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_event(
        &self,
        kind: ResourceKind,
        event: DeltaType,
    ) -> u64 {
        self.events[kind.index()][event.index()].fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn record_handler_failure(
        &self,
        kind: ResourceKind,
        event: DeltaType,
    ) {
        self.handler_failures[kind.index()][event.index()].fetch_add(1, Ordering::AcqRel);
    }

    pub fn get(
        &self,
        kind: ResourceKind,
        event: DeltaType,
    ) -> u64 {
        self.events[kind.index()][event.index()].load(Ordering::Acquire)
    }

    pub fn handler_failures(
        &self,
        kind: ResourceKind,
        event: DeltaType,
    ) -> u64 {
        self.handler_failures[kind.index()][event.index()].load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let mut events = BTreeMap::new();
        let mut handler_failures = BTreeMap::new();
        for kind in ResourceKind::ALL {
            for event in DeltaType::ALL {
                events.insert((kind, event), self.get(kind, event));
                handler_failures.insert((kind, event), self.handler_failures(kind, event));
            }
        }
        CounterSnapshot {
            events,
            handler_failures,
        }
    }
}

/// Point-in-time copy of [`Counters`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub events: BTreeMap<(ResourceKind, DeltaType), u64>,
    pub handler_failures: BTreeMap<(ResourceKind, DeltaType), u64>,
}

impl CounterSnapshot {
    pub fn get(
        &self,
        kind: ResourceKind,
        event: DeltaType,
    ) -> u64 {
        self.events.get(&(kind, event)).copied().unwrap_or(0)
    }

    /// `adds - deletes` for `kind`; equals the store size once dispatch is quiescent.
    pub fn balance(
        &self,
        kind: ResourceKind,
    ) -> i64 {
        self.get(kind, DeltaType::Add) as i64 - self.get(kind, DeltaType::Delete) as i64
    }
}
