use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::Resource;
use crate::ResourceKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeltaType {
    Add,
    Update,
    Delete,
}

impl DeltaType {
    pub const ALL: [DeltaType; 3] = [DeltaType::Add, DeltaType::Update, DeltaType::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaType::Add => "add",
            DeltaType::Update => "update",
            DeltaType::Delete => "delete",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            DeltaType::Add => 0,
            DeltaType::Update => 1,
            DeltaType::Delete => 2,
        }
    }
}

impl fmt::Display for DeltaType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed state transition of a single key.
///
/// `new` is set for Add and Update, `old` for Update and Delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub key: ResourceKey,
    pub kind: DeltaType,
    pub new: Option<Resource>,
    pub old: Option<Resource>,
}

impl Delta {
    pub fn add(object: Resource) -> Self {
        Self {
            key: object.key(),
            kind: DeltaType::Add,
            new: Some(object),
            old: None,
        }
    }

    pub fn update(
        old: Resource,
        new: Resource,
    ) -> Self {
        Self {
            key: new.key(),
            kind: DeltaType::Update,
            new: Some(new),
            old: Some(old),
        }
    }

    pub fn delete(old: Resource) -> Self {
        Self {
            key: old.key(),
            kind: DeltaType::Delete,
            new: None,
            old: Some(old),
        }
    }

    /// Folds `incoming` into this still-buffered delta for the same key.
    ///
    /// Returns `None` when the pair cancels out (Add followed by Delete).
    pub(crate) fn coalesce(
        self,
        incoming: Delta,
    ) -> Option<Delta> {
        debug_assert_eq!(self.key, incoming.key);
        let key = self.key;
        let merged = match (self.kind, incoming.kind) {
            (DeltaType::Add, DeltaType::Delete) => return None,
            (DeltaType::Add, DeltaType::Add | DeltaType::Update) => Delta {
                key,
                kind: DeltaType::Add,
                new: incoming.new,
                old: None,
            },
            (DeltaType::Update, DeltaType::Add | DeltaType::Update) => Delta {
                key,
                kind: DeltaType::Update,
                new: incoming.new,
                old: self.old,
            },
            (DeltaType::Update, DeltaType::Delete) => Delta {
                key,
                kind: DeltaType::Delete,
                new: None,
                old: self.old,
            },
            // The consumer never saw the key disappear
            (DeltaType::Delete, DeltaType::Add | DeltaType::Update) => Delta {
                key,
                kind: DeltaType::Update,
                new: incoming.new,
                old: self.old,
            },
            (DeltaType::Delete, DeltaType::Delete) => Delta {
                key,
                kind: DeltaType::Delete,
                new: None,
                old: self.old,
            },
        };
        Some(merged)
    }
}
