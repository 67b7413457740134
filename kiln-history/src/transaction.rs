//! The history item recorded once per committed turn.

use kiln_types::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The before/after snapshots of every entity that changed within one
/// committed turn. Immutable once committed.
///
/// Applying `after` reproduces the post-mutation state exactly; applying
/// `before` reproduces the pre-mutation state. A `before` of `None` means
/// the entity did not exist prior to the turn — undoing removes it rather
/// than restoring an empty record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Serialized form of each changed entity prior to the turn.
    pub before: BTreeMap<EntityId, Option<Value>>,
    /// Serialized form of each changed entity after the turn.
    pub after: BTreeMap<EntityId, Value>,
}

impl Transaction {
    /// An empty transaction, to be filled by the commit pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one entity's snapshots.
    pub fn record(&mut self, id: EntityId, before: Option<Value>, after: Value) {
        self.before.insert(id, before);
        self.after.insert(id, after);
    }

    /// Whether the transaction covers any entity at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    /// Number of entities the transaction covers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.after.len()
    }
}
