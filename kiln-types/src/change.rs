//! Change-notification events.
//!
//! Every observed mutation of a live entity produces one [`ChangeEvent`].
//! The commit pipeline consumes the stream, coalescing all events that occur
//! within one logical turn into a single history transaction. The stream is
//! ordered and not replayable.

use crate::EntityId;
use serde::{Deserialize, Serialize};

/// The kind of value a declared field holds.
///
/// Decided once at field-declaration time so graph traversal branches on a
/// tag instead of inspecting values at runtime. `Primitive` covers any
/// JSON-safe value tree (including plain arrays and objects); the other
/// three kinds hold entity references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A JSON-safe value copied by value during serialization.
    Primitive,
    /// A reference to another entity (serialized as its id).
    EntityRef,
    /// An ordered list of entity references (order preserved).
    OrderedList,
    /// A string-keyed map of entity references (key identity preserved).
    KeyedMap,
}

/// A single mutation observed on a live entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The mutated entity.
    pub entity_id: EntityId,
    /// Name of the mutated field.
    pub field: String,
    /// Declared kind of the mutated field.
    pub kind: FieldKind,
    /// The new value, as it would appear in the serialized form.
    /// Entity references are carried as id strings.
    pub new_value: Option<serde_json::Value>,
}

impl ChangeEvent {
    /// Creates a change event for a field mutation.
    #[must_use]
    pub fn new(entity_id: EntityId, field: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            entity_id,
            field: field.into(),
            kind,
            new_value: None,
        }
    }

    /// Attaches the new value to the event.
    #[must_use]
    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.new_value = Some(value);
        self
    }
}
