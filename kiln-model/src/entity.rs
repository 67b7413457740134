//! The live entity record.

use kiln_types::EntityId;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Shared handle to a live entity.
///
/// The model graph is single-threaded and cooperatively scheduled, so shared
/// mutable entities use `Rc<RefCell<_>>` rather than any locking discipline.
/// Two fields holding the same handle reference the same logical record.
pub type SharedEntity = Rc<RefCell<Entity>>;

/// The value stored in one entity field.
///
/// The variant is fixed by the field's declaration, so graph walks branch on
/// the tag and never inspect values to decide whether they are references.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Any JSON-safe value tree, copied by value during serialization.
    Primitive(serde_json::Value),
    /// A nullable reference to another entity.
    Ref(Option<SharedEntity>),
    /// An ordered list of entity references.
    List(Vec<SharedEntity>),
    /// A string-keyed map of entity references.
    Map(BTreeMap<String, SharedEntity>),
}

impl FieldValue {
    /// Returns the primitive value, if this is a `Primitive` field.
    #[must_use]
    pub fn as_primitive(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Primitive(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the referenced entity, if this is a non-empty `Ref` field.
    #[must_use]
    pub fn as_entity(&self) -> Option<&SharedEntity> {
        match self {
            Self::Ref(r) => r.as_ref(),
            _ => None,
        }
    }

    /// Returns the list elements, if this is a `List` field.
    #[must_use]
    pub fn as_list(&self) -> Option<&[SharedEntity]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the map entries, if this is a `Map` field.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, SharedEntity>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Every entity handle held by this value, in stable order.
    pub fn referenced(&self) -> Vec<SharedEntity> {
        match self {
            Self::Primitive(_) => Vec::new(),
            Self::Ref(r) => r.iter().cloned().collect(),
            Self::List(l) => l.clone(),
            Self::Map(m) => m.values().cloned().collect(),
        }
    }
}

/// A uniquely identified, mutable record.
///
/// The id is assigned at construction and immutable afterwards. Declared
/// fields (per the type's registry entry) live in `fields` and participate
/// in serialization; anything in `transient` is private runtime state —
/// never persisted or diffed, but still walked by mark-and-sweep so that
/// runtime-only references keep their targets alive.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    type_name: String,
    retained: bool,
    fields: BTreeMap<String, FieldValue>,
    transient: BTreeMap<String, FieldValue>,
}

impl Entity {
    /// Constructs an entity of the given type, generating an id when none
    /// is supplied.
    #[must_use]
    pub fn new(type_name: &str, id: Option<EntityId>) -> Self {
        Self {
            id: id.unwrap_or_default(),
            type_name: type_name.into(),
            retained: false,
            fields: BTreeMap::new(),
            transient: BTreeMap::new(),
        }
    }

    /// Wraps the entity in a shared handle.
    #[must_use]
    pub fn into_shared(self) -> SharedEntity {
        Rc::new(RefCell::new(self))
    }

    /// The entity's unique identifier.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The registered type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether this entity is a reclamation root.
    #[must_use]
    pub fn retained(&self) -> bool {
        self.retained
    }

    /// Marks or unmarks this entity as a reclamation root. Retained
    /// entities are never reclaimed regardless of reachability.
    pub fn set_retained(&mut self, retained: bool) {
        self.retained = retained;
    }

    /// Returns a declared field's current value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Sets a declared field.
    pub fn set_field(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Removes a declared field, returning its previous value.
    pub fn clear_field(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    /// Iterates declared fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns a transient (undeclared) field's value.
    #[must_use]
    pub fn transient(&self, name: &str) -> Option<&FieldValue> {
        self.transient.get(name)
    }

    /// Sets a transient field. Transient state is never serialized.
    pub fn set_transient(&mut self, name: &str, value: FieldValue) {
        self.transient.insert(name.into(), value);
    }

    /// Iterates transient fields in name order.
    pub fn transients(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.transient.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every entity handle reachable through this entity's declared and
    /// transient fields, in stable order. Used by mark-and-sweep.
    pub fn referenced(&self) -> Vec<SharedEntity> {
        let mut out = Vec::new();
        for (_, value) in self.fields().chain(self.transients()) {
            out.extend(value.referenced());
        }
        out
    }
}
