//! Entity serialization and deserialization.
//!
//! A serialized form is a JSON object carrying `id`, a `type` tag (for
//! polymorphic deserialization), and the entity's declared fields. Entity
//! references are represented as bare id strings; in recursive mode the
//! referenced entity's own form is registered into the entry table, so a
//! shared reference is inlined exactly once and cycles terminate.

use crate::store::{Entry, EntryMap};
use crate::{StoreError, StoreResult};
use kiln_model::{Entity, FieldValue, SharedEntity, TypeRegistry};
use kiln_types::{EntityId, FieldKind};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::warn;

/// A plain, JSON-safe value tree describing one entity.
pub type SerializedForm = Value;

/// Key carrying the entity id in a serialized form.
pub const FORM_ID: &str = "id";

/// Key carrying the originating type name in a serialized form.
pub const FORM_TYPE: &str = "type";

/// Extracts the id from a serialized form.
///
/// A form without a parseable `id` is a structural error
/// ([`StoreError::MissingIdentity`]).
pub fn form_id(form: &SerializedForm) -> StoreResult<EntityId> {
    form.get(FORM_ID)
        .and_then(Value::as_str)
        .and_then(|s| EntityId::parse(s).ok())
        .ok_or(StoreError::MissingIdentity)
}

/// Returns the form's type tag, if present.
#[must_use]
pub fn form_type(form: &SerializedForm) -> Option<&str> {
    form.get(FORM_TYPE).and_then(Value::as_str)
}

fn form_header(entity: &Entity) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(FORM_ID.into(), Value::String(entity.id().to_string()));
    map.insert(FORM_TYPE.into(), Value::String(entity.type_name().into()));
    map
}

fn id_value(entity: &SharedEntity) -> Value {
    Value::String(entity.borrow().id().to_string())
}

/// Serializes an entity shallowly: declared fields only, primitives by
/// value, entity references as bare id strings (foreign keys). Does not
/// descend into referenced entities.
#[must_use]
pub fn serialize(registry: &TypeRegistry, entity: &Entity) -> SerializedForm {
    let mut map = form_header(entity);
    for decl in registry.fields_of(entity.type_name()) {
        let Some(value) = entity.field(&decl.name) else {
            continue;
        };
        let json = match value {
            FieldValue::Primitive(v) => v.clone(),
            FieldValue::Ref(r) => r.as_ref().map_or(Value::Null, id_value),
            FieldValue::List(l) => Value::Array(l.iter().map(id_value).collect()),
            FieldValue::Map(m) => {
                Value::Object(m.iter().map(|(k, v)| (k.clone(), id_value(v))).collect())
            }
        };
        map.insert(decl.name.clone(), json);
    }
    Value::Object(map)
}

/// Serializes an entity and, recursively, every entity reachable from it.
///
/// Each visited entity's form is registered into `entries` (both halves:
/// the form and the live instance), keyed by id, while the referencing
/// field itself carries only the id. An already-visited id is emitted as
/// its id without descending again — this is what makes shared references
/// serialize once and cyclic graphs terminate.
///
/// Returns the root entity's form; the root is registered in `entries` too.
pub fn serialize_graph(
    registry: &TypeRegistry,
    entity: &SharedEntity,
    entries: &mut EntryMap,
) -> SerializedForm {
    let mut walk = GraphWalk {
        registry,
        entries,
        visited: BTreeSet::new(),
    };
    let root_id = walk.visit(entity);
    entries
        .get(&root_id)
        .and_then(|e| e.serialized.clone())
        .unwrap_or(Value::Null)
}

struct GraphWalk<'a> {
    registry: &'a TypeRegistry,
    entries: &'a mut EntryMap,
    visited: BTreeSet<EntityId>,
}

impl GraphWalk<'_> {
    /// Serializes one entity into the entry table and returns its id.
    fn visit(&mut self, entity: &SharedEntity) -> EntityId {
        let id = entity.borrow().id();
        if !self.visited.insert(id) {
            // Already serialized (or mid-serialization on a cycle).
            return id;
        }

        let mut map;
        {
            let e = entity.borrow();
            map = form_header(&e);
            for decl in self.registry.fields_of(e.type_name()) {
                let Some(value) = e.field(&decl.name) else {
                    continue;
                };
                let json = match value {
                    FieldValue::Primitive(v) => v.clone(),
                    FieldValue::Ref(None) => Value::Null,
                    FieldValue::Ref(Some(child)) => {
                        Value::String(self.visit(child).to_string())
                    }
                    FieldValue::List(l) => {
                        let mut items = Vec::with_capacity(l.len());
                        for child in l {
                            items.push(Value::String(self.visit(child).to_string()));
                        }
                        Value::Array(items)
                    }
                    FieldValue::Map(m) => {
                        let mut object = Map::new();
                        for (key, child) in m {
                            object
                                .insert(key.clone(), Value::String(self.visit(child).to_string()));
                        }
                        Value::Object(object)
                    }
                };
                map.insert(decl.name.clone(), json);
            }
        }

        let entry = self.entries.entry(id).or_insert_with(Entry::empty);
        entry.instance = Some(entity.clone());
        entry.serialized = Some(Value::Object(map));
        id
    }
}

fn resolve_type<'a>(
    registry: &TypeRegistry,
    form: &'a SerializedForm,
    expected_type: &'a str,
) -> &'a str {
    // The form's tag wins when it names a registered type; otherwise fall
    // back to the statically expected type.
    match form_type(form) {
        Some(tag) if registry.contains(tag) => tag,
        _ => expected_type,
    }
}

/// Reads the id a reference field carries, accepting both bare id strings
/// and inline objects with an `id` key.
fn ref_id(raw: &Value) -> Option<EntityId> {
    match raw {
        Value::String(s) => EntityId::parse(s).ok(),
        Value::Object(_) => form_id(raw).ok(),
        _ => None,
    }
}

/// Constructs an entity from its serialized form.
///
/// If a live instance already exists in `entries` for the form's id, it is
/// returned unchanged — repeated deserialization of the same graph yields
/// the same instances. Otherwise the concrete type is resolved from the
/// form's type tag (falling back to `expected_type`), the instance is
/// registered in `entries` *before* its fields are filled (so cyclic graphs
/// rehydrate), and each declared field is pulled from the form.
pub fn deserialize(
    registry: &TypeRegistry,
    form: &SerializedForm,
    expected_type: &str,
    entries: &mut EntryMap,
    recursive: bool,
) -> StoreResult<SharedEntity> {
    let id = form_id(form)?;

    if let Some(instance) = entries.get(&id).and_then(|e| e.instance.clone()) {
        return Ok(instance);
    }

    let type_name = resolve_type(registry, form, expected_type).to_string();
    let instance = Entity::new(&type_name, Some(id)).into_shared();
    entries.entry(id).or_insert_with(Entry::empty).instance = Some(instance.clone());

    deserialize_into(registry, form, &instance, entries, recursive)?;
    Ok(instance)
}

/// Extracts a form's declared field values into an existing instance,
/// in place.
///
/// In non-recursive mode reference fields are reference-preserving: an
/// existing sub-entity whose id matches the incoming id is left untouched;
/// on mismatch the field collapses to an empty reference and resolution
/// happens lazily on the next `get`. Fields absent from the form are left
/// as they are.
pub fn deserialize_into(
    registry: &TypeRegistry,
    form: &SerializedForm,
    instance: &SharedEntity,
    entries: &mut EntryMap,
    recursive: bool,
) -> StoreResult<()> {
    let type_name = instance.borrow().type_name().to_string();

    for decl in registry.fields_of(&type_name) {
        let Some(raw) = form.get(&decl.name) else {
            continue;
        };
        let value = match decl.kind {
            FieldKind::Primitive => FieldValue::Primitive(raw.clone()),
            FieldKind::EntityRef => {
                if recursive {
                    FieldValue::Ref(resolve_ref(
                        registry,
                        raw,
                        decl.element_type.as_deref(),
                        entries,
                    )?)
                } else {
                    FieldValue::Ref(preserve_existing(instance, &decl.name, raw))
                }
            }
            FieldKind::OrderedList => {
                let mut items = Vec::new();
                if let Value::Array(elements) = raw {
                    for element in elements {
                        let resolved = if recursive {
                            resolve_ref(registry, element, decl.element_type.as_deref(), entries)?
                        } else {
                            preserve_listed(instance, &decl.name, element)
                        };
                        if let Some(entity) = resolved {
                            items.push(entity);
                        }
                    }
                }
                FieldValue::List(items)
            }
            FieldKind::KeyedMap => {
                let mut map = std::collections::BTreeMap::new();
                if let Value::Object(object) = raw {
                    for (key, element) in object {
                        let resolved = if recursive {
                            resolve_ref(registry, element, decl.element_type.as_deref(), entries)?
                        } else {
                            preserve_listed(instance, &decl.name, element)
                        };
                        if let Some(entity) = resolved {
                            map.insert(key.clone(), entity);
                        }
                    }
                }
                FieldValue::Map(map)
            }
        };
        instance.borrow_mut().set_field(&decl.name, value);
    }

    Ok(())
}

/// Resolves a reference field's value to a live instance, rehydrating a
/// latent entry when needed. An id with no matching entry resolves to
/// `None` rather than erroring.
fn resolve_ref(
    registry: &TypeRegistry,
    raw: &Value,
    element_type: Option<&str>,
    entries: &mut EntryMap,
) -> StoreResult<Option<SharedEntity>> {
    if raw.is_null() {
        return Ok(None);
    }
    let Some(id) = ref_id(raw) else {
        warn!(value = %raw, "reference field does not carry an entity id");
        return Ok(None);
    };

    if let Some(instance) = entries.get(&id).and_then(|e| e.instance.clone()) {
        return Ok(Some(instance));
    }

    // Latent: the form is either inlined in the tree or in the entry table.
    let form = match raw {
        Value::Object(_) => Some(raw.clone()),
        _ => entries.get(&id).and_then(|e| e.serialized.clone()),
    };
    match form {
        Some(form) => {
            let expected = element_type.unwrap_or_default();
            deserialize(registry, &form, expected, entries, true).map(Some)
        }
        None => {
            warn!(%id, "unresolved entity reference");
            Ok(None)
        }
    }
}

/// Non-recursive single-reference policy: keep the existing sub-entity when
/// ids match, otherwise collapse to `None`.
fn preserve_existing(instance: &SharedEntity, field: &str, raw: &Value) -> Option<SharedEntity> {
    let incoming = ref_id(raw)?;
    let existing = instance.borrow().field(field)?.as_entity()?.clone();
    let existing_id = existing.borrow().id();
    (existing_id == incoming).then_some(existing)
}

/// Non-recursive collection policy: keep any element of the current value
/// whose id matches the incoming one, drop the rest.
fn preserve_listed(instance: &SharedEntity, field: &str, raw: &Value) -> Option<SharedEntity> {
    let incoming = ref_id(raw)?;
    let entity = instance.borrow();
    let current = entity.field(field)?;
    current
        .referenced()
        .into_iter()
        .find(|e| e.borrow().id() == incoming)
}

/// Collects the entity ids a form's declared reference fields carry.
/// Used by mark-and-sweep to keep latent children of live documents.
pub(crate) fn form_ref_ids(registry: &TypeRegistry, form: &SerializedForm) -> Vec<EntityId> {
    let Some(type_name) = form_type(form) else {
        return Vec::new();
    };
    let mut ids = Vec::new();
    for decl in registry.fields_of(type_name) {
        let Some(raw) = form.get(&decl.name) else {
            continue;
        };
        match decl.kind {
            FieldKind::Primitive => {}
            FieldKind::EntityRef => ids.extend(ref_id(raw)),
            FieldKind::OrderedList => {
                if let Value::Array(elements) = raw {
                    ids.extend(elements.iter().filter_map(ref_id));
                }
            }
            FieldKind::KeyedMap => {
                if let Value::Object(object) = raw {
                    ids.extend(object.values().filter_map(ref_id));
                }
            }
        }
    }
    ids
}
