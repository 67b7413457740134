//! The entry table.
//!
//! Maps entity ids to `{serialized form, live instance}` entries, supports
//! rehydration of latent entries, mark-and-sweep reclamation of entries
//! unreachable from any retained root, and whole-blob persistence through a
//! [`PersistenceSink`](crate::PersistenceSink).

use crate::serialize::{
    deserialize, deserialize_into, form_id, form_ref_ids, serialize, serialize_graph,
    SerializedForm,
};
use crate::{PersistenceSink, StoreResult};
use kiln_model::{Entity, SharedEntity, TypeRegistry};
use kiln_types::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;
use tracing::{debug, warn};

/// One entry of the table.
///
/// An entry with a live `instance` is "live"; one carrying only a
/// `serialized` form is "latent" and rehydrates on demand. An entry is
/// never created with both halves empty.
#[derive(Debug, Clone, Default)]
pub struct Entry {
    /// The committed serialized form, if any.
    pub serialized: Option<SerializedForm>,
    /// The live instance, if hydrated.
    pub instance: Option<SharedEntity>,
}

impl Entry {
    /// An entry with both halves empty, to be filled by the caller.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the entry carries only a serialized form.
    #[must_use]
    pub fn is_latent(&self) -> bool {
        self.instance.is_none() && self.serialized.is_some()
    }
}

/// The table's underlying map.
pub type EntryMap = BTreeMap<EntityId, Entry>;

/// Persisted shape of one entry: the instance half is never part of the
/// persisted blob.
#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    #[serde(default)]
    serialized: Option<SerializedForm>,
    #[serde(default)]
    instance: Option<()>,
}

/// The model database: id-keyed entries with reclamation and persistence.
///
/// Execution is single-threaded and cooperative; interior mutability via
/// `RefCell` stands in for any locking discipline.
#[derive(Debug)]
pub struct Store {
    registry: Rc<TypeRegistry>,
    entries: RefCell<EntryMap>,
    blob_key: String,
}

impl Store {
    /// Creates an empty store over the given type registry.
    #[must_use]
    pub fn new(registry: Rc<TypeRegistry>) -> Self {
        Self::with_blob_key(registry, "kiln-db")
    }

    /// Creates an empty store persisting under a specific sink key.
    #[must_use]
    pub fn with_blob_key(registry: Rc<TypeRegistry>, blob_key: &str) -> Self {
        Self {
            registry,
            entries: RefCell::new(EntryMap::new()),
            blob_key: blob_key.into(),
        }
    }

    /// The registry this store serializes against.
    #[must_use]
    pub fn registry(&self) -> &Rc<TypeRegistry> {
        &self.registry
    }

    /// The sink key the whole-table blob is persisted under.
    #[must_use]
    pub fn blob_key(&self) -> &str {
        &self.blob_key
    }

    /// Number of entries (live and latent).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Whether an entry exists for `id`.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.borrow().contains_key(&id)
    }

    /// Ids of all current entries.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.entries.borrow().keys().copied().collect()
    }

    /// Constructs a new instance of `type_name` and registers it as the
    /// live half of its entry. Does not require an existing entry.
    pub fn create(&self, type_name: &str, id: Option<EntityId>) -> SharedEntity {
        let instance = Entity::new(type_name, id).into_shared();
        let id = instance.borrow().id();
        let mut entries = self.entries.borrow_mut();
        let entry = entries.entry(id).or_insert_with(Entry::empty);
        // Last writer wins: a same-id instance replaces the previous one.
        entry.instance = Some(instance.clone());
        instance
    }

    /// Returns the live instance for `id`, rehydrating a latent entry on
    /// demand. `None` when no entry exists.
    pub fn get(
        &self,
        type_name: &str,
        id: EntityId,
        recursive: bool,
    ) -> StoreResult<Option<SharedEntity>> {
        let mut entries = self.entries.borrow_mut();
        let Some(entry) = entries.get(&id) else {
            return Ok(None);
        };
        if let Some(instance) = entry.instance.clone() {
            return Ok(Some(instance));
        }
        let Some(form) = entry.serialized.clone() else {
            return Ok(None);
        };
        // Rehydrate and cache the instance back onto the entry (deserialize
        // registers it before filling fields).
        let instance = deserialize(&self.registry, &form, type_name, &mut entries, recursive)?;
        Ok(Some(instance))
    }

    /// `get` with a `create` fallback.
    pub fn get_or_create(
        &self,
        type_name: &str,
        id: EntityId,
        recursive: bool,
    ) -> StoreResult<SharedEntity> {
        if let Some(existing) = self.get(type_name, id, recursive)? {
            return Ok(existing);
        }
        Ok(self.create(type_name, Some(id)))
    }

    /// Returns a copy of the committed serialized form for `id`, if any.
    #[must_use]
    pub fn get_serialized(&self, id: EntityId) -> Option<SerializedForm> {
        self.entries
            .borrow()
            .get(&id)
            .and_then(|e| e.serialized.clone())
    }

    /// Stores or updates both halves of an instance's entry. When
    /// `serialized` is omitted it is computed — recursively registering
    /// every reachable entity when `recursive` is set.
    pub fn put(
        &self,
        instance: &SharedEntity,
        serialized: Option<SerializedForm>,
        recursive: bool,
    ) -> StoreResult<()> {
        let mut entries = self.entries.borrow_mut();
        let form = match serialized {
            Some(form) => form,
            None if recursive => serialize_graph(&self.registry, instance, &mut entries),
            None => serialize(&self.registry, &instance.borrow()),
        };
        let id = form_id(&form)?;
        let entry = entries.entry(id).or_insert_with(Entry::empty);
        entry.instance = Some(instance.clone());
        entry.serialized = Some(form);
        Ok(())
    }

    /// Stores the serialized half only. When `update_instance` is set and a
    /// live instance exists, the form's field values are re-extracted into
    /// it in place — used for undo/redo restoration without reassigning
    /// entity identity.
    pub fn put_serialized(
        &self,
        form: &SerializedForm,
        update_instance: bool,
    ) -> StoreResult<()> {
        let id = form_id(form)?;
        let mut entries = self.entries.borrow_mut();
        let entry = entries.entry(id).or_insert_with(Entry::empty);
        entry.serialized = Some(form.clone());
        let instance = entry.instance.clone();
        if update_instance {
            if let Some(instance) = instance {
                deserialize_into(&self.registry, form, &instance, &mut entries, false)?;
            }
        }
        Ok(())
    }

    /// Pulls the entry's committed serialized form back onto an
    /// already-constructed instance. No-op when the entry has no form yet
    /// (instances are registered before their first commit).
    pub fn extract(&self, instance: &SharedEntity, recursive: bool) -> StoreResult<()> {
        let id = instance.borrow().id();
        let mut entries = self.entries.borrow_mut();
        let Some(form) = entries.get(&id).and_then(|e| e.serialized.clone()) else {
            return Ok(());
        };
        deserialize_into(&self.registry, &form, instance, &mut entries, recursive)
    }

    /// Removes the entry for `id` entirely. Used when undoing the creation
    /// of an entity (its `before` state is "did not exist").
    pub fn remove(&self, id: EntityId) -> bool {
        self.entries.borrow_mut().remove(&id).is_some()
    }

    /// Mark-and-sweep reclamation.
    ///
    /// Seeds the reachable set with every retained root, then walks each
    /// reached instance's declared and transient field values plus the
    /// declared reference ids of reached entries' committed forms (so
    /// latent children of live documents survive). Entries left unreached
    /// drop their live instance in shallow mode (the entry stays latent,
    /// eligible for rehydration) and are deleted outright in deep mode.
    ///
    /// Returns the number of reclaimed entries.
    pub fn clean(&self, deep: bool) -> usize {
        let mut entries = self.entries.borrow_mut();

        let mut reached = BTreeSet::new();
        let mut queue: VecDeque<EntityId> = VecDeque::new();
        for (id, entry) in entries.iter() {
            let retained = entry
                .instance
                .as_ref()
                .is_some_and(|i| i.borrow().retained());
            if retained {
                reached.insert(*id);
                queue.push_back(*id);
            }
        }

        while let Some(id) = queue.pop_front() {
            let Some(entry) = entries.get(&id) else {
                continue;
            };
            let mut children = Vec::new();
            if let Some(instance) = &entry.instance {
                children.extend(instance.borrow().referenced().iter().map(|e| e.borrow().id()));
            }
            if let Some(form) = &entry.serialized {
                children.extend(form_ref_ids(&self.registry, form));
            }
            for child in children {
                if reached.insert(child) {
                    queue.push_back(child);
                }
            }
        }

        let mut reclaimed = 0;
        if deep {
            let before = entries.len();
            entries.retain(|id, _| reached.contains(id));
            reclaimed = before - entries.len();
        } else {
            // An unreached entry goes latent; one that was never committed
            // has no serialized half to fall back to and is removed outright
            // (an entry must never have both halves empty).
            entries.retain(|id, entry| {
                if reached.contains(id) || entry.instance.is_none() {
                    return true;
                }
                reclaimed += 1;
                if entry.serialized.is_some() {
                    entry.instance = None;
                    true
                } else {
                    false
                }
            });
        }
        debug!(reclaimed, deep, "mark-and-sweep pass finished");
        reclaimed
    }

    /// Persists the whole table as one blob.
    ///
    /// Runs a shallow [`clean`](Self::clean) first, then writes every
    /// surviving entry's serialized half (instances are never part of the
    /// persisted shape) under the store's blob key.
    pub fn save(&self, sink: &mut dyn PersistenceSink) -> StoreResult<()> {
        self.clean(false);
        let blob = {
            let entries = self.entries.borrow();
            let mut saved = serde_json::Map::new();
            for (id, entry) in entries.iter() {
                let persisted = PersistedEntry {
                    serialized: entry.serialized.clone(),
                    instance: None,
                };
                saved.insert(id.to_string(), serde_json::to_value(&persisted)?);
            }
            serde_json::to_string(&Value::Object(saved))?
        };
        sink.set(&self.blob_key, &blob)?;
        debug!(key = %self.blob_key, entries = self.len(), "store persisted");
        Ok(())
    }

    /// Repopulates the table from the persisted blob. Every entry comes
    /// back latent; instances rehydrate lazily on first `get`. A missing
    /// blob is not an error.
    pub fn load(&self, sink: &dyn PersistenceSink) -> StoreResult<()> {
        let Some(blob) = sink.get(&self.blob_key)? else {
            warn!(key = %self.blob_key, "nothing to load");
            return Ok(());
        };
        let parsed: BTreeMap<String, PersistedEntry> = serde_json::from_str(&blob)?;
        let mut entries = EntryMap::new();
        for (key, persisted) in parsed {
            let Ok(id) = EntityId::parse(&key) else {
                warn!(%key, "skipping entry with unparseable id");
                continue;
            };
            if persisted.serialized.is_none() {
                continue;
            }
            entries.insert(
                id,
                Entry {
                    serialized: persisted.serialized,
                    instance: None,
                },
            );
        }
        debug!(key = %self.blob_key, entries = entries.len(), "store loaded");
        *self.entries.borrow_mut() = entries;
        Ok(())
    }
}
