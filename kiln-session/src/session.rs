//! The public façade over store, history and pipeline.

use crate::CommitPipeline;
use kiln_history::{History, Transaction};
use kiln_model::{FieldValue, SharedEntity, TypeRegistry};
use kiln_store::{PersistenceSink, SerializedForm, Store, StoreResult};
use kiln_types::{ChangeEvent, EntityId, FieldKind};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// One editing session over a model database.
///
/// Owns the store, the history, the commit pipeline and the persistence
/// sink, all as explicit constructed objects. The host feeds mutation
/// events in (directly via [`notify`](Self::notify) or through the
/// `set_*` helpers) and pumps [`commit`](Self::commit) at the end of each
/// turn.
pub struct Session {
    store: Rc<Store>,
    history: Rc<RefCell<History<Transaction>>>,
    pipeline: RefCell<CommitPipeline>,
    sink: RefCell<Box<dyn PersistenceSink>>,
}

impl Session {
    /// Creates a session over a registry and a persistence sink, with
    /// history recording enabled.
    #[must_use]
    pub fn new(registry: TypeRegistry, sink: Box<dyn PersistenceSink>) -> Self {
        Self::with_blob_key(registry, sink, "kiln-db")
    }

    /// Creates a session persisting under a specific sink key.
    #[must_use]
    pub fn with_blob_key(
        registry: TypeRegistry,
        sink: Box<dyn PersistenceSink>,
        blob_key: &str,
    ) -> Self {
        let mut history = History::new();
        history.start();
        Self {
            store: Rc::new(Store::with_blob_key(Rc::new(registry), blob_key)),
            history: Rc::new(RefCell::new(history)),
            pipeline: RefCell::new(CommitPipeline::new()),
            sink: RefCell::new(sink),
        }
    }

    /// The underlying entry table.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Shared handle to the history.
    #[must_use]
    pub fn history(&self) -> Rc<RefCell<History<Transaction>>> {
        self.history.clone()
    }

    // ── entity lifecycle ──────────────────────────────────────────

    /// Creates a new entity and marks it dirty so a create-only turn still
    /// commits (its `before` snapshot is "did not exist").
    pub fn create(&self, type_name: &str) -> SharedEntity {
        self.create_with_id(type_name, None)
    }

    /// Creates an entity with an explicit id.
    pub fn create_with_id(&self, type_name: &str, id: Option<EntityId>) -> SharedEntity {
        let instance = self.store.create(type_name, id);
        let id = instance.borrow().id();
        self.pipeline
            .borrow_mut()
            .mark_dirty(&self.history.borrow(), id);
        instance
    }

    /// Returns the live instance for `id`, rehydrating on demand.
    pub fn get(
        &self,
        type_name: &str,
        id: EntityId,
        recursive: bool,
    ) -> StoreResult<Option<SharedEntity>> {
        self.store.get(type_name, id, recursive)
    }

    /// `get` with a `create` fallback.
    pub fn get_or_create(
        &self,
        type_name: &str,
        id: EntityId,
        recursive: bool,
    ) -> StoreResult<SharedEntity> {
        if let Some(existing) = self.store.get(type_name, id, recursive)? {
            return Ok(existing);
        }
        Ok(self.create_with_id(type_name, Some(id)))
    }

    /// Copy of the committed serialized form for `id`.
    #[must_use]
    pub fn get_serialized(&self, id: EntityId) -> Option<SerializedForm> {
        self.store.get_serialized(id)
    }

    /// Stores both halves of an instance's entry immediately, outside the
    /// batching pipeline.
    pub fn put(
        &self,
        instance: &SharedEntity,
        serialized: Option<SerializedForm>,
        recursive: bool,
    ) -> StoreResult<()> {
        self.store.put(instance, serialized, recursive)
    }

    // ── mutations ─────────────────────────────────────────────────

    /// Feeds one externally produced change event into the pipeline.
    pub fn notify(&self, event: &ChangeEvent) {
        self.pipeline
            .borrow_mut()
            .observe(&self.history.borrow(), event);
    }

    /// Sets a primitive field and emits the matching change event.
    pub fn set_primitive(&self, entity: &SharedEntity, field: &str, value: Value) {
        entity
            .borrow_mut()
            .set_field(field, FieldValue::Primitive(value.clone()));
        let id = entity.borrow().id();
        self.notify(&ChangeEvent::new(id, field, FieldKind::Primitive).with_value(value));
    }

    /// Sets a reference field and emits the matching change event.
    pub fn set_reference(&self, entity: &SharedEntity, field: &str, target: Option<&SharedEntity>) {
        entity
            .borrow_mut()
            .set_field(field, FieldValue::Ref(target.cloned()));
        let id = entity.borrow().id();
        let mut event = ChangeEvent::new(id, field, FieldKind::EntityRef);
        if let Some(target) = target {
            event = event.with_value(Value::String(target.borrow().id().to_string()));
        }
        self.notify(&event);
    }

    // ── turn boundary ─────────────────────────────────────────────

    /// Whether a flush is scheduled for the end of the current turn.
    #[must_use]
    pub fn has_pending_commit(&self) -> bool {
        self.pipeline.borrow().is_pending()
    }

    /// Pumps the scheduler: commits the current batch (one transaction)
    /// and persists. Returns `true` when a batch was committed.
    pub fn commit(&self) -> StoreResult<bool> {
        self.pipeline.borrow_mut().flush(
            &self.store,
            &mut self.history.borrow_mut(),
            self.sink.borrow_mut().as_mut(),
        )
    }

    // ── undo / redo ───────────────────────────────────────────────

    /// Undoes the latest committed transaction, restoring every covered
    /// entity's `before` snapshot. A `before` of "did not exist" removes
    /// the entry. Returns `true` if there was a transaction to undo.
    pub fn undo(&self) -> StoreResult<bool> {
        let store = self.store.clone();
        let mut applied = Ok(());
        let undone = self.history.borrow_mut().undo(|tx| {
            applied = apply_before(&store, tx);
        });
        applied?;
        Ok(undone)
    }

    /// Redoes the next transaction, restoring every covered entity's
    /// `after` snapshot. Returns `true` if there was a transaction to redo.
    pub fn redo(&self) -> StoreResult<bool> {
        let store = self.store.clone();
        let mut applied = Ok(());
        let redone = self.history.borrow_mut().redo(|tx| {
            applied = apply_after(&store, tx);
        });
        applied?;
        Ok(redone)
    }

    /// Suspends history recording (reentrant). Used to silence history
    /// during bulk programmatic edits such as an initial load.
    pub fn pause_history(&self) {
        self.history.borrow_mut().pause();
    }

    /// Lifts one level of history suspension.
    pub fn resume_history(&self) {
        self.history.borrow_mut().resume();
    }

    /// Drops all history items.
    pub fn clear_history(&self) {
        self.history.borrow_mut().clear();
    }

    // ── reclamation / persistence ─────────────────────────────────

    /// Runs a mark-and-sweep pass. Returns the number of reclaimed entries.
    pub fn clean(&self, deep: bool) -> usize {
        self.store.clean(deep)
    }

    /// Persists the whole table through the session's sink.
    pub fn save(&self) -> StoreResult<()> {
        self.store.save(self.sink.borrow_mut().as_mut())
    }

    /// Loads the table from the session's sink; entries come back latent.
    pub fn load(&self) -> StoreResult<()> {
        self.store.load(self.sink.borrow().as_ref())
    }
}

fn apply_before(store: &Store, tx: &Transaction) -> StoreResult<()> {
    for (id, form) in &tx.before {
        match form {
            Some(form) => store.put_serialized(form, true)?,
            None => {
                store.remove(*id);
            }
        }
    }
    Ok(())
}

fn apply_after(store: &Store, tx: &Transaction) -> StoreResult<()> {
    for form in tx.after.values() {
        store.put_serialized(form, true)?;
    }
    Ok(())
}
