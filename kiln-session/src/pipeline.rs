//! The dirty batcher.
//!
//! Observes the change-notification stream and coalesces every mutation
//! occurring within one logical turn into a single history transaction.
//! Events arriving while history is replaying or paused are ignored, so an
//! undo can never record itself as a new edit.

use crate::IdleScheduler;
use kiln_history::{History, Transaction};
use kiln_store::{serialize, PersistenceSink, Store, StoreResult};
use kiln_types::{ChangeEvent, EntityId};
use tracing::{debug, warn};

/// Batches observed mutations and commits them at the turn boundary.
#[derive(Debug, Default)]
pub struct CommitPipeline {
    /// Distinct dirty ids in first-dirty order.
    dirty: Vec<EntityId>,
    scheduler: IdleScheduler,
}

impl CommitPipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes one mutation event.
    ///
    /// Ignored while history is replaying (the `doing` flag) or paused.
    /// The first event of an otherwise-empty batch schedules the deferred
    /// flush.
    pub fn observe(&mut self, history: &History<Transaction>, event: &ChangeEvent) {
        if history.is_doing() || history.is_paused() {
            return;
        }
        self.mark_dirty(history, event.entity_id);
    }

    /// Marks an entity dirty directly (used for freshly created entities,
    /// which have no mutation event yet).
    pub fn mark_dirty(&mut self, history: &History<Transaction>, id: EntityId) {
        if history.is_doing() || history.is_paused() {
            return;
        }
        if !self.dirty.contains(&id) {
            self.dirty.push(id);
        }
        self.scheduler.request();
    }

    /// Whether a flush is scheduled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Number of entities currently marked dirty.
    #[must_use]
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Commits the current batch: captures before/after snapshots for every
    /// dirty entity, writes the fresh forms into the store, pushes one
    /// transaction to history, and persists the store.
    ///
    /// Returns `true` when a batch was committed. A flush arriving while a
    /// replay is still active is stale and silently ignored.
    pub fn flush(
        &mut self,
        store: &Store,
        history: &mut History<Transaction>,
        sink: &mut dyn PersistenceSink,
    ) -> StoreResult<bool> {
        if !self.scheduler.take() {
            return Ok(false);
        }
        if history.is_doing() {
            // Stale turn: suppressed, not an error.
            self.dirty.clear();
            return Ok(false);
        }

        let ids = std::mem::take(&mut self.dirty);
        let mut tx = Transaction::new();
        let mut fresh = Vec::new();

        // Capture every `before` prior to overwriting anything, so a
        // transaction touching several entities stays consistent.
        for id in &ids {
            let Some(instance) = store.get(&type_of(store, *id), *id, false)? else {
                warn!(%id, "dirty entity vanished before flush");
                continue;
            };
            let before = store.get_serialized(*id);
            let after = serialize(store.registry(), &instance.borrow());
            tx.record(*id, before, after.clone());
            fresh.push((instance, after));
        }

        for (instance, form) in fresh {
            store.put(&instance, Some(form), false)?;
        }

        if !tx.is_empty() {
            let recorded = history.push(tx);
            debug!(entities = ids.len(), recorded, "turn committed");
        }

        store.save(sink)?;
        Ok(true)
    }
}

/// The stored type name for an id, falling back to an empty expected type.
/// `Store::get` only uses the expected type when the entry's form lacks a
/// usable tag, which committed entries never do.
fn type_of(store: &Store, id: EntityId) -> String {
    store
        .get_serialized(id)
        .as_ref()
        .and_then(kiln_store::form_type)
        .unwrap_or_default()
        .to_string()
}
