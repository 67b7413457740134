//! Entry table and serialization layer for Kiln.
//!
//! Provides the "model database" core:
//! - A serializer/deserializer that converts an entity (and, recursively,
//!   its graph) to and from a plain JSON value tree, resolving entity
//!   references through a shared entry table. Shared references serialize
//!   exactly once and cyclic graphs terminate.
//! - The [`Store`] — the mapping from entity id to
//!   `{serialized form, live instance}` with create/get/put operations,
//!   mark-and-sweep reclamation, and whole-blob persistence.
//! - The [`PersistenceSink`] abstraction (single-key, whole-blob get/set)
//!   with in-memory and file-backed implementations.
//!
//! # Architecture
//!
//! Serialized forms are `serde_json::Value` objects carrying an `id` and a
//! `type` tag. Entity references inside a form are always bare id strings;
//! in recursive mode the referenced entity's own form is registered in the
//! entry table as a side effect. The tree therefore stays navigable by id
//! and never contains entity cycles directly, which is what makes cyclic
//! graphs representable.

mod error;
mod serialize;
mod sink;
mod store;

pub use error::{StoreError, StoreResult};
pub use serialize::{
    deserialize, deserialize_into, form_id, form_type, serialize, serialize_graph, SerializedForm,
    FORM_ID, FORM_TYPE,
};
pub use sink::{FileSink, MemorySink, PersistenceSink};
pub use store::{Entry, EntryMap, Store};
