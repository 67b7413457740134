//! Entity model for Kiln.
//!
//! Defines the two halves of the model layer:
//! - [`TypeRegistry`] — statically declared, per-type field metadata. Only
//!   declared fields participate in serialization and diffing; the registry
//!   is configuration built once at startup, not runtime-variable state.
//! - [`Entity`] — a uniquely identified, mutable record whose declared
//!   fields hold tagged [`FieldValue`] variants. Entities form a shared
//!   mutable graph through [`SharedEntity`] handles.
//!
//! The store, history, and commit pipeline all operate on these types; they
//! never inspect application-specific structure beyond what the registry
//! declares.

mod entity;
mod registry;

pub use entity::{Entity, FieldValue, SharedEntity};
pub use registry::{FieldDecl, TypeDecl, TypeRegistry};
