//! Core type definitions for Kiln.
//!
//! This crate defines the fundamental types shared by every other crate in
//! the workspace:
//! - Entity identifiers (UUID v7)
//! - Field value kinds (the tagged-variant vocabulary decided at declaration
//!   time, so graph walks never need runtime type tests)
//! - Change-notification events (one per observed mutation)
//!
//! Domain-specific entity types belong to the application that registers
//! them, not here.

mod change;
mod ids;

pub use change::{ChangeEvent, FieldKind};
pub use ids::EntityId;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
