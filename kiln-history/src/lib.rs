//! Linear undo/redo history for Kiln.
//!
//! [`History`] is a cursor-based stack of committed items. Pushing while
//! undone items exist truncates the redo tail (standard linear history);
//! undoing and redoing hand the item to a callback while a `doing` flag
//! suppresses any recording the callback's side effects might trigger.
//!
//! [`Transaction`] is the item type the commit pipeline records: the
//! before/after serialized forms of every entity that changed within one
//! committed turn.

mod history;
mod transaction;

pub use history::History;
pub use transaction::Transaction;
