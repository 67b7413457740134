//! Commit orchestration for Kiln.
//!
//! Ties the store, history and change-notification stream together:
//! - [`IdleScheduler`] — the explicit "commit on idle" flag that makes the
//!   turn boundary deterministic: the host pumps it when the event source
//!   goes idle instead of relying on platform microtask timing.
//! - [`CommitPipeline`] — observes mutations, coalesces everything that
//!   happened within one logical turn into a single transaction, and
//!   commits it to history and persistence.
//! - [`Session`] — a constructed façade wiring the pieces together and
//!   exposing the public create/get/put, undo/redo and save/load surface.
//!   Collaborators are explicit objects passed by reference; nothing here
//!   is a process-wide singleton.

mod pipeline;
mod scheduler;
mod session;

pub use pipeline::CommitPipeline;
pub use scheduler::IdleScheduler;
pub use session::Session;
