//! Deterministic deferred-flush scheduling.

/// A single-slot task flag standing in for "schedule a flush at the end of
/// the current turn".
///
/// The batcher requests a flush on the first mutation of an otherwise-empty
/// batch; the host pumps the scheduler once its event source is idle. This
/// keeps the turn-boundary guarantee testable: tests pump manually instead
/// of depending on runtime tick ordering.
#[derive(Debug, Default)]
pub struct IdleScheduler {
    pending: bool,
}

impl IdleScheduler {
    /// Creates a scheduler with no pending flush.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a deferred flush. Returns `true` when this call newly
    /// scheduled one, `false` when a flush was already pending.
    pub fn request(&mut self) -> bool {
        !std::mem::replace(&mut self.pending, true)
    }

    /// Consumes the pending flag. Returns `true` when a flush was due.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    /// Whether a flush is scheduled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }
}
