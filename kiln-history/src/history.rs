//! The undo/redo stack.

use tracing::warn;

/// Linear undo/redo history over items of type `T`.
///
/// The cursor counts applied items: `cursor == 0` is both the initial state
/// and the terminal state of a full undo. Three mutually exclusive modes —
/// idle, undoing, redoing — are tracked through flags; while `doing` is set
/// (during either replay direction) `push` and `insert` are rejected so a
/// replay can never record itself as a new item.
#[derive(Debug)]
pub struct History<T> {
    items: Vec<T>,
    cursor: usize,
    doing: bool,
    undoing: bool,
    redoing: bool,
    pauses: u32,
    started: bool,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> History<T> {
    /// Creates an empty, not-yet-started history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            cursor: 0,
            doing: false,
            undoing: false,
            redoing: false,
            pauses: 0,
            started: false,
        }
    }

    /// Enables recording. Items pushed before `start` are rejected, which
    /// lets the host finish its initial load without polluting history.
    pub fn start(&mut self) {
        self.started = true;
    }

    /// Whether recording has been enabled.
    #[must_use]
    pub fn started(&self) -> bool {
        self.started
    }

    /// Adds a new item, truncating any redo tail.
    ///
    /// Returns `true` if the item was recorded, `false` when rejected
    /// (not started, paused, or mid-replay).
    pub fn push(&mut self, item: T) -> bool {
        if !self.started || self.doing || self.pauses > 0 {
            return false;
        }
        self.items.truncate(self.cursor);
        self.items.push(item);
        self.cursor += 1;
        true
    }

    /// Adds an item at the cursor while keeping the redo tail (in contrast
    /// to [`push`](Self::push)).
    pub fn insert(&mut self, item: T) -> bool {
        if !self.started || self.doing || self.pauses > 0 {
            return false;
        }
        self.items.insert(self.cursor, item);
        self.cursor += 1;
        true
    }

    /// Removes and returns the latest applied item without replaying it.
    pub fn pop(&mut self) -> Option<T> {
        if !self.started || self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.items.remove(self.cursor))
    }

    /// Undoes the previous item (if any), handing it to `apply`.
    ///
    /// Returns `true` if there was an item to undo.
    pub fn undo<F: FnMut(&T)>(&mut self, mut apply: F) -> bool {
        if !self.started || self.cursor == 0 {
            return false;
        }

        let was_doing = self.doing;
        let was_undoing = self.undoing;
        self.doing = true;
        self.undoing = true;

        let undone = match self.items.get(self.cursor - 1) {
            Some(item) => {
                apply(item);
                self.cursor -= 1;
                true
            }
            None => {
                warn!("unexpected missing item when undoing");
                false
            }
        };

        self.doing = was_doing;
        self.undoing = was_undoing;
        undone
    }

    /// Redoes the next item (if any), handing it to `apply`.
    ///
    /// Returns `true` if there was an item to redo.
    pub fn redo<F: FnMut(&T)>(&mut self, mut apply: F) -> bool {
        if !self.started || self.cursor >= self.items.len() {
            return false;
        }

        let was_doing = self.doing;
        let was_redoing = self.redoing;
        self.doing = true;
        self.redoing = true;

        let redone = match self.items.get(self.cursor) {
            Some(item) => {
                apply(item);
                self.cursor += 1;
                true
            }
            None => {
                warn!("unexpected missing item when redoing");
                false
            }
        };

        self.doing = was_doing;
        self.redoing = was_redoing;
        redone
    }

    /// Suspends recording. Reentrant: each `pause` needs a matching
    /// [`resume`](Self::resume).
    pub fn pause(&mut self) {
        self.pauses += 1;
    }

    /// Lifts one level of suspension.
    pub fn resume(&mut self) {
        if self.pauses == 0 {
            warn!("history resumed more times than paused");
            return;
        }
        self.pauses -= 1;
    }

    /// Drops all items and resets the cursor. Mode flags are untouched.
    pub fn clear(&mut self) {
        self.items.clear();
        self.cursor = 0;
    }

    /// The latest applied item, if any.
    #[must_use]
    pub fn last_item(&self) -> Option<&T> {
        self.cursor.checked_sub(1).and_then(|i| self.items.get(i))
    }

    /// Total number of items (applied and undone).
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the history holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of currently applied items.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether there is an item to undo.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.started && self.cursor > 0
    }

    /// Whether there is an item to redo.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.started && self.cursor < self.items.len()
    }

    /// Whether a replay (either direction) is in progress.
    #[must_use]
    pub fn is_doing(&self) -> bool {
        self.doing
    }

    /// Whether an undo is in progress.
    #[must_use]
    pub fn is_undoing(&self) -> bool {
        self.undoing
    }

    /// Whether a redo is in progress.
    #[must_use]
    pub fn is_redoing(&self) -> bool {
        self.redoing
    }

    /// Whether recording is currently suspended.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.pauses > 0
    }
}
