//! Linear undo/redo history.

/// Two disjoint LIFO stacks over a participant's own operations.
///
/// Pushing a new operation clears the redo stack. Undo and redo move the top
/// entry from one stack to the other, so an entry is never on both.
#[derive(Debug, Clone)]
pub struct UndoRedo<T> {
    undo_stack: Vec<T>,
    redo_stack: Vec<T>,
    limit: Option<usize>,
}

impl<T> Default for UndoRedo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UndoRedo<T> {
    /// Unbounded history.
    pub fn new() -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            limit: None,
        }
    }

    /// History keeping at most `limit` undoable entries; the oldest is dropped.
    pub fn bounded(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Record a new operation.
    pub fn push(&mut self, action: T) {
        self.undo_stack.push(action);
        self.redo_stack.clear();

        if let Some(limit) = self.limit {
            if self.undo_stack.len() > limit {
                self.undo_stack.remove(0);
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl<T: Clone> UndoRedo<T> {
    /// Move the most recent operation to the redo stack and return it.
    pub fn undo(&mut self) -> Option<T> {
        let action = self.undo_stack.pop()?;
        self.redo_stack.push(action.clone());
        Some(action)
    }

    /// Move the most recently undone operation back and return it.
    pub fn redo(&mut self) -> Option<T> {
        let action = self.redo_stack.pop()?;
        self.undo_stack.push(action.clone());
        Some(action)
    }
}
