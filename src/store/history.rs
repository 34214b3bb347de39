//! Linear snapshot history with undo/redo

/// Ordered list of full-collection snapshots plus a cursor
///
/// Empty until the first commit. Committing after an undo discards every
/// snapshot past the cursor.
#[derive(Debug, Clone)]
pub struct History<T: Clone> {
    snapshots: Vec<Vec<T>>,
    /// Index of the current snapshot; `None` before the first commit
    cursor: Option<usize>,
}

impl<T: Clone> Default for History<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> History<T> {
    pub fn new() -> Self {
        Self {
            snapshots: Vec::new(),
            cursor: None,
        }
    }

    /// Append a snapshot after the cursor, dropping any redo branch
    pub fn commit(&mut self, snapshot: Vec<T>) {
        let keep = self.cursor.map_or(0, |c| c + 1);
        self.snapshots.truncate(keep);
        self.snapshots.push(snapshot);
        self.cursor = Some(self.snapshots.len() - 1);
    }

    /// Step back one snapshot; `None` when at the first committed one
    pub fn undo(&mut self) -> Option<&[T]> {
        match self.cursor {
            Some(c) if c > 0 => {
                self.cursor = Some(c - 1);
                Some(self.current())
            }
            _ => None,
        }
    }

    /// Step forward one snapshot; `None` when already at the last
    pub fn redo(&mut self) -> Option<&[T]> {
        match self.cursor {
            Some(c) if c + 1 < self.snapshots.len() => {
                self.cursor = Some(c + 1);
                Some(self.current())
            }
            _ => None,
        }
    }

    /// Current snapshot, empty before the first commit
    pub fn current(&self) -> &[T] {
        self.cursor
            .and_then(|c| self.snapshots.get(c))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(c) if c > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.cursor, Some(c) if c + 1 < self.snapshots.len())
    }

    /// Number of committed snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
