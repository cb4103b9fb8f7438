use crate::model::{Component, Project};

/// Deep copy of a destructively removed record, captured before the
/// delete so the author can get their work back.
#[derive(Clone, Debug)]
pub enum UndoKind {
    Project(Project),
    Component { key: String, data: Component },
}

#[derive(Clone, Debug)]
pub struct UndoEntry {
    pub course_key: String,
    pub kind: UndoKind,
}

/// Bounded stack of reversible deletes, shared across courses. The
/// bound keeps a long editing session from accumulating every project
/// ever deleted.
#[derive(Debug)]
pub struct UndoLedger {
    entries: Vec<UndoEntry>,
    depth: usize,
}

impl UndoLedger {
    pub fn new(depth: usize) -> Self {
        Self {
            entries: Vec::new(),
            depth: depth.max(1),
        }
    }

    pub fn push(&mut self, entry: UndoEntry) {
        self.entries.push(entry);
        if self.entries.len() > self.depth {
            let excess = self.entries.len() - self.depth;
            self.entries.drain(..excess);
        }
    }

    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
