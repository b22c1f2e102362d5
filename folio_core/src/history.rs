//! Undo/redo history for an editing session.
//!
//! Documents are immutable and share untouched subtrees, so the history keeps
//! whole-document snapshots: each entry holds the document as it was before an
//! edit. Continuous typing (consecutive mergeable edits inside the merge window)
//! collapses into one entry.

use std::time::{Duration, Instant};

use log::trace;

use crate::model::Document;

/// Default maximum history size
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 100;

/// Default time window for merging edits (500ms)
pub const DEFAULT_MERGE_WINDOW_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("Nothing to undo")]
    NothingToUndo,
    #[error("Nothing to redo")]
    NothingToRedo,
}

/// Metadata for an entry in the history
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    /// When the edit was recorded
    pub timestamp: Instant,
    /// Name of the edit (the command name)
    pub display_name: String,
    /// Whether this entry absorbed later edits
    pub is_merged: bool,
    mergeable: bool,
}

impl EntryMetadata {
    pub fn new(display_name: impl Into<String>) -> Self {
        EntryMetadata {
            timestamp: Instant::now(),
            display_name: display_name.into(),
            is_merged: false,
            mergeable: false,
        }
    }
}

/// A snapshot plus the edit that moved away from it
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub document: Document,
    pub metadata: EntryMetadata,
}

/// Bounded undo and redo stacks of document snapshots
pub struct History {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_history_size: usize,
    merge_window_ms: u64,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History")
            .field("undo_stack_len", &self.undo_stack.len())
            .field("redo_stack_len", &self.redo_stack.len())
            .field("max_history_size", &self.max_history_size)
            .finish()
    }
}

impl History {
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_MAX_HISTORY_SIZE, DEFAULT_MERGE_WINDOW_MS)
    }

    pub fn with_settings(max_history_size: usize, merge_window_ms: u64) -> Self {
        History {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_history_size,
            merge_window_ms,
        }
    }

    pub fn set_max_history_size(&mut self, size: usize) {
        self.max_history_size = size;
        self.trim();
    }

    pub fn set_merge_window(&mut self, duration: Duration) {
        self.merge_window_ms = duration.as_millis() as u64;
    }

    fn trim(&mut self) {
        if self.undo_stack.len() > self.max_history_size {
            let excess = self.undo_stack.len() - self.max_history_size;
            self.undo_stack.drain(..excess);
        }
    }

    /// Records `before`, the document as it was before the edit named `name`
    ///
    /// A mergeable edit that follows a mergeable edit of the same name inside the
    /// merge window extends the previous entry instead of adding one.
    pub fn record(&mut self, before: Document, name: &str, mergeable: bool) {
        self.redo_stack.clear();

        let window = Duration::from_millis(self.merge_window_ms);
        if let Some(last) = self.undo_stack.last_mut() {
            let meta = &mut last.metadata;
            if mergeable && meta.mergeable && meta.display_name == name && meta.timestamp.elapsed() < window {
                meta.timestamp = Instant::now();
                meta.is_merged = true;
                trace!("Merged {} into the previous history entry", name);
                return;
            }
        }

        let mut metadata = EntryMetadata::new(name);
        metadata.mergeable = mergeable;
        self.undo_stack.push(HistoryEntry {
            document: before,
            metadata,
        });
        self.trim();
    }

    /// Steps back: returns the previous snapshot and remembers `current` for redo
    pub fn undo(&mut self, current: Document) -> Result<Document, HistoryError> {
        let entry = self.undo_stack.pop().ok_or(HistoryError::NothingToUndo)?;
        self.redo_stack.push(HistoryEntry {
            document: current,
            metadata: EntryMetadata::new(entry.metadata.display_name.clone()),
        });
        Ok(entry.document)
    }

    /// Steps forward again after an undo
    pub fn redo(&mut self, current: Document) -> Result<Document, HistoryError> {
        let entry = self.redo_stack.pop().ok_or(HistoryError::NothingToRedo)?;
        self.undo_stack.push(HistoryEntry {
            document: current,
            metadata: EntryMetadata::new(entry.metadata.display_name.clone()),
        });
        Ok(entry.document)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn next_undo_name(&self) -> Option<&str> {
        self.undo_stack.last().map(|e| e.metadata.display_name.as_str())
    }

    pub fn next_redo_name(&self) -> Option<&str> {
        self.redo_stack.last().map(|e| e.metadata.display_name.as_str())
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, Paragraph};

    fn doc(text: &str) -> Document {
        let (doc, _) = Document::empty().edit(|pkg| pkg.body = vec![Block::paragraph(Paragraph::with_text(text))]);
        doc
    }

    #[test]
    fn test_empty_history() {
        let mut history = History::new();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert_eq!(history.undo(doc("x")).unwrap_err(), HistoryError::NothingToUndo);
        assert_eq!(history.redo(doc("x")).unwrap_err(), HistoryError::NothingToRedo);
        assert_eq!(history.next_undo_name(), None);
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut history = History::with_settings(10, 0);
        let (a, b, c) = (doc("a"), doc("b"), doc("c"));
        history.record(a.clone(), "InsertText", false);
        history.record(b.clone(), "DeleteRange", false);
        assert_eq!(history.next_undo_name(), Some("DeleteRange"));

        assert_eq!(history.undo(c.clone()).unwrap(), b);
        assert_eq!(history.undo(b.clone()).unwrap(), a);
        assert_eq!(history.redo_count(), 2);
        assert_eq!(history.next_redo_name(), Some("InsertText"));
        assert_eq!(history.redo(a).unwrap(), b);
        assert_eq!(history.redo(b).unwrap(), c);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_record_clears_redo() {
        let mut history = History::with_settings(10, 0);
        history.record(doc("a"), "InsertText", false);
        history.undo(doc("b")).unwrap();
        assert!(history.can_redo());
        history.record(doc("a"), "FormatText", false);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_max_history_size_drops_oldest() {
        let mut history = History::with_settings(3, 0);
        for text in ["1", "2", "3", "4", "5"] {
            history.record(doc(text), "InsertText", false);
        }
        assert_eq!(history.undo_count(), 3);
        assert_eq!(history.undo(doc("6")).unwrap().text(), "5\n");

        history.set_max_history_size(1);
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.undo(doc("5")).unwrap().text(), "4\n");
    }

    #[test]
    fn test_typing_merges_within_window() {
        let mut history = History::with_settings(10, 60_000);
        history.record(doc(""), "InsertText", true);
        history.record(doc("a"), "InsertText", true);
        history.record(doc("ab"), "InsertText", true);
        assert_eq!(history.undo_count(), 1);
        assert!(history.undo_stack[0].metadata.is_merged);
        // the merged entry keeps the oldest snapshot
        assert_eq!(history.undo(doc("abc")).unwrap().text(), "\n");

        history.record(doc(""), "InsertText", true);
        history.record(doc("a"), "DeleteRange", true);
        assert_eq!(history.undo_count(), 2);
    }

    #[test]
    fn test_zero_window_never_merges() {
        let mut history = History::with_settings(10, 0);
        history.set_merge_window(Duration::from_millis(0));
        history.record(doc(""), "InsertText", true);
        history.record(doc("a"), "InsertText", true);
        assert_eq!(history.undo_count(), 2);
    }
}
