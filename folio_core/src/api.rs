//! # Editor Session
//!
//! The facade the editor shell talks to. A session owns the current document, its
//! undo history and the configuration; every edit goes through the command
//! executor, so anything the shell can do is also a serializable [`Command`].

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde_json::Value;

use crate::command::{execute_with, Command, CommandError};
use crate::config::FolioConfig;
use crate::find::{find_all, replace_command, FindMatch, SearchOptions, SearchResultSet};
use crate::history::{History, HistoryError, DEFAULT_MERGE_WINDOW_MS};
use crate::model::{Document, DocumentStats};
use crate::ooxml::{decode, decode_with, encode, encode_with, DecodeError, Decoded, EncodeError};
use crate::template::{analyze, TemplateSchema};
use crate::warning::Warning;

/// Errors surfaced by [`EditorSession`]
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("Invalid command JSON: {0}")]
    InvalidCommand(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads and decodes a `.docx` file
pub fn load_file(path: impl AsRef<Path>) -> Result<Decoded, DecodeError> {
    let data = fs::read(path.as_ref())?;
    decode(&data)
}

/// Encodes a document and writes it to `path`
pub fn save_file(document: &Document, path: impl AsRef<Path>) -> Result<(), EncodeError> {
    let data = encode(document)?;
    fs::write(path.as_ref(), data)?;
    Ok(())
}

/// One open document with its history
#[derive(Debug)]
pub struct EditorSession {
    document: Document,
    history: History,
    config: FolioConfig,
    /// Warnings from the last load
    warnings: Vec<Warning>,
    path: Option<PathBuf>,
    modified: bool,
    /// Results of the last [`search`](EditorSession::search); cleared by every edit
    search: SearchResultSet,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(FolioConfig::default())
    }
}

impl EditorSession {
    /// Session over an empty document
    pub fn new(config: FolioConfig) -> Self {
        Self::with_document(Document::empty(), config)
    }

    pub fn with_document(document: Document, config: FolioConfig) -> Self {
        EditorSession {
            document,
            history: History::with_settings(config.history_size, DEFAULT_MERGE_WINDOW_MS),
            config,
            warnings: Vec::new(),
            path: None,
            modified: false,
            search: SearchResultSet::default(),
        }
    }

    /// Opens a `.docx` file
    pub fn open(path: impl AsRef<Path>, config: FolioConfig) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let mut session = Self::new(config);
        session.load(&data)?;
        session.path = Some(path.to_path_buf());
        Ok(session)
    }

    /// Replaces the document with a decoded package; clears the history
    pub fn load(&mut self, data: &[u8]) -> Result<&[Warning], SessionError> {
        let decoded = decode_with(data, &self.config.decode)?;
        info!(
            "Loaded document: {} paragraph(s), {} warning(s)",
            decoded.document.stats().paragraphs,
            decoded.warnings.len()
        );
        self.document = decoded.document;
        self.warnings = decoded.warnings;
        self.history.clear();
        self.search = SearchResultSet::default();
        self.modified = false;
        Ok(&self.warnings)
    }

    /// Encodes the current document
    pub fn save(&self) -> Result<Vec<u8>, SessionError> {
        Ok(encode_with(&self.document, &self.config.encode)?)
    }

    /// Writes the document to `path` and makes it the session's file
    pub fn save_to(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let data = self.save()?;
        fs::write(path.as_ref(), data)?;
        self.path = Some(path.as_ref().to_path_buf());
        self.modified = false;
        Ok(())
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn config(&self) -> &FolioConfig {
        &self.config
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn stats(&self) -> DocumentStats {
        self.document.stats()
    }

    /// Executes a command and records the previous state for undo
    pub fn apply(&mut self, command: &Command) -> Result<Vec<Warning>, SessionError> {
        let (document, warnings) = execute_with(&self.document, command, &self.config.template)?;
        let before = std::mem::replace(&mut self.document, document);
        let typing = matches!(command, Command::InsertText { .. });
        self.history.record(before, command.name(), typing);
        self.search = SearchResultSet::default();
        self.modified = true;
        Ok(warnings)
    }

    /// Executes a command given as JSON
    pub fn apply_json(&mut self, json: &str) -> Result<Vec<Warning>, SessionError> {
        let command: Command = serde_json::from_str(json)?;
        self.apply(&command)
    }

    pub fn undo(&mut self) -> Result<(), SessionError> {
        self.document = self.history.undo(self.document.clone())?;
        self.search = SearchResultSet::default();
        self.modified = true;
        Ok(())
    }

    pub fn redo(&mut self) -> Result<(), SessionError> {
        self.document = self.history.redo(self.document.clone())?;
        self.search = SearchResultSet::default();
        self.modified = true;
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Search options for `query` with the session's default flags
    pub fn search_options(&self, query: &str) -> SearchOptions {
        SearchOptions {
            query: query.to_string(),
            ..self.config.search.clone()
        }
    }

    pub fn find(&self, query: &str) -> Vec<FindMatch> {
        find_all(&self.document, &self.search_options(query))
    }

    pub fn find_with(&self, options: &SearchOptions) -> Vec<FindMatch> {
        find_all(&self.document, options)
    }

    /// Runs a search and keeps its results; the first match becomes current
    pub fn search(&mut self, options: &SearchOptions) -> &SearchResultSet {
        self.search = SearchResultSet::from_results(find_all(&self.document, options));
        self.search.set_current(Some(0));
        &self.search
    }

    pub fn search_results(&self) -> &SearchResultSet {
        &self.search
    }

    /// Steps to the next match of the last search, or the previous one when
    /// `backward`; wraps at either end
    pub fn next_match(&mut self, backward: bool) -> Option<&FindMatch> {
        let count = self.search.results.len();
        if count == 0 {
            return None;
        }
        let next = match (self.search.current_index, backward) {
            (None, false) => 0,
            (None, true) => count - 1,
            (Some(i), false) => (i + 1) % count,
            (Some(i), true) => (i + count - 1) % count,
        };
        self.search.set_current(Some(next));
        self.search.current()
    }

    /// Replaces every match as one undoable step; returns the number of replacements
    pub fn replace_all(&mut self, options: &SearchOptions) -> Result<usize, SessionError> {
        let command = replace_command(&self.document, options)?;
        let count = match &command {
            Command::Batch { commands } => commands.len(),
            _ => 1,
        };
        if count > 0 {
            self.apply(&command)?;
        }
        Ok(count)
    }

    /// Substitutes template variables as one undoable step
    pub fn substitute(&mut self, variables: &Value) -> Result<Vec<Warning>, SessionError> {
        self.apply(&Command::SetVariables {
            variables: variables.clone(),
        })
    }

    pub fn template_schema(&self) -> TemplateSchema {
        analyze(&self.document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Position, TextRange};
    use crate::model::{Block, Paragraph};
    use serde_json::json;

    fn session(paragraphs: &[&str]) -> EditorSession {
        let (doc, _) = Document::empty().edit(|pkg| {
            pkg.body = paragraphs
                .iter()
                .map(|text| Block::paragraph(Paragraph::with_text(text)))
                .collect();
        });
        EditorSession::with_document(doc, FolioConfig::default())
    }

    #[test]
    fn test_apply_undo_redo() {
        let mut s = session(&["Hello"]);
        s.apply(&Command::DeleteRange {
            range: TextRange::within(0, 0, 1),
        })
        .unwrap();
        assert_eq!(s.document().text(), "ello\n");
        assert!(s.is_modified());

        s.undo().unwrap();
        assert_eq!(s.document().text(), "Hello\n");
        assert!(s.can_redo());
        s.redo().unwrap();
        assert_eq!(s.document().text(), "ello\n");
        assert!(matches!(s.redo(), Err(SessionError::History(HistoryError::NothingToRedo))));
    }

    #[test]
    fn test_failed_command_leaves_history_alone() {
        let mut s = session(&["Hello"]);
        let result = s.apply(&Command::DeleteRange {
            range: TextRange::within(0, 0, 10),
        });
        assert!(matches!(result, Err(SessionError::Command(CommandError::InvalidRange(_)))));
        assert!(!s.can_undo());
        assert!(!s.is_modified());
    }

    #[test]
    fn test_apply_json() {
        let mut s = session(&["Hello"]);
        s.apply_json(r#"{"type": "InsertText", "at": {"paragraph": 0, "offset": 5}, "text": "!"}"#)
            .unwrap();
        assert_eq!(s.document().text(), "Hello!\n");
        assert!(matches!(s.apply_json("{}"), Err(SessionError::InvalidCommand(_))));
    }

    #[test]
    fn test_replace_all_is_one_step() {
        let mut s = session(&["cat and cat", "no match", "cat"]);
        let options = SearchOptions {
            replace: "dog".to_string(),
            ..s.search_options("cat")
        };
        assert_eq!(s.find("cat").len(), 3);
        assert_eq!(s.replace_all(&options).unwrap(), 3);
        assert_eq!(s.document().text(), "dog and dog\nno match\ndog\n");
        s.undo().unwrap();
        assert_eq!(s.document().text(), "cat and cat\nno match\ncat\n");

        let none = SearchOptions::new("zebra");
        assert_eq!(s.replace_all(&none).unwrap(), 0);
        // nothing replaced, nothing recorded
        assert!(s.can_redo());
    }

    #[test]
    fn test_search_navigation_wraps_and_resets_on_edit() {
        let mut s = session(&["one cat", "two cats", "no match", "cat"]);
        let options = s.search_options("cat");
        let results = s.search(&options);
        assert_eq!(results.total_count, 3);
        assert_eq!(results.current().map(|m| m.range.start), Some(Position::new(0, 4)));

        let starts: Vec<Position> = (0..3)
            .filter_map(|_| s.next_match(false).map(|m| m.range.start))
            .collect();
        assert_eq!(starts, vec![Position::new(1, 4), Position::new(3, 0), Position::new(0, 4)]);
        assert_eq!(s.next_match(true).map(|m| m.range.start), Some(Position::new(3, 0)));

        s.apply(&Command::InsertText {
            at: Position::new(2, 0),
            text: "a ".to_string(),
            formatting: None,
        })
        .unwrap();
        assert!(s.search_results().is_empty());
        assert!(s.next_match(false).is_none());

        let none = s.search(&SearchOptions::new("zebra"));
        assert!(none.is_empty());
        assert!(none.current().is_none());
    }

    #[test]
    fn test_substitute_and_schema() {
        let mut s = session(&["Hi {name}", "{#items}", "- {label}", "{/items}"]);
        let schema = s.template_schema();
        assert_eq!(schema.variables, vec!["name"]);
        assert_eq!(schema.sections[0].variables, vec!["label"]);

        let warnings = s
            .substitute(&json!({"items": [{"label": "one"}, {"label": "two"}]}))
            .unwrap();
        assert_eq!(s.document().text(), "Hi \n- one\n- two\n");
        assert_eq!(warnings.len(), 1);
        s.undo().unwrap();
        assert_eq!(s.document().paragraph_count(), 4);
    }

    #[test]
    fn test_typing_collapses_into_one_undo() {
        let mut s = session(&[""]);
        for (i, ch) in ["a", "b", "c"].iter().enumerate() {
            s.apply(&Command::InsertText {
                at: Position::new(0, i),
                text: ch.to_string(),
                formatting: None,
            })
            .unwrap();
        }
        assert_eq!(s.document().text(), "abc\n");
        s.undo().unwrap();
        assert_eq!(s.document().text(), "\n");
    }

    #[test]
    fn test_save_and_load_bytes() {
        let mut s = session(&["persisted"]);
        let bytes = s.save().unwrap();
        let mut other = EditorSession::default();
        other.apply(&Command::SplitParagraph { at: Position::new(0, 0) }).unwrap();
        other.load(&bytes).unwrap();
        assert_eq!(other.document().text(), "persisted\n");
        assert!(!other.can_undo());
        s.apply(&Command::SplitParagraph { at: Position::new(0, 0) }).unwrap();
        assert!(s.is_modified());
    }

    #[test]
    fn test_open_and_save_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("letter.docx");
        save_file(&session(&["on disk"]).document, &path).unwrap();

        let decoded = load_file(&path).unwrap();
        assert_eq!(decoded.document.text(), "on disk\n");

        let mut s = EditorSession::open(&path, FolioConfig::default()).unwrap();
        assert_eq!(s.path(), Some(path.as_path()));
        s.apply(&Command::InsertText {
            at: Position::new(0, 7),
            text: "!".to_string(),
            formatting: None,
        })
        .unwrap();
        let copy = dir.path().join("copy.docx");
        s.save_to(&copy).unwrap();
        assert!(!s.is_modified());
        assert_eq!(load_file(&copy).unwrap().document.text(), "on disk!\n");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = EditorSession::open("/nonexistent/folio/missing.docx", FolioConfig::default());
        assert!(matches!(result, Err(SessionError::Io(_))));
    }
}
