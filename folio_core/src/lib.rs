//! # Folio Core
//!
//! Document model, `.docx` codec, template engine and command executor of the
//! Folio word processor.
//!
//! ```text
//! bytes -> ooxml::decode -> Document -> { style, template, command, find } -> Document -> ooxml::encode -> bytes
//! ```
//!
//! Documents are immutable values; every edit returns a new [`Document`] that
//! shares untouched subtrees with the old one.

pub mod api;
pub mod command;
pub mod config;
pub mod editing;
pub mod find;
pub mod history;
pub mod image;
pub mod model;
pub mod ooxml;
pub mod style;
pub mod template;
pub mod text_index;
pub mod warning;

pub use api::{load_file, save_file, EditorSession, SessionError};
pub use command::{execute, execute_with_warnings, Command, CommandError, Position, TextRange};
pub use config::{FolioConfig, TemplateOptions};
pub use find::{find_all, replace_all, FindMatch, SearchOptions};
pub use history::History;
pub use model::{Document, DocumentPackage};
pub use ooxml::{decode, encode, DecodeError, Decoded, EncodeError};
pub use style::{ResolvedFormatting, StyleResolver};
pub use template::{analyze, substitute, Substituted, TemplateSchema};
pub use warning::Warning;
