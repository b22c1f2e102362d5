//! Non-fatal diagnostics collected while decoding, resolving styles and templating

use std::fmt;

use serde::{Deserialize, Serialize};

/// A problem that was worked around
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Warning {
    /// An optional part could not be parsed and was treated as absent
    MalformedPart { part: String, message: String },
    /// A part named by a relationship is not in the archive
    MissingPart { part: String },
    /// An element the model does not understand
    UnsupportedElement {
        part: String,
        element: String,
        /// Kept as an opaque node (true) or dropped (false)
        preserved: bool,
    },
    /// Content references a relationship id or note that does not exist
    BrokenReference { part: String, reference: String },
    /// A `basedOn` chain loops back on itself
    CyclicStyle { style_id: String },
    /// Two notes share an id; the later one was dropped
    DuplicateNoteId { part: String, id: i64 },
    /// A table violates span or merge invariants
    TableStructure { part: String, message: String },
    /// A template variable has no value
    UnresolvedVariable { name: String },
    /// A section tag has no matching partner
    UnbalancedTag { tag: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MalformedPart { part, message } => write!(f, "malformed part {}: {}", part, message),
            Warning::MissingPart { part } => write!(f, "missing part {}", part),
            Warning::UnsupportedElement {
                part,
                element,
                preserved,
            } => {
                let action = if *preserved { "preserved" } else { "dropped" };
                write!(f, "unsupported element <{}> in {} ({})", element, part, action)
            }
            Warning::BrokenReference { part, reference } => {
                write!(f, "broken reference {} in {}", reference, part)
            }
            Warning::CyclicStyle { style_id } => write!(f, "style {} is based on itself", style_id),
            Warning::DuplicateNoteId { part, id } => write!(f, "duplicate note id {} in {}", id, part),
            Warning::TableStructure { part, message } => write!(f, "table in {}: {}", part, message),
            Warning::UnresolvedVariable { name } => write!(f, "template variable {} has no value", name),
            Warning::UnbalancedTag { tag } => write!(f, "unbalanced template tag {}", tag),
        }
    }
}
