//! Tag grammar and tag pairing

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text_index::TextIndex;

/// `{name}`, `{#name}`, `{^name}`, `{/name}`, `{@name}`; `{.}` names the current element
static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\s*([#^/@]?)\s*(\.|[\p{L}_][\p{L}\p{N}_]*(?:\.[\p{L}\p{N}_]+)*)\s*\}").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagKind {
    Variable,
    SectionOpen,
    InvertedOpen,
    SectionClose,
    /// `{@name}`: the value is a WordprocessingML fragment
    Raw,
}

impl TagKind {
    fn from_sigil(sigil: &str) -> Self {
        match sigil {
            "#" => TagKind::SectionOpen,
            "^" => TagKind::InvertedOpen,
            "/" => TagKind::SectionClose,
            "@" => TagKind::Raw,
            _ => TagKind::Variable,
        }
    }

    pub fn sigil(&self) -> &'static str {
        match self {
            TagKind::Variable => "",
            TagKind::SectionOpen => "#",
            TagKind::InvertedOpen => "^",
            TagKind::SectionClose => "/",
            TagKind::Raw => "@",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, TagKind::SectionOpen | TagKind::InvertedOpen)
    }

    pub fn is_section(&self) -> bool {
        self.is_open() || *self == TagKind::SectionClose
    }
}

/// A tag found in logical text; offsets are characters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub kind: TagKind,
    pub name: String,
    pub start: usize,
    pub end: usize,
}

impl Tag {
    /// Canonical source form, `{#items}`
    pub fn source(&self) -> String {
        format!("{{{}{}}}", self.kind.sigil(), self.name)
    }
}

/// Finds every tag in the indexed text, in order
///
/// Tag characters may come from several runs; the offsets address the logical
/// text of the index, so they can be handed straight to range edits.
pub fn scan_tags(index: &TextIndex) -> Vec<Tag> {
    TAG_PATTERN
        .captures_iter(index.text())
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Tag {
                kind: TagKind::from_sigil(caps.get(1).map_or("", |m| m.as_str())),
                name: caps.get(2)?.as_str().to_string(),
                start: index.char_offset(whole.start()),
                end: index.char_offset(whole.end()),
            })
        })
        .collect()
}

/// Section tags matched into open/close pairs
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Pairing {
    /// `(open, close)` indices, sorted by open
    pub pairs: Vec<(usize, usize)>,
    /// Section tags without a partner, sorted
    pub unbalanced: Vec<usize>,
}

/// Pairs section tags by name with a stack
///
/// A close tag matching an outer open tag abandons the opens above it; a close tag
/// matching nothing is unbalanced.
pub fn pair_tags<'t>(tags: impl IntoIterator<Item = &'t Tag>) -> Pairing {
    let mut pairing = Pairing::default();
    let mut stack: Vec<(usize, &str)> = Vec::new();
    for (i, tag) in tags.into_iter().enumerate() {
        if tag.kind.is_open() {
            stack.push((i, tag.name.as_str()));
        } else if tag.kind == TagKind::SectionClose {
            match stack.iter().rposition(|(_, name)| *name == tag.name) {
                Some(at) => {
                    for (abandoned, _) in stack.drain(at + 1..) {
                        pairing.unbalanced.push(abandoned);
                    }
                    if let Some((open, _)) = stack.pop() {
                        pairing.pairs.push((open, i));
                    }
                }
                None => pairing.unbalanced.push(i),
            }
        }
    }
    pairing.unbalanced.extend(stack.into_iter().map(|(i, _)| i));
    pairing.pairs.sort_unstable();
    pairing.unbalanced.sort_unstable();
    pairing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(text: &str) -> Vec<Tag> {
        scan_tags(&TextIndex::from_fragments([text]))
    }

    #[test]
    fn test_scan_all_kinds() {
        let found = tags("Hi {name}, {#items}{ items.price }{/items}{^empty}{@raw}{.}");
        let kinds: Vec<TagKind> = found.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TagKind::Variable,
                TagKind::SectionOpen,
                TagKind::Variable,
                TagKind::SectionClose,
                TagKind::InvertedOpen,
                TagKind::Raw,
                TagKind::Variable,
            ]
        );
        assert_eq!(found[0].name, "name");
        assert_eq!((found[0].start, found[0].end), (3, 9));
        assert_eq!(found[2].name, "items.price");
        assert_eq!(found[6].name, ".");
        assert_eq!(found[1].source(), "{#items}");
    }

    #[test]
    fn test_scan_ignores_malformed() {
        assert!(tags("{} { } {1abc} {a..b} {#} plain").is_empty());
    }

    #[test]
    fn test_offsets_are_characters() {
        let found = tags("héé {x}");
        assert_eq!((found[0].start, found[0].end), (4, 7));
    }

    #[test]
    fn test_split_across_fragments() {
        let index = TextIndex::from_fragments(["Dear {cust", "omer.na", "me},"]);
        let found = scan_tags(&index);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "customer.name");
        assert_eq!(index.locate(found[0].start).map(|l| l.path.inline), Some(0));
        assert_eq!(index.locate(found[0].end - 1).map(|l| l.path.inline), Some(2));
    }

    #[test]
    fn test_pairing_nested() {
        let found = tags("{#a}{#b}{x}{/b}{/a}");
        let pairing = pair_tags(&found);
        assert_eq!(pairing.pairs, vec![(0, 4), (1, 3)]);
        assert!(pairing.unbalanced.is_empty());
    }

    #[test]
    fn test_pairing_unbalanced() {
        let found = tags("{/z}{#a}{#b}{/a}{#c}");
        let pairing = pair_tags(&found);
        assert_eq!(pairing.pairs, vec![(1, 3)]);
        assert_eq!(pairing.unbalanced, vec![0, 2, 4]);
    }
}
