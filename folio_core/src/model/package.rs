//! The document package and the immutable `Document` handle

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use super::content::{visit_paragraphs, Block, NoteKind, Paragraph};
use super::numbering::NumberingDefinitions;
use super::styles::StyleSheet;
use super::theme::{FontTable, Theme};
use crate::ooxml::types::{ContentType, Relationship, RelationshipTable};
use crate::ooxml::xml::XmlElement;

/// Part name of the main document story
pub const MAIN_PART: &str = "word/document.xml";

/// Key of the package-level relationship table (`_rels/.rels`)
pub const PACKAGE_ROOT: &str = "";

/// Namespace declarations written on new story parts
pub const STORY_NAMESPACES: [(&str, &str); 9] = [
    ("xmlns:wpc", "http://schemas.microsoft.com/office/word/2010/wordprocessingCanvas"),
    ("xmlns:mc", "http://schemas.openxmlformats.org/markup-compatibility/2006"),
    ("xmlns:o", "urn:schemas-microsoft-com:office:office"),
    ("xmlns:r", "http://schemas.openxmlformats.org/officeDocument/2006/relationships"),
    ("xmlns:m", "http://schemas.openxmlformats.org/officeDocument/2006/math"),
    ("xmlns:v", "urn:schemas-microsoft-com:vml"),
    ("xmlns:wp", "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"),
    ("xmlns:w10", "urn:schemas-microsoft-com:office:word"),
    ("xmlns:w", "http://schemas.openxmlformats.org/wordprocessingml/2006/main"),
];

/// Namespace declarations for a freshly created story part
pub fn default_story_attributes() -> Vec<(String, String)> {
    STORY_NAMESPACES
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ============================================================================
// Parts
// ============================================================================

/// A binary media part (images and other embedded blobs)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    /// Part name, e.g. `word/media/image1.png`
    pub path: String,
    pub content_type: String,
    pub data: Arc<[u8]>,
}

/// A part kept byte-for-byte (settings, web settings, custom XML, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPart {
    pub content_type: String,
    pub data: Arc<[u8]>,
}

/// A footnote or endnote (`w:footnote` / `w:endnote`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    /// `w:type` (`separator`, `continuationSeparator`, ...); `None` for normal notes
    pub note_type: Option<String>,
    pub content: Vec<Block>,
}

/// The notes of one notes part, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notes {
    pub attributes: Vec<(String, String)>,
    pub entries: BTreeMap<i64, Note>,
}

/// Content of a header or footer part
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderFooter {
    pub attributes: Vec<(String, String)>,
    pub content: Vec<Block>,
}

/// Which pages a header or footer applies to (`w:type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderFooterKind {
    Default,
    First,
    Even,
}

impl HeaderFooterKind {
    pub fn from_attr(value: &str) -> Self {
        match value {
            "first" => HeaderFooterKind::First,
            "even" => HeaderFooterKind::Even,
            _ => HeaderFooterKind::Default,
        }
    }

    pub fn as_attr(&self) -> &'static str {
        match self {
            HeaderFooterKind::Default => "default",
            HeaderFooterKind::First => "first",
            HeaderFooterKind::Even => "even",
        }
    }
}

/// A child of the section properties, in document order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SectionItem {
    /// Header reference; `part` is the header's part name
    HeaderReference { kind: HeaderFooterKind, part: String },
    FooterReference { kind: HeaderFooterKind, part: String },
    PageSize {
        width: u32,
        height: u32,
        orientation: Option<String>,
    },
    PageMargins {
        top: i32,
        right: i32,
        bottom: i32,
        left: i32,
        header: i32,
        footer: i32,
        gutter: i32,
    },
    Other(XmlElement),
}

/// Final section properties (`w:body/w:sectPr`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionProperties {
    pub attributes: Vec<(String, String)>,
    pub items: Vec<SectionItem>,
}

impl SectionProperties {
    /// US Letter, one-inch margins
    pub fn letter() -> Self {
        SectionProperties {
            attributes: Vec::new(),
            items: vec![
                SectionItem::PageSize {
                    width: 12240,
                    height: 15840,
                    orientation: None,
                },
                SectionItem::PageMargins {
                    top: 1440,
                    right: 1440,
                    bottom: 1440,
                    left: 1440,
                    header: 720,
                    footer: 720,
                    gutter: 0,
                },
            ],
        }
    }

    /// Width between the margins in twips
    pub fn text_width(&self) -> Option<u32> {
        let width = self.items.iter().find_map(|item| match item {
            SectionItem::PageSize { width, .. } => Some(*width as i64),
            _ => None,
        })?;
        let (left, right) = self
            .items
            .iter()
            .find_map(|item| match item {
                SectionItem::PageMargins { left, right, .. } => Some((*left as i64, *right as i64)),
                _ => None,
            })
            .unwrap_or((0, 0));
        u32::try_from(width - left - right).ok().filter(|w| *w > 0)
    }
}

/// Core properties (`docProps/core.xml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreProperties {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub keywords: Option<String>,
    pub description: Option<String>,
    pub last_modified_by: Option<String>,
    pub revision: Option<String>,
    pub category: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

// ============================================================================
// Package
// ============================================================================

/// Every part of a word-processing package, as a typed tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPackage {
    /// Content type of the main part (document, macro-enabled document, template)
    pub main_content_type: ContentType,
    /// Root attributes of the main part (namespace declarations, `mc:Ignorable`)
    pub root_attributes: Vec<(String, String)>,
    /// Children of `w:document` other than the body (`w:background`)
    pub document_extras: Vec<XmlElement>,
    pub body: Vec<Block>,
    pub section: SectionProperties,
    pub styles: Arc<StyleSheet>,
    pub theme: Arc<Theme>,
    pub font_table: Arc<FontTable>,
    pub numbering: Option<Arc<NumberingDefinitions>>,
    /// Relationship table of each source part, keyed by part name
    pub relationships: BTreeMap<String, RelationshipTable>,
    pub media: BTreeMap<String, MediaFile>,
    pub footnotes: Option<Notes>,
    pub endnotes: Option<Notes>,
    pub headers: BTreeMap<String, HeaderFooter>,
    pub footers: BTreeMap<String, HeaderFooter>,
    pub properties: Option<CoreProperties>,
    /// Parts kept byte-for-byte, including their own relationship manifests
    pub raw_parts: BTreeMap<String, RawPart>,
}

impl DocumentPackage {
    /// Canonical empty document
    pub fn empty() -> Self {
        let mut relationships = BTreeMap::new();
        relationships.insert(MAIN_PART.to_string(), RelationshipTable::new());
        DocumentPackage {
            main_content_type: ContentType::MainDocument,
            root_attributes: default_story_attributes(),
            document_extras: Vec::new(),
            body: vec![Block::paragraph(Paragraph::new())],
            section: SectionProperties::letter(),
            styles: Arc::new(StyleSheet::builtin()),
            theme: Arc::new(Theme::office()),
            font_table: Arc::new(FontTable::builtin()),
            numbering: None,
            relationships,
            media: BTreeMap::new(),
            footnotes: None,
            endnotes: None,
            headers: BTreeMap::new(),
            footers: BTreeMap::new(),
            properties: Some(CoreProperties::default()),
            raw_parts: BTreeMap::new(),
        }
    }

    /// Dereferences a relationship id of a source part
    pub fn relationship(&self, part: &str, id: &str) -> Option<&Relationship> {
        self.relationships.get(part)?.get(id)
    }

    /// Relationship table of a part, created on demand
    pub fn relationships_mut(&mut self, part: &str) -> &mut RelationshipTable {
        self.relationships.entry(part.to_string()).or_default()
    }

    /// Block indices of the top-level paragraphs, in order
    pub fn paragraph_block_indices(&self) -> Vec<usize> {
        self.body
            .iter()
            .enumerate()
            .filter(|(_, block)| matches!(block, Block::Paragraph(_)))
            .map(|(i, _)| i)
            .collect()
    }

    /// Notes collection of the given kind
    pub fn notes(&self, kind: NoteKind) -> Option<&Notes> {
        match kind {
            NoteKind::Footnote => self.footnotes.as_ref(),
            NoteKind::Endnote => self.endnotes.as_ref(),
        }
    }

    /// Unused media part name with the given extension (`word/media/image3.png`)
    pub fn next_media_name(&self, extension: &str) -> String {
        let mut n = self.media.len() + 1;
        loop {
            let name = format!("word/media/image{}.{}", n, extension);
            if !self.media.contains_key(&name) && !self.raw_parts.contains_key(&name) {
                return name;
            }
            n += 1;
        }
    }
}

// ============================================================================
// Document
// ============================================================================

/// Derived counts, recomputed whenever a new `Document` is built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Paragraphs in the body, including table cells
    pub paragraphs: usize,
    pub words: usize,
    /// Characters of logical text, line breaks and tabs included
    pub characters: usize,
}

impl DocumentStats {
    pub fn compute(body: &[Block]) -> Self {
        let mut stats = DocumentStats::default();
        visit_paragraphs(body, &mut |paragraph| {
            let text = paragraph.text();
            stats.paragraphs += 1;
            stats.characters += text.chars().count();
            stats.words += text.unicode_words().count();
        });
        stats
    }
}

/// An immutable document value
///
/// Cloning is cheap; edits build a new `Document` that shares every untouched
/// subtree with the old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    package: Arc<DocumentPackage>,
    stats: DocumentStats,
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.package, &other.package) || self.package == other.package
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::empty()
    }
}

impl Document {
    pub fn new(package: DocumentPackage) -> Self {
        Self::from_shared(Arc::new(package))
    }

    pub fn from_shared(package: Arc<DocumentPackage>) -> Self {
        let stats = DocumentStats::compute(&package.body);
        Document { package, stats }
    }

    /// One empty paragraph with the built-in styles, theme and a Letter page
    pub fn empty() -> Self {
        Document::new(DocumentPackage::empty())
    }

    pub fn package(&self) -> &DocumentPackage {
        &self.package
    }

    /// Shared handle to the package, for building an edited copy
    pub fn shared_package(&self) -> Arc<DocumentPackage> {
        Arc::clone(&self.package)
    }

    /// Applies `edit` to a copy-on-write package and wraps the result
    pub fn edit<R>(&self, edit: impl FnOnce(&mut DocumentPackage) -> R) -> (Document, R) {
        let mut package = Arc::clone(&self.package);
        let result = edit(Arc::make_mut(&mut package));
        (Document::from_shared(package), result)
    }

    pub fn stats(&self) -> DocumentStats {
        self.stats
    }

    pub fn body(&self) -> &[Block] {
        &self.package.body
    }

    /// Number of addressable (top-level) paragraphs
    pub fn paragraph_count(&self) -> usize {
        self.package
            .body
            .iter()
            .filter(|b| matches!(b, Block::Paragraph(_)))
            .count()
    }

    /// Top-level paragraph by ordinal
    pub fn paragraph(&self, index: usize) -> Option<&Paragraph> {
        self.package
            .body
            .iter()
            .filter_map(Block::as_paragraph)
            .nth(index)
    }

    /// Plain text of the body, one line per paragraph
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.package.body {
            block.collect_text(&mut out);
        }
        out
    }

    pub fn relationship(&self, part: &str, id: &str) -> Option<&Relationship> {
        self.package.relationship(part, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::content::Table;
    use crate::ooxml::types::{RelationshipType, TargetMode};

    #[test]
    fn test_empty_document() {
        let doc = Document::empty();
        assert_eq!(doc.paragraph_count(), 1);
        assert_eq!(doc.paragraph(0).map(Paragraph::len), Some(0));
        assert!(doc.package().styles.contains("Normal"));
        assert_eq!(doc.package().section.text_width(), Some(9360));
        assert_eq!(doc.stats().paragraphs, 1);
    }

    #[test]
    fn test_edit_shares_untouched_blocks() {
        let (doc, _) = Document::empty().edit(|pkg| {
            pkg.body.push(Block::paragraph(Paragraph::with_text("second")));
            pkg.body.push(Block::table(Table::grid_of(1, 1, 1000)));
        });
        let (edited, _) = doc.edit(|pkg| {
            pkg.body[1] = Block::paragraph(Paragraph::with_text("changed"));
        });
        assert_eq!(doc.paragraph(1).map(Paragraph::text).as_deref(), Some("second"));
        assert_eq!(edited.paragraph(1).map(Paragraph::text).as_deref(), Some("changed"));
        match (&doc.body()[2], &edited.body()[2]) {
            (Block::Table(a), Block::Table(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected tables"),
        }
    }

    #[test]
    fn test_stats_count_words() {
        let (doc, _) = Document::empty().edit(|pkg| {
            pkg.body = vec![
                Block::paragraph(Paragraph::with_text("Hello brave new world")),
                Block::paragraph(Paragraph::with_text("Again")),
            ];
        });
        let stats = doc.stats();
        assert_eq!(stats.paragraphs, 2);
        assert_eq!(stats.words, 5);
        assert_eq!(stats.characters, 26);
    }

    #[test]
    fn test_relationship_lookup() {
        let (doc, id) = Document::empty().edit(|pkg| {
            pkg.relationships_mut(MAIN_PART)
                .add(RelationshipType::Hyperlink, "https://example.com", TargetMode::External)
        });
        let rel = doc.relationship(MAIN_PART, &id).unwrap();
        assert_eq!(rel.target, "https://example.com");
        assert!(doc.relationship(MAIN_PART, "rId99").is_none());
    }

    #[test]
    fn test_next_media_name_skips_existing() {
        let mut pkg = DocumentPackage::empty();
        pkg.media.insert(
            "word/media/image2.png".to_string(),
            MediaFile {
                path: "word/media/image2.png".to_string(),
                content_type: "image/png".to_string(),
                data: Arc::from(vec![1u8]),
            },
        );
        assert_eq!(pkg.next_media_name("png"), "word/media/image3.png");
    }
}
