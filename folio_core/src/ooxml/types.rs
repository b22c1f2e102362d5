use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content types defined in [Content_Types].xml
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    /// Main document body (word/document.xml)
    MainDocument,
    /// Macro-enabled main document body
    MainDocumentMacro,
    /// Template main document body
    MainTemplate,
    /// Document styles (word/styles.xml)
    Styles,
    /// Theme colors and fonts (word/theme/theme1.xml)
    Theme,
    /// Document settings (word/settings.xml)
    Settings,
    /// Font table (word/fontTable.xml)
    FontTable,
    /// Core properties (docProps/core.xml)
    CoreProperties,
    /// App properties (docProps/app.xml)
    AppProperties,
    /// Web settings (word/webSettings.xml)
    WebSettings,
    /// Numbering definitions (word/numbering.xml)
    Numbering,
    /// Footnotes part
    Footnotes,
    /// Endnotes part
    Endnotes,
    /// Header part
    Header,
    /// Footer part
    Footer,
    /// Relationships file
    Relationships,
    /// Generic XML
    Xml,
    /// Any image/* type
    Image(String),
    /// Unknown content type
    Unknown(String),
}

impl ContentType {
    /// Parse content type string into enum
    pub fn from_string(s: &str) -> Self {
        match s {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml" => ContentType::MainDocument,
            "application/vnd.ms-word.document.macroEnabled.main+xml" => ContentType::MainDocumentMacro,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.template.main+xml" => ContentType::MainTemplate,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml" => ContentType::Styles,
            "application/vnd.openxmlformats-officedocument.theme+xml" => ContentType::Theme,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml" => ContentType::Settings,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.fontTable+xml" => ContentType::FontTable,
            "application/vnd.openxmlformats-package.core-properties+xml" => ContentType::CoreProperties,
            "application/vnd.openxmlformats-officedocument.extended-properties+xml" => ContentType::AppProperties,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.webSettings+xml" => ContentType::WebSettings,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml" => ContentType::Numbering,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.footnotes+xml" => ContentType::Footnotes,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.endnotes+xml" => ContentType::Endnotes,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml" => ContentType::Header,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml" => ContentType::Footer,
            "application/vnd.openxmlformats-package.relationships+xml" => ContentType::Relationships,
            "application/xml" => ContentType::Xml,
            image if image.starts_with("image/") => ContentType::Image(image.to_string()),
            _ => ContentType::Unknown(s.to_string()),
        }
    }

    /// MIME string written back to the manifest
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::MainDocument => "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
            ContentType::MainDocumentMacro => "application/vnd.ms-word.document.macroEnabled.main+xml",
            ContentType::MainTemplate => "application/vnd.openxmlformats-officedocument.wordprocessingml.template.main+xml",
            ContentType::Styles => "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml",
            ContentType::Theme => "application/vnd.openxmlformats-officedocument.theme+xml",
            ContentType::Settings => "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml",
            ContentType::FontTable => "application/vnd.openxmlformats-officedocument.wordprocessingml.fontTable+xml",
            ContentType::CoreProperties => "application/vnd.openxmlformats-package.core-properties+xml",
            ContentType::AppProperties => "application/vnd.openxmlformats-officedocument.extended-properties+xml",
            ContentType::WebSettings => "application/vnd.openxmlformats-officedocument.wordprocessingml.webSettings+xml",
            ContentType::Numbering => "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml",
            ContentType::Footnotes => "application/vnd.openxmlformats-officedocument.wordprocessingml.footnotes+xml",
            ContentType::Endnotes => "application/vnd.openxmlformats-officedocument.wordprocessingml.endnotes+xml",
            ContentType::Header => "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml",
            ContentType::Footer => "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml",
            ContentType::Relationships => "application/vnd.openxmlformats-package.relationships+xml",
            ContentType::Xml => "application/xml",
            ContentType::Image(mime) | ContentType::Unknown(mime) => mime,
        }
    }

    /// Check if this is an image content type
    pub fn is_image(&self) -> bool {
        matches!(self, ContentType::Image(_))
    }

    /// Check if this is one of the main-document types
    pub fn is_main_document(&self) -> bool {
        matches!(
            self,
            ContentType::MainDocument | ContentType::MainDocumentMacro | ContentType::MainTemplate
        )
    }

    /// Guesses an image content type from a file extension
    pub fn for_image_extension(extension: &str) -> Self {
        let mime = match extension.to_ascii_lowercase().as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" | "jpe" => "image/jpeg",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            "tif" | "tiff" => "image/tiff",
            "svg" => "image/svg+xml",
            "webp" => "image/webp",
            "emf" => "image/x-emf",
            "wmf" => "image/x-wmf",
            _ => "application/octet-stream",
        };
        ContentType::from_string(mime)
    }
}

/// Relationship type constants (ECMA-376)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationshipType {
    /// Office document relationship
    OfficeDocument,
    /// Core properties relationship
    CoreProperties,
    /// Extended (app) properties relationship
    ExtendedProperties,
    /// Styles relationship
    Styles,
    /// Theme relationship
    Theme,
    /// Settings relationship
    Settings,
    /// Web settings relationship
    WebSettings,
    /// Font table relationship
    FontTable,
    /// Numbering relationship
    Numbering,
    /// Footnotes relationship
    Footnotes,
    /// Endnotes relationship
    Endnotes,
    /// Header relationship
    Header,
    /// Footer relationship
    Footer,
    /// Hyperlink relationship
    Hyperlink,
    /// Image relationship
    Image,
    /// Custom XML relationship
    CustomXml,
    /// Thumbnail relationship
    Thumbnail,
    /// Unknown relationship type
    Unknown(String),
}

const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/";

impl RelationshipType {
    /// Parse relationship type string into enum
    pub fn from_string(s: &str) -> Self {
        match s {
            "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties"
            | "http://schemas.openxmlformats.org/officedocument/2006/relationships/metadata/core-properties" => {
                RelationshipType::CoreProperties
            }
            "http://schemas.openxmlformats.org/package/2006/relationships/metadata/thumbnail" => RelationshipType::Thumbnail,
            _ => match s.strip_prefix(REL_BASE) {
                Some("officeDocument") => RelationshipType::OfficeDocument,
                Some("extended-properties") => RelationshipType::ExtendedProperties,
                Some("styles") => RelationshipType::Styles,
                Some("theme") => RelationshipType::Theme,
                Some("settings") => RelationshipType::Settings,
                Some("webSettings") => RelationshipType::WebSettings,
                Some("fontTable") => RelationshipType::FontTable,
                Some("numbering") => RelationshipType::Numbering,
                Some("footnotes") => RelationshipType::Footnotes,
                Some("endnotes") => RelationshipType::Endnotes,
                Some("header") => RelationshipType::Header,
                Some("footer") => RelationshipType::Footer,
                Some("hyperlink") => RelationshipType::Hyperlink,
                Some("image") => RelationshipType::Image,
                Some("customXml") => RelationshipType::CustomXml,
                _ => RelationshipType::Unknown(s.to_string()),
            },
        }
    }

    /// Type URI written back to relationship manifests
    pub fn uri(&self) -> String {
        let suffix = match self {
            RelationshipType::CoreProperties => {
                return "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties".to_string()
            }
            RelationshipType::Thumbnail => {
                return "http://schemas.openxmlformats.org/package/2006/relationships/metadata/thumbnail".to_string()
            }
            RelationshipType::Unknown(uri) => return uri.clone(),
            RelationshipType::OfficeDocument => "officeDocument",
            RelationshipType::ExtendedProperties => "extended-properties",
            RelationshipType::Styles => "styles",
            RelationshipType::Theme => "theme",
            RelationshipType::Settings => "settings",
            RelationshipType::WebSettings => "webSettings",
            RelationshipType::FontTable => "fontTable",
            RelationshipType::Numbering => "numbering",
            RelationshipType::Footnotes => "footnotes",
            RelationshipType::Endnotes => "endnotes",
            RelationshipType::Header => "header",
            RelationshipType::Footer => "footer",
            RelationshipType::Hyperlink => "hyperlink",
            RelationshipType::Image => "image",
            RelationshipType::CustomXml => "customXml",
        };
        format!("{}{}", REL_BASE, suffix)
    }

    /// Check if this is an image relationship type
    pub fn is_image(&self) -> bool {
        matches!(self, RelationshipType::Image)
    }

    /// Relationships whose target part the encoder regenerates from the model
    pub fn is_regenerated(&self) -> bool {
        matches!(
            self,
            RelationshipType::Styles
                | RelationshipType::Theme
                | RelationshipType::FontTable
                | RelationshipType::Numbering
                | RelationshipType::Footnotes
                | RelationshipType::Endnotes
        )
    }
}

/// Whether a relationship points inside the package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetMode {
    #[default]
    Internal,
    External,
}

/// Represents a relationship between parts in the package
///
/// Internal targets are stored as absolute part names without a leading slash
/// (`word/media/image1.png`); external targets keep the URI as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1"), unique within its source part
    pub id: String,
    /// Type of relationship
    pub rel_type: RelationshipType,
    /// Target part name or external URI
    pub target: String,
    /// Target mode (Internal or External)
    pub mode: TargetMode,
}

/// Relationships of one source part, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipTable {
    entries: BTreeMap<String, Relationship>,
}

impl RelationshipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks a relationship up by id
    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.entries.get(id)
    }

    /// Inserts a relationship, replacing any entry with the same id
    pub fn insert(&mut self, relationship: Relationship) {
        self.entries.insert(relationship.id.clone(), relationship);
    }

    /// Adds a relationship under a fresh id and returns that id
    pub fn add(&mut self, rel_type: RelationshipType, target: impl Into<String>, mode: TargetMode) -> String {
        let id = self.next_id();
        self.insert(Relationship {
            id: id.clone(),
            rel_type,
            target: target.into(),
            mode,
        });
        id
    }

    /// First `rIdN` not used by this table
    pub fn next_id(&self) -> String {
        let max = self
            .entries
            .keys()
            .filter_map(|id| id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
            .max()
            .unwrap_or(0);
        format!("rId{}", max + 1)
    }

    /// Iterates in id order
    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.entries.values()
    }

    /// First relationship of the given type
    pub fn find_by_type(&self, rel_type: &RelationshipType) -> Option<&Relationship> {
        self.entries.values().find(|r| &r.rel_type == rel_type)
    }

    pub fn remove(&mut self, id: &str) -> Option<Relationship> {
        self.entries.remove(id)
    }

    /// Keeps only the relationships matching `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&Relationship) -> bool) {
        self.entries.retain(|_, rel| keep(rel));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Part names used for regenerated parts
pub const STYLES_PART: &str = "word/styles.xml";
pub const NUMBERING_PART: &str = "word/numbering.xml";
pub const FONT_TABLE_PART: &str = "word/fontTable.xml";
pub const THEME_PART: &str = "word/theme/theme1.xml";
pub const FOOTNOTES_PART: &str = "word/footnotes.xml";
pub const ENDNOTES_PART: &str = "word/endnotes.xml";
pub const CORE_PROPERTIES_PART: &str = "docProps/core.xml";

/// Normalizes a part name: no leading slash, `.` and `..` segments resolved
pub fn normalize_part_name(name: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Directory of a part (`word` for `word/document.xml`)
pub fn part_directory(part: &str) -> &str {
    part.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Resolves a relationship target written relative to its source part
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize_part_name(absolute);
    }
    let dir = part_directory(source_part);
    if dir.is_empty() {
        normalize_part_name(target)
    } else {
        normalize_part_name(&format!("{}/{}", dir, target))
    }
}

/// Writes a part name relative to the directory of `source_part`
pub fn relative_target(source_part: &str, target_part: &str) -> String {
    let source_dir: Vec<&str> = part_directory(source_part)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let target: Vec<&str> = target_part.split('/').filter(|s| !s.is_empty()).collect();
    let common = source_dir
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<&str> = Vec::new();
    for _ in common..source_dir.len() {
        parts.push("..");
    }
    parts.extend(target[common..].iter().copied());
    parts.join("/")
}

/// Location of the relationships manifest for a part (`word/_rels/document.xml.rels`)
pub fn relationships_part_name(source_part: &str) -> String {
    if source_part.is_empty() {
        return "_rels/.rels".to_string();
    }
    match source_part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", source_part),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parsing() {
        let ct = ContentType::from_string(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
        );
        assert_eq!(ct, ContentType::MainDocument);
        assert!(ct.is_main_document());
        assert_eq!(ContentType::from_string("image/png"), ContentType::Image("image/png".to_string()));
        assert_eq!(ContentType::from_string("unknown/type"), ContentType::Unknown("unknown/type".to_string()));
    }

    #[test]
    fn test_relationship_type_round_trip() {
        for rel in [
            RelationshipType::OfficeDocument,
            RelationshipType::Styles,
            RelationshipType::Header,
            RelationshipType::Hyperlink,
            RelationshipType::CoreProperties,
        ] {
            assert_eq!(RelationshipType::from_string(&rel.uri()), rel);
        }
        let rt = RelationshipType::from_string("unknown/type");
        assert_eq!(rt, RelationshipType::Unknown("unknown/type".to_string()));
    }

    #[test]
    fn test_relationship_table_next_id() {
        let mut table = RelationshipTable::new();
        assert_eq!(table.next_id(), "rId1");
        table.insert(Relationship {
            id: "rId7".to_string(),
            rel_type: RelationshipType::Image,
            target: "word/media/image1.png".to_string(),
            mode: TargetMode::Internal,
        });
        let id = table.add(RelationshipType::Hyperlink, "https://example.com", TargetMode::External);
        assert_eq!(id, "rId8");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_resolve_and_relative_targets() {
        assert_eq!(resolve_target("word/document.xml", "media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve_target("word/document.xml", "../customXml/item1.xml"), "customXml/item1.xml");
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
        assert_eq!(resolve_target("word/document.xml", "/word/styles.xml"), "word/styles.xml");
        assert_eq!(relative_target("word/document.xml", "word/theme/theme1.xml"), "theme/theme1.xml");
        assert_eq!(relative_target("word/document.xml", "customXml/item1.xml"), "../customXml/item1.xml");
        assert_eq!(relative_target("", "docProps/core.xml"), "docProps/core.xml");
    }

    #[test]
    fn test_relationships_part_name() {
        assert_eq!(relationships_part_name("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(relationships_part_name(""), "_rels/.rels");
    }
}
