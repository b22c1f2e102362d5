//! Package encoder: a `Document` back into a `.docx` archive
//!
//! Every XML part the model understands is regenerated; media and raw parts are
//! written byte-for-byte. Output is deterministic: the same document always
//! encodes to the same bytes.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::config::EncodeOptions;
use crate::model::{Document, DocumentPackage, NoteKind, MAIN_PART, PACKAGE_ROOT};

use super::body_writer::{story_attributes, StoryWriter};
use super::error::EncodeError;
use super::opc::{relationships_xml, PackageWriter};
use super::parts::{write_core_properties, write_font_table, write_numbering, write_styles, write_theme};
use super::relmap::RelationshipMapper;
use super::types::{
    relationships_part_name, ContentType, Relationship, RelationshipTable, RelationshipType, TargetMode,
    CORE_PROPERTIES_PART, ENDNOTES_PART, FONT_TABLE_PART, FOOTNOTES_PART, NUMBERING_PART, STYLES_PART, THEME_PART,
};
use super::xml::{relationship_prefixes, XmlElement};

/// Encodes a document with default options
pub fn encode(document: &Document) -> Result<Vec<u8>, EncodeError> {
    encode_with(document, &EncodeOptions::default())
}

/// Encodes a document
pub fn encode_with(document: &Document, options: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
    let package = document.package();
    let mut writer = PackageWriter::new();

    // Shared parts; the main part links to each one that is written
    let mut structural = vec![(RelationshipType::Styles, STYLES_PART.to_string())];
    add_xml_part(&mut writer, package, STYLES_PART, ContentType::Styles, &write_styles(&package.styles));
    if let Some(numbering) = &package.numbering {
        structural.push((RelationshipType::Numbering, NUMBERING_PART.to_string()));
        add_xml_part(&mut writer, package, NUMBERING_PART, ContentType::Numbering, &write_numbering(numbering));
    }
    structural.push((RelationshipType::FontTable, FONT_TABLE_PART.to_string()));
    add_xml_part(
        &mut writer,
        package,
        FONT_TABLE_PART,
        ContentType::FontTable,
        &write_font_table(&package.font_table),
    );
    match write_theme(&package.theme) {
        Ok(theme) => {
            structural.push((RelationshipType::Theme, THEME_PART.to_string()));
            add_xml_part(&mut writer, package, THEME_PART, ContentType::Theme, &theme);
        }
        Err(e) => warn!("Skipping theme part: {}", e),
    }

    // Notes
    let no_stories = BTreeMap::new();
    for (kind, notes, part, content_type, rel_type) in [
        (
            NoteKind::Footnote,
            &package.footnotes,
            FOOTNOTES_PART,
            ContentType::Footnotes,
            RelationshipType::Footnotes,
        ),
        (
            NoteKind::Endnote,
            &package.endnotes,
            ENDNOTES_PART,
            ContentType::Endnotes,
            RelationshipType::Endnotes,
        ),
    ] {
        let Some(notes) = notes else {
            continue;
        };
        let attributes = story_attributes(&notes.attributes);
        let root = StoryWriter::new(&attributes, &no_stories).write_notes(notes, kind);
        write_story(&mut writer, package, part, content_type, root, &[]);
        structural.push((rel_type, part.to_string()));
    }

    // Headers and footers keep their part names
    let main_rels = main_relationships(package);
    for (stories, root_name, content_type) in [
        (&package.headers, "w:hdr", ContentType::Header),
        (&package.footers, "w:ftr", ContentType::Footer),
    ] {
        for (part, story) in stories {
            let mut root = XmlElement::new(root_name);
            root.attributes = story_attributes(&story.attributes);
            let story_writer = StoryWriter::new(&root.attributes, &no_stories);
            for block in story_writer.write_blocks(&story.content) {
                root = root.with_child(block);
            }
            write_story(&mut writer, package, part, content_type.clone(), root, &[]);
        }
    }

    // Main document
    let story_ids: BTreeMap<String, String> = main_rels
        .iter()
        .filter(|rel| matches!(rel.rel_type, RelationshipType::Header | RelationshipType::Footer))
        .fold(BTreeMap::new(), |mut ids, rel| {
            ids.entry(rel.target.clone()).or_insert_with(|| rel.id.clone());
            ids
        });
    let mut root = XmlElement::new("w:document");
    root.attributes = story_attributes(&package.root_attributes);
    let story_writer = StoryWriter::new(&root.attributes, &story_ids);
    let mut body = XmlElement::new("w:body");
    for block in story_writer.write_blocks(&package.body) {
        body = body.with_child(block);
    }
    body = body.with_child(story_writer.write_section(&package.section));
    for extra in &package.document_extras {
        root = root.with_child(extra.clone());
    }
    root = root.with_child(body);
    let main_content_type = package.main_content_type.clone();
    write_story_with(&mut writer, MAIN_PART, main_content_type, root, &main_rels, &structural);

    // Package relationships
    if let Some(properties) = &package.properties {
        writer.add_part(
            CORE_PROPERTIES_PART,
            ContentType::CoreProperties.as_str(),
            write_core_properties(properties).to_document_bytes(),
        );
    }
    let root_rels = package_relationships(package);
    writer.add_relationships(
        &relationships_part_name(PACKAGE_ROOT),
        relationships_xml(PACKAGE_ROOT, root_rels.iter()),
    );

    // Binary parts
    for (name, media) in &package.media {
        writer.add_media(name, &media.content_type, media.data.to_vec());
    }
    for (name, raw) in &package.raw_parts {
        if writer.contains(name) {
            debug!("Raw part {} shadowed by a regenerated part", name);
            continue;
        }
        writer.add_media(name, &raw.content_type, raw.data.to_vec());
    }

    debug!("Encoding package with {} parts", writer.part_count());
    writer.finish(options)
}

/// Adds a non-story XML part with its relationships unchanged
fn add_xml_part(
    writer: &mut PackageWriter,
    package: &DocumentPackage,
    part: &str,
    content_type: ContentType,
    root: &XmlElement,
) {
    writer.add_part(part, content_type.as_str(), root.to_document_bytes());
    if let Some(rels) = package.relationships.get(part).filter(|rels| !rels.is_empty()) {
        writer.add_relationships(&relationships_part_name(part), relationships_xml(part, rels.iter()));
    }
}

fn write_story(
    writer: &mut PackageWriter,
    package: &DocumentPackage,
    part: &str,
    content_type: ContentType,
    root: XmlElement,
    structural: &[(RelationshipType, String)],
) {
    let rels = package.relationships.get(part).cloned().unwrap_or_default();
    write_story_with(writer, part, content_type, root, &rels, structural);
}

/// Renumbers the story's relationship ids over its finished tree and adds it
fn write_story_with(
    writer: &mut PackageWriter,
    part: &str,
    content_type: ContentType,
    mut root: XmlElement,
    rels: &RelationshipTable,
    structural: &[(RelationshipType, String)],
) {
    let prefixes = relationship_prefixes(&root.attributes);
    let mut referenced = Vec::new();
    root.collect_relationship_ids(&prefixes, &mut referenced);
    let mapper = RelationshipMapper::build(rels, &referenced, structural);
    root.rewrite_relationship_ids(&prefixes, &mut |id| mapper.get(id).map(str::to_string));

    writer.add_part(part, content_type.as_str(), root.to_document_bytes());
    if !mapper.table().is_empty() {
        writer.add_relationships(
            &relationships_part_name(part),
            relationships_xml(part, mapper.table().iter()),
        );
    }
    debug!("Wrote {} ({} relationships)", part, mapper.table().len());
}

/// Main-part relationships before renumbering
///
/// Structural relationships are dropped (they are regenerated), as are header
/// and footer relationships to parts the package no longer holds. Headers and
/// footers without a relationship get one.
fn main_relationships(package: &DocumentPackage) -> RelationshipTable {
    let mut rels = package.relationships.get(MAIN_PART).cloned().unwrap_or_default();
    rels.retain(|rel| match rel.rel_type {
        RelationshipType::Header => package.headers.contains_key(&rel.target),
        RelationshipType::Footer => package.footers.contains_key(&rel.target),
        ref other => !other.is_regenerated(),
    });
    for (rel_type, parts) in [
        (RelationshipType::Header, &package.headers),
        (RelationshipType::Footer, &package.footers),
    ] {
        for part in parts.keys() {
            let linked = rels
                .iter()
                .any(|rel| rel.rel_type == rel_type && rel.mode == TargetMode::Internal && &rel.target == part);
            if !linked {
                rels.add(rel_type.clone(), part.as_str(), TargetMode::Internal);
            }
        }
    }
    rels
}

/// `_rels/.rels`: the main part, core properties, then every preserved relationship
fn package_relationships(package: &DocumentPackage) -> RelationshipTable {
    let mut rels = RelationshipTable::new();
    rels.insert(Relationship {
        id: "rId1".to_string(),
        rel_type: RelationshipType::OfficeDocument,
        target: MAIN_PART.to_string(),
        mode: TargetMode::Internal,
    });
    if package.properties.is_some() {
        rels.add(RelationshipType::CoreProperties, CORE_PROPERTIES_PART, TargetMode::Internal);
    }
    if let Some(preserved) = package.relationships.get(PACKAGE_ROOT) {
        let mapper = RelationshipMapper::build(preserved, &[], &[]);
        for rel in mapper.table().iter().filter(|rel| {
            !matches!(
                rel.rel_type,
                RelationshipType::OfficeDocument | RelationshipType::CoreProperties
            )
        }) {
            rels.add(rel.rel_type.clone(), rel.target.as_str(), rel.mode);
        }
    }
    rels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, Hyperlink, Inline, LinkTarget, MediaFile, Paragraph, RawPart, Run};
    use crate::ooxml::document::decode;
    use crate::ooxml::opc::OpcPackage;
    use std::sync::Arc;

    fn part_text(bytes: &[u8], name: &str) -> String {
        let package = OpcPackage::open(bytes, u64::MAX).unwrap();
        String::from_utf8(package.part(name).unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_encode_empty_document() {
        let bytes = encode(&Document::empty()).unwrap();
        let package = OpcPackage::open(&bytes, u64::MAX).unwrap();
        for name in [
            "[Content_Types].xml",
            "_rels/.rels",
            MAIN_PART,
            "word/_rels/document.xml.rels",
            STYLES_PART,
            FONT_TABLE_PART,
            THEME_PART,
            CORE_PROPERTIES_PART,
        ] {
            assert!(package.contains(name), "missing {}", name);
        }
        let root = package.relationships(PACKAGE_ROOT).unwrap();
        assert_eq!(root.get("rId1").map(|r| r.target.as_str()), Some(MAIN_PART));
        assert_eq!(
            root.get("rId2").map(|r| r.rel_type.clone()),
            Some(RelationshipType::CoreProperties)
        );
        let doc_rels = package.relationships(MAIN_PART).unwrap();
        assert_eq!(
            doc_rels.get("rId1").map(|r| r.rel_type.clone()),
            Some(RelationshipType::Styles)
        );
    }

    #[test]
    fn test_encode_is_deterministic() {
        let doc = Document::empty();
        assert_eq!(encode(&doc).unwrap(), encode(&doc).unwrap());
    }

    #[test]
    fn test_referenced_relationships_renumbered_first() {
        let (doc, _) = Document::empty().edit(|pkg| {
            let rels = pkg.relationships_mut(MAIN_PART);
            rels.insert(Relationship {
                id: "rId7".to_string(),
                rel_type: RelationshipType::Settings,
                target: "word/settings.xml".to_string(),
                mode: TargetMode::Internal,
            });
            rels.insert(Relationship {
                id: "rId9".to_string(),
                rel_type: RelationshipType::Hyperlink,
                target: "https://example.com".to_string(),
                mode: TargetMode::External,
            });
            pkg.raw_parts.insert(
                "word/settings.xml".to_string(),
                RawPart {
                    content_type: ContentType::Settings.as_str().to_string(),
                    data: Arc::from(b"<w:settings/>".to_vec()),
                },
            );
            pkg.body = vec![Block::paragraph(Paragraph {
                content: vec![
                    Inline::Hyperlink(Hyperlink {
                        target: LinkTarget::Broken("rId1".to_string()),
                        anchor: None,
                        tooltip: None,
                        history: None,
                        runs: vec![Run::text("dead")],
                    }),
                    Inline::Hyperlink(Hyperlink {
                        target: LinkTarget::Relationship("rId9".to_string()),
                        anchor: None,
                        tooltip: None,
                        history: None,
                        runs: vec![Run::text("live")],
                    }),
                ],
                ..Default::default()
            })];
        });
        let bytes = encode(&doc).unwrap();
        let xml = part_text(&bytes, MAIN_PART);
        // rId1 is held by the broken link, so the live link becomes rId2
        assert!(xml.contains(r#"<w:hyperlink r:id="rId1">"#));
        assert!(xml.contains(r#"<w:hyperlink r:id="rId2">"#));
        let package = OpcPackage::open(&bytes, u64::MAX).unwrap();
        let rels = package.relationships(MAIN_PART).unwrap();
        assert_eq!(rels.get("rId2").map(|r| r.target.as_str()), Some("https://example.com"));
        assert_eq!(rels.get("rId3").map(|r| r.target.as_str()), Some("word/settings.xml"));
        assert_eq!(rels.get("rId4").map(|r| r.rel_type.clone()), Some(RelationshipType::Styles));
        assert!(rels.get("rId1").is_none());
        assert_eq!(package.part("word/settings.xml"), Some(&b"<w:settings/>"[..]));
    }

    #[test]
    fn test_media_written_byte_for_byte() {
        let (doc, _) = Document::empty().edit(|pkg| {
            pkg.media.insert(
                "word/media/image1.png".to_string(),
                MediaFile {
                    path: "word/media/image1.png".to_string(),
                    content_type: "image/png".to_string(),
                    data: Arc::from(vec![0x89, b'P', b'N', b'G', 0, 1, 2]),
                },
            );
        });
        let bytes = encode(&doc).unwrap();
        let package = OpcPackage::open(&bytes, u64::MAX).unwrap();
        assert_eq!(package.part("word/media/image1.png"), Some(&[0x89, b'P', b'N', b'G', 0, 1, 2][..]));
        assert_eq!(package.content_type_str("word/media/image1.png"), Some("image/png"));
    }

    #[test]
    fn test_reencode_is_byte_identical() {
        let (doc, _) = Document::empty().edit(|pkg| {
            pkg.body.push(Block::paragraph(Paragraph::with_text("  spaced  text ")));
            pkg.body.push(Block::table(crate::model::Table::grid_of(2, 2, 4000)));
        });
        let first = encode(&doc).unwrap();
        let decoded = decode(&first).unwrap();
        assert!(decoded.warnings.is_empty(), "{:?}", decoded.warnings);
        let second = encode(&decoded.document).unwrap();
        assert_eq!(first, second);
    }
}
