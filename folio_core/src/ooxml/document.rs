//! Package decoder: a `.docx` archive into a `Document`
//!
//! Only a missing or unreadable container, manifest or main part is fatal. Every
//! other problem is recorded as a `Warning` and decoding continues with a
//! default or with the part treated as absent.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::DecodeOptions;
use crate::model::{
    Document, DocumentPackage, FontTable, HeaderFooter, MediaFile, Note, NoteKind, Notes, RawPart,
    SectionProperties, StyleSheet, Theme, MAIN_PART, PACKAGE_ROOT,
};
use crate::warning::Warning;

use super::body::{NoteIds, StoryReader};
use super::error::DecodeError;
use super::opc::{OpcPackage, CONTENT_TYPES_PART, ROOT_RELATIONSHIPS_PART};
use super::parts::{read_core_properties, read_font_table, read_numbering, read_styles, read_theme};
use super::types::{
    relationships_part_name, ContentType, RelationshipTable, RelationshipType, TargetMode, CORE_PROPERTIES_PART,
    ENDNOTES_PART, FONT_TABLE_PART, FOOTNOTES_PART, NUMBERING_PART, STYLES_PART, THEME_PART,
};
use super::xml::XmlElement;

/// Result of a successful decode
#[derive(Debug, Clone)]
pub struct Decoded {
    pub document: Document,
    /// Problems that were worked around, in the order they were found
    pub warnings: Vec<Warning>,
}

/// Decodes a `.docx` archive with default options
pub fn decode(data: &[u8]) -> Result<Decoded, DecodeError> {
    decode_with(data, &DecodeOptions::default())
}

/// Decodes a `.docx` archive
pub fn decode_with(data: &[u8], options: &DecodeOptions) -> Result<Decoded, DecodeError> {
    let package = OpcPackage::open(data, options.max_part_size)?;
    let decoder = Decoder {
        package: &package,
        options,
        warnings: Vec::new(),
        consumed: BTreeSet::new(),
    };
    decoder.run()
}

struct Decoder<'a> {
    package: &'a OpcPackage,
    options: &'a DecodeOptions,
    warnings: Vec<Warning>,
    /// Parts turned into typed model content; everything else is kept raw
    consumed: BTreeSet<String>,
}

impl<'a> Decoder<'a> {
    fn run(mut self) -> Result<Decoded, DecodeError> {
        let root_rels = self
            .package
            .relationships(PACKAGE_ROOT)
            .map_err(|e| DecodeError::MalformedPart {
                part: ROOT_RELATIONSHIPS_PART.to_string(),
                message: e.to_string(),
            })?;
        let main_name = root_rels
            .find_by_type(&RelationshipType::OfficeDocument)
            .map(|rel| rel.target.clone())
            .ok_or(DecodeError::MissingMainPart)?;
        let main_data = match self.package.part(&main_name) {
            Some(data) => data,
            None if self.package.is_oversized(&main_name) => {
                return Err(DecodeError::MalformedPart {
                    part: main_name,
                    message: "part exceeds the configured size limit".to_string(),
                })
            }
            None => return Err(DecodeError::MissingPart(main_name)),
        };
        let main_root = XmlElement::parse(main_data).map_err(|e| DecodeError::MalformedPart {
            part: main_name.clone(),
            message: e.to_string(),
        })?;
        self.consumed.insert(main_name.clone());
        debug!("Main document part: {}", main_name);

        let mut package = DocumentPackage::empty();
        package.main_content_type = self
            .package
            .content_type(&main_name)
            .filter(ContentType::is_main_document)
            .unwrap_or(ContentType::MainDocument);

        let mut doc_rels = self.relationships_of(&main_name);

        // Shared parts
        let styles_target = self.target_of(&doc_rels, RelationshipType::Styles);
        package.styles = Arc::new(
            self.xml_part(styles_target.as_deref(), STYLES_PART, &mut package.relationships)
                .map(|root| read_styles(&root))
                .unwrap_or_else(StyleSheet::builtin),
        );
        let theme_target = self.target_of(&doc_rels, RelationshipType::Theme);
        package.theme = Arc::new(
            self.xml_part(theme_target.as_deref(), THEME_PART, &mut package.relationships)
                .map(|root| read_theme(&root))
                .unwrap_or_else(Theme::office),
        );
        let fonts_target = self.target_of(&doc_rels, RelationshipType::FontTable);
        package.font_table = Arc::new(
            self.xml_part(fonts_target.as_deref(), FONT_TABLE_PART, &mut package.relationships)
                .map(|root| read_font_table(&root))
                .unwrap_or_else(FontTable::builtin),
        );
        let numbering_target = self.target_of(&doc_rels, RelationshipType::Numbering);
        if let Some(root) = self.xml_part(numbering_target.as_deref(), NUMBERING_PART, &mut package.relationships) {
            let source = numbering_target.as_deref().unwrap_or(NUMBERING_PART);
            package.numbering = Some(Arc::new(read_numbering(&root, source, &mut self.warnings)));
        }

        // Notes: ids first so that references can be checked
        let footnotes_target = self.target_of(&doc_rels, RelationshipType::Footnotes);
        let endnotes_target = self.target_of(&doc_rels, RelationshipType::Endnotes);
        let footnotes_root =
            self.xml_part(footnotes_target.as_deref(), FOOTNOTES_PART, &mut package.relationships);
        let endnotes_root = self.xml_part(endnotes_target.as_deref(), ENDNOTES_PART, &mut package.relationships);
        let note_ids = NoteIds {
            footnotes: collect_note_ids(footnotes_root.as_ref(), "footnote"),
            endnotes: collect_note_ids(endnotes_root.as_ref(), "endnote"),
        };
        let no_stories = BTreeSet::new();
        if let (Some(root), Some(source)) = (&footnotes_root, &footnotes_target) {
            package.footnotes = Some(self.read_notes(root, source, FOOTNOTES_PART, NoteKind::Footnote, &package.relationships, &note_ids, &no_stories));
        }
        if let (Some(root), Some(source)) = (&endnotes_root, &endnotes_target) {
            package.endnotes = Some(self.read_notes(root, source, ENDNOTES_PART, NoteKind::Endnote, &package.relationships, &note_ids, &no_stories));
        }

        // Headers and footers keep their part names
        let stories: Vec<(RelationshipType, String)> = doc_rels
            .iter()
            .filter(|rel| {
                rel.mode == TargetMode::Internal
                    && matches!(rel.rel_type, RelationshipType::Header | RelationshipType::Footer)
            })
            .map(|rel| (rel.rel_type.clone(), rel.target.clone()))
            .collect();
        for (rel_type, part) in stories {
            if self.consumed.contains(&part) {
                continue;
            }
            let Some(root) = self.xml_part(Some(&part), &part, &mut package.relationships) else {
                continue;
            };
            let rels = package.relationships.get(&part).cloned().unwrap_or_default();
            let mut reader = StoryReader::new(
                &part,
                &root,
                &rels,
                &note_ids,
                &no_stories,
                self.options,
                &mut self.warnings,
            );
            let story = HeaderFooter {
                attributes: root.attributes.clone(),
                content: reader.read_blocks(root.elements()),
            };
            debug!("Decoded {} ({} blocks)", part, story.content.len());
            if rel_type == RelationshipType::Header {
                package.headers.insert(part, story);
            } else {
                package.footers.insert(part, story);
            }
        }
        let story_names: BTreeSet<String> = package.headers.keys().chain(package.footers.keys()).cloned().collect();

        // Body
        package.root_attributes = main_root.attributes.clone();
        package.document_extras = Vec::new();
        let mut body = None;
        for child in main_root.elements() {
            if child.local_name() == "body" && body.is_none() {
                body = Some(child);
            } else {
                package.document_extras.push(child.clone());
            }
        }
        let body = body.ok_or_else(|| DecodeError::MalformedPart {
            part: main_name.clone(),
            message: "document has no body".to_string(),
        })?;
        {
            let mut reader = StoryReader::new(
                &main_name,
                &main_root,
                &doc_rels,
                &note_ids,
                &story_names,
                self.options,
                &mut self.warnings,
            );
            let elements: Vec<&XmlElement> = body.elements().collect();
            let (content, section) = match elements.split_last() {
                Some((last, rest)) if last.local_name() == "sectPr" => (rest, Some(*last)),
                _ => (elements.as_slice(), None),
            };
            package.body = reader.read_blocks(content.iter().copied());
            package.section = match section {
                Some(element) => reader.read_section(element),
                None => SectionProperties::default(),
            };
        }
        debug!("Decoded body: {} blocks", package.body.len());

        // Core properties
        let core_target = self.target_of(&root_rels, RelationshipType::CoreProperties);
        package.properties = self
            .xml_part(core_target.as_deref(), CORE_PROPERTIES_PART, &mut package.relationships)
            .map(|root| read_core_properties(&root));

        // Relationship tables: structural relationships are regenerated on encode
        doc_rels.retain(|rel| !rel.rel_type.is_regenerated());
        package.relationships.insert(MAIN_PART.to_string(), doc_rels);
        let mut package_rels = root_rels;
        package_rels.retain(|rel| {
            !matches!(
                rel.rel_type,
                RelationshipType::OfficeDocument | RelationshipType::CoreProperties
            )
        });
        package.relationships.insert(PACKAGE_ROOT.to_string(), package_rels);

        self.collect_binary_parts(&mut package);

        for name in self.package.oversized_parts() {
            if !self.consumed.contains(name) {
                self.warnings.push(Warning::MalformedPart {
                    part: name.to_string(),
                    message: "part exceeds the configured size limit".to_string(),
                });
            }
        }

        info!(
            "Decoded document: {} blocks, {} media, {} raw parts, {} warnings",
            package.body.len(),
            package.media.len(),
            package.raw_parts.len(),
            self.warnings.len()
        );
        Ok(Decoded {
            document: Document::new(package),
            warnings: self.warnings,
        })
    }

    fn target_of(&self, rels: &RelationshipTable, rel_type: RelationshipType) -> Option<String> {
        rels.iter()
            .find(|rel| rel.rel_type == rel_type && rel.mode == TargetMode::Internal)
            .map(|rel| rel.target.clone())
    }

    /// Relationship table of a part; a malformed manifest is reported and treated as empty
    fn relationships_of(&mut self, part: &str) -> RelationshipTable {
        let manifest = relationships_part_name(part);
        self.consumed.insert(manifest.clone());
        match self.package.relationships(part) {
            Ok(table) => table,
            Err(e) => {
                warn!("Malformed relationships {}: {}", manifest, e);
                self.warnings.push(Warning::MalformedPart {
                    part: manifest,
                    message: e.to_string(),
                });
                RelationshipTable::new()
            }
        }
    }

    /// Parses an optional XML part named by `target`
    ///
    /// The part's own relationships are stored under `canonical`, the name it is
    /// written back as. Missing, oversized and malformed parts are reported and
    /// yield `None`.
    fn xml_part(
        &mut self,
        target: Option<&str>,
        canonical: &str,
        relationships: &mut BTreeMap<String, RelationshipTable>,
    ) -> Option<XmlElement> {
        let target = target?;
        self.consumed.insert(target.to_string());
        let Some(data) = self.package.part(target) else {
            if self.package.is_oversized(target) {
                self.warnings.push(Warning::MalformedPart {
                    part: target.to_string(),
                    message: "part exceeds the configured size limit".to_string(),
                });
            } else {
                warn!("Missing part {}", target);
                self.warnings.push(Warning::MissingPart {
                    part: target.to_string(),
                });
            }
            return None;
        };
        match XmlElement::parse(data) {
            Ok(root) => {
                debug!("Parsed part {}", target);
                let rels = self.relationships_of(target);
                if !rels.is_empty() {
                    relationships.insert(canonical.to_string(), rels);
                }
                Some(root)
            }
            Err(e) => {
                warn!("Malformed part {}: {}", target, e);
                self.warnings.push(Warning::MalformedPart {
                    part: target.to_string(),
                    message: e.to_string(),
                });
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn read_notes(
        &mut self,
        root: &XmlElement,
        source: &str,
        canonical: &str,
        kind: NoteKind,
        relationships: &BTreeMap<String, RelationshipTable>,
        note_ids: &NoteIds,
        stories: &BTreeSet<String>,
    ) -> Notes {
        let element_name = match kind {
            NoteKind::Footnote => "footnote",
            NoteKind::Endnote => "endnote",
        };
        let rels = relationships.get(canonical).cloned().unwrap_or_default();
        let mut notes = Notes {
            attributes: root.attributes.clone(),
            entries: BTreeMap::new(),
        };
        let mut duplicates = Vec::new();
        {
            let mut reader = StoryReader::new(source, root, &rels, note_ids, stories, self.options, &mut self.warnings);
            for element in root.elements().filter(|e| e.local_name() == element_name) {
                let Some(id) = element.attr_local("id").and_then(|v| v.trim().parse::<i64>().ok()) else {
                    continue;
                };
                if notes.entries.contains_key(&id) {
                    duplicates.push(id);
                    continue;
                }
                let note = Note {
                    id,
                    note_type: element.attr_local("type").map(str::to_string),
                    content: reader.read_blocks(element.elements()),
                };
                notes.entries.insert(id, note);
            }
        }
        for id in duplicates {
            warn!("Duplicate {} id {} in {}", element_name, id, source);
            self.warnings.push(Warning::DuplicateNoteId {
                part: source.to_string(),
                id,
            });
        }
        debug!("Decoded {} {}s from {}", notes.entries.len(), element_name, source);
        notes
    }

    /// Media blobs and every part not turned into model content
    fn collect_binary_parts(&self, package: &mut DocumentPackage) {
        for name in self.package.part_names() {
            if name == CONTENT_TYPES_PART || name == ROOT_RELATIONSHIPS_PART || self.consumed.contains(name) {
                continue;
            }
            let Some(data) = self.package.part(name) else {
                continue;
            };
            let content_type = self
                .package
                .content_type_str(name)
                .unwrap_or("application/octet-stream")
                .to_string();
            let is_media = content_type.starts_with("image/") || name.starts_with("word/media/");
            if is_media {
                package.media.insert(
                    name.to_string(),
                    MediaFile {
                        path: name.to_string(),
                        content_type,
                        data: Arc::from(data),
                    },
                );
            } else {
                debug!("Keeping raw part {}", name);
                package.raw_parts.insert(
                    name.to_string(),
                    RawPart {
                        content_type,
                        data: Arc::from(data),
                    },
                );
            }
        }
    }
}

fn collect_note_ids(root: Option<&XmlElement>, element_name: &str) -> BTreeSet<i64> {
    root.map(|root| {
        root.elements()
            .filter(|e| e.local_name() == element_name)
            .filter_map(|e| e.attr_local("id")?.trim().parse().ok())
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncodeOptions;
    use crate::model::{Block, Inline, RunContent, SectionItem};
    use crate::ooxml::opc::{relationships_xml, PackageWriter};

    const W: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;

    struct Builder {
        writer: PackageWriter,
        doc_rels: RelationshipTable,
        root_rels: RelationshipTable,
    }

    impl Builder {
        fn new(body: &str) -> Self {
            let mut builder = Builder {
                writer: PackageWriter::new(),
                doc_rels: RelationshipTable::new(),
                root_rels: RelationshipTable::new(),
            };
            builder
                .root_rels
                .add(RelationshipType::OfficeDocument, MAIN_PART, TargetMode::Internal);
            builder.writer.add_part(
                MAIN_PART,
                ContentType::MainDocument.as_str(),
                format!("<w:document {}><w:body>{}</w:body></w:document>", W, body).into_bytes(),
            );
            builder
        }

        fn part(mut self, name: &str, rel_type: RelationshipType, content_type: &str, xml: &str) -> Self {
            self.doc_rels.add(rel_type, name, TargetMode::Internal);
            self.writer.add_part(name, content_type, xml.as_bytes().to_vec());
            self
        }

        fn build(mut self) -> Vec<u8> {
            self.writer
                .add_relationships("_rels/.rels", relationships_xml("", self.root_rels.iter()));
            self.writer.add_relationships(
                "word/_rels/document.xml.rels",
                relationships_xml(MAIN_PART, self.doc_rels.iter()),
            );
            self.writer.finish(&EncodeOptions::default()).unwrap()
        }
    }

    #[test]
    fn test_decode_minimal_document() {
        let bytes = Builder::new(r#"<w:p><w:r><w:t>Hello</w:t></w:r></w:p><w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr>"#).build();
        let decoded = decode(&bytes).unwrap();
        let doc = decoded.document;
        assert_eq!(doc.paragraph_count(), 1);
        assert_eq!(doc.text(), "Hello\n");
        // styles and theme fall back to the built-in ones
        assert!(doc.package().styles.contains("Normal"));
        assert_eq!(doc.package().theme.color("accent1"), Some("4472C4"));
        assert!(decoded.warnings.is_empty());
        assert_eq!(doc.package().section.items.len(), 1);
    }

    #[test]
    fn test_missing_main_relationship() {
        let mut writer = PackageWriter::new();
        writer.add_relationships("_rels/.rels", relationships_xml("", RelationshipTable::new().iter()));
        let bytes = writer.finish(&EncodeOptions::default()).unwrap();
        assert!(matches!(decode(&bytes), Err(DecodeError::MissingMainPart)));
    }

    #[test]
    fn test_missing_main_part() {
        let mut writer = PackageWriter::new();
        let mut root = RelationshipTable::new();
        root.add(RelationshipType::OfficeDocument, MAIN_PART, TargetMode::Internal);
        writer.add_relationships("_rels/.rels", relationships_xml("", root.iter()));
        let bytes = writer.finish(&EncodeOptions::default()).unwrap();
        assert!(matches!(decode(&bytes), Err(DecodeError::MissingPart(ref p)) if p == MAIN_PART));
    }

    #[test]
    fn test_malformed_main_part_is_fatal() {
        let mut writer = PackageWriter::new();
        let mut root = RelationshipTable::new();
        root.add(RelationshipType::OfficeDocument, MAIN_PART, TargetMode::Internal);
        writer.add_relationships("_rels/.rels", relationships_xml("", root.iter()));
        writer.add_part(MAIN_PART, ContentType::MainDocument.as_str(), b"<w:document><w:body>".to_vec());
        let bytes = writer.finish(&EncodeOptions::default()).unwrap();
        assert!(matches!(decode(&bytes), Err(DecodeError::MalformedPart { .. })));
    }

    #[test]
    fn test_malformed_styles_fall_back_with_warning() {
        let bytes = Builder::new("<w:p/>")
            .part(STYLES_PART, RelationshipType::Styles, ContentType::Styles.as_str(), "<w:styles><oops")
            .build();
        let decoded = decode(&bytes).unwrap();
        assert!(decoded.document.package().styles.contains("Heading1"));
        assert!(matches!(
            decoded.warnings.as_slice(),
            [Warning::MalformedPart { part, .. }] if part == STYLES_PART
        ));
    }

    #[test]
    fn test_missing_optional_part_is_warning() {
        let mut builder = Builder::new("<w:p/>");
        builder
            .doc_rels
            .add(RelationshipType::Numbering, NUMBERING_PART, TargetMode::Internal);
        let decoded = decode(&builder.build()).unwrap();
        assert!(decoded.document.package().numbering.is_none());
        assert_eq!(
            decoded.warnings,
            vec![Warning::MissingPart {
                part: NUMBERING_PART.to_string()
            }]
        );
    }

    #[test]
    fn test_notes_and_duplicate_ids() {
        let notes = format!(
            r#"<w:footnotes {}><w:footnote w:type="separator" w:id="-1"><w:p/></w:footnote><w:footnote w:id="1"><w:p><w:r><w:t>first</w:t></w:r></w:p></w:footnote><w:footnote w:id="1"><w:p/></w:footnote></w:footnotes>"#,
            W
        );
        let bytes = Builder::new(r#"<w:p><w:r><w:footnoteReference w:id="1"/></w:r></w:p>"#)
            .part(FOOTNOTES_PART, RelationshipType::Footnotes, ContentType::Footnotes.as_str(), &notes)
            .build();
        let decoded = decode(&bytes).unwrap();
        let footnotes = decoded.document.package().footnotes.as_ref().unwrap();
        assert_eq!(footnotes.entries.len(), 2);
        assert_eq!(footnotes.entries[&-1].note_type.as_deref(), Some("separator"));
        assert_eq!(
            decoded.warnings,
            vec![Warning::DuplicateNoteId {
                part: FOOTNOTES_PART.to_string(),
                id: 1
            }]
        );
        let paragraph = decoded.document.paragraph(0).unwrap();
        assert!(matches!(
            &paragraph.content[0],
            Inline::Run(run) if run.content == vec![RunContent::NoteReference { kind: NoteKind::Footnote, id: 1 }]
        ));
    }

    #[test]
    fn test_unknown_parts_are_kept_raw() {
        let bytes = Builder::new("<w:p/>")
            .part(
                "word/settings.xml",
                RelationshipType::Settings,
                ContentType::Settings.as_str(),
                "<w:settings/>",
            )
            .build();
        let decoded = decode(&bytes).unwrap();
        let package = decoded.document.package();
        let raw = package.raw_parts.get("word/settings.xml").unwrap();
        assert_eq!(&raw.data[..], b"<w:settings/>");
        assert!(package.relationships[MAIN_PART]
            .find_by_type(&RelationshipType::Settings)
            .is_some());
        assert!(matches!(package.body[0], Block::Paragraph(_)));
    }

    #[test]
    fn test_broken_section_reference_survives_reencode() {
        let bytes = Builder::new(
            r#"<w:p><w:r><w:t>Body</w:t></w:r></w:p><w:sectPr><w:headerReference w:type="default" r:id="rId99"/><w:pgSz w:w="12240" w:h="15840"/></w:sectPr>"#,
        )
        .build();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(
            decoded.warnings,
            vec![Warning::BrokenReference {
                part: MAIN_PART.to_string(),
                reference: "rId99".to_string(),
            }]
        );
        let kept = |document: &Document| {
            document.package().section.items.iter().any(|item| {
                matches!(item, SectionItem::Other(element)
                    if element.local_name() == "headerReference" && element.attr("r:id") == Some("rId99"))
            })
        };
        assert!(kept(&decoded.document));

        let reencoded = crate::ooxml::encode(&decoded.document).unwrap();
        let again = decode(&reencoded).unwrap();
        assert!(kept(&again.document));
        assert_eq!(again.warnings, decoded.warnings);
        assert_eq!(again.document.package().section, decoded.document.package().section);
        assert_eq!(crate::ooxml::encode(&again.document).unwrap(), reencoded);
    }
}
