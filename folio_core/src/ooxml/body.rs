//! Story reader: body, header, footer and note content into the block model

use std::collections::BTreeSet;

use crate::config::DecodeOptions;
use crate::model::{
    Block, BreakKind, DocumentPackage, Drawing, FieldCharKind, HeaderFooterKind, Hyperlink, Inline, LinkTarget, NoteKind,
    Paragraph, ReferenceKind, Run, RunContent, SectionItem, SectionProperties, SimpleField, Table, TableCell,
    TableRow,
};
use crate::warning::Warning;

use super::properties::{
    only_attrs, read_cell_properties, read_paragraph_properties, read_row_properties, read_run_properties,
    read_table_properties,
};
use super::types::{RelationshipTable, RelationshipType};
use super::xml::{local_part, parse_on_off, relationship_prefixes, XmlElement, XmlError};

/// Elements preserved without a warning
const BENIGN: &[&str] = &[
    "proofErr",
    "lastRenderedPageBreak",
    "footnoteRef",
    "endnoteRef",
    "separator",
    "continuationSeparator",
    "annotationRef",
];

/// Note ids present in the package, used to validate note references
#[derive(Debug, Default)]
pub struct NoteIds {
    pub footnotes: BTreeSet<i64>,
    pub endnotes: BTreeSet<i64>,
}

/// Reads one story part into blocks, collecting warnings
pub struct StoryReader<'a> {
    part: &'a str,
    rels: &'a RelationshipTable,
    rel_prefixes: Vec<String>,
    notes: &'a NoteIds,
    /// Header and footer parts that were decoded
    stories: &'a BTreeSet<String>,
    options: &'a DecodeOptions,
    warnings: &'a mut Vec<Warning>,
    reported: BTreeSet<String>,
}

impl<'a> StoryReader<'a> {
    pub fn new(
        part: &'a str,
        root: &XmlElement,
        rels: &'a RelationshipTable,
        notes: &'a NoteIds,
        stories: &'a BTreeSet<String>,
        options: &'a DecodeOptions,
        warnings: &'a mut Vec<Warning>,
    ) -> Self {
        StoryReader {
            part,
            rels,
            rel_prefixes: relationship_prefixes(&root.attributes),
            notes,
            stories,
            options,
            warnings,
            reported: BTreeSet::new(),
        }
    }

    fn broken(&mut self, reference: &str) {
        log::warn!("Broken reference {} in {}", reference, self.part);
        self.warnings.push(Warning::BrokenReference {
            part: self.part.to_string(),
            reference: reference.to_string(),
        });
    }

    /// Handles an element the model has no type for; `None` when it is dropped
    fn unknown(&mut self, element: &XmlElement) -> Option<XmlElement> {
        let local = element.local_name();
        let benign = BENIGN.contains(&local) || local.starts_with("rsid");
        if !benign && self.reported.insert(element.name.clone()) {
            self.warnings.push(Warning::UnsupportedElement {
                part: self.part.to_string(),
                element: element.name.clone(),
                preserved: self.options.preserve_unknown,
            });
        }
        if !self.options.preserve_unknown {
            return None;
        }
        self.check_references(element);
        Some(element.clone())
    }

    /// Warns about relationship ids in a verbatim subtree that do not resolve
    fn check_references(&mut self, element: &XmlElement) {
        let mut ids = Vec::new();
        element.collect_relationship_ids(&self.rel_prefixes, &mut ids);
        for id in ids {
            if self.rels.get(&id).is_none() {
                self.broken(&id);
            }
        }
    }

    fn drop_element(&mut self, element: &XmlElement) {
        if self.reported.insert(element.name.clone()) {
            self.warnings.push(Warning::UnsupportedElement {
                part: self.part.to_string(),
                element: element.name.clone(),
                preserved: false,
            });
        }
    }

    // ------------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------------

    pub fn read_blocks<'e>(&mut self, elements: impl Iterator<Item = &'e XmlElement>) -> Vec<Block> {
        let mut blocks = Vec::new();
        for element in elements {
            match element.local_name() {
                "p" => blocks.push(Block::paragraph(self.read_paragraph(element))),
                "tbl" => blocks.push(Block::table(self.read_table(element))),
                _ => {
                    if let Some(kept) = self.unknown(element) {
                        blocks.push(Block::Opaque(kept));
                    }
                }
            }
        }
        blocks
    }

    pub fn read_paragraph(&mut self, element: &XmlElement) -> Paragraph {
        let mut paragraph = Paragraph::new();
        for child in element.elements() {
            match child.local_name() {
                "pPr" => {
                    paragraph.formatting = read_paragraph_properties(child);
                    self.check_references(child);
                }
                "r" => paragraph.content.push(Inline::Run(self.read_run(child))),
                "hyperlink" => {
                    let inline = self.read_hyperlink(child);
                    paragraph.content.push(inline);
                }
                "bookmarkStart" if only_attrs(child, &["id", "name"]) => {
                    paragraph.content.push(Inline::BookmarkStart {
                        id: child.attr_local("id").unwrap_or_default().to_string(),
                        name: child.attr_local("name").unwrap_or_default().to_string(),
                    });
                }
                "bookmarkEnd" if only_attrs(child, &["id"]) => {
                    paragraph.content.push(Inline::BookmarkEnd {
                        id: child.attr_local("id").unwrap_or_default().to_string(),
                    });
                }
                "bookmarkStart" | "bookmarkEnd" => paragraph.content.push(Inline::Opaque(child.clone())),
                "fldSimple" => match self.read_simple_field(child) {
                    Some(field) => paragraph.content.push(Inline::SimpleField(field)),
                    None => paragraph.content.push(Inline::Opaque(child.clone())),
                },
                _ => {
                    if let Some(kept) = self.unknown(child) {
                        paragraph.content.push(Inline::Opaque(kept));
                    }
                }
            }
        }
        paragraph
    }

    fn read_hyperlink(&mut self, element: &XmlElement) -> Inline {
        let known = element.attributes.iter().all(|(key, _)| {
            let local = local_part(key);
            matches!(local, "anchor" | "tooltip" | "history") || (local == "id" && self.is_rel_attr(key))
        });
        let runs_only = element
            .elements()
            .all(|c| matches!(c.local_name(), "r" | "proofErr"));
        if !known || !runs_only {
            self.check_references(element);
            return Inline::Opaque(element.clone());
        }

        let id = element
            .attributes
            .iter()
            .find(|(key, _)| local_part(key) == "id" && self.is_rel_attr(key))
            .map(|(_, v)| v.clone());
        let target = match id {
            Some(id) if self.rels.get(&id).is_some() => LinkTarget::Relationship(id),
            Some(id) => {
                self.broken(&id);
                LinkTarget::Broken(id)
            }
            None => LinkTarget::Local,
        };
        let runs = element
            .elements()
            .filter(|c| c.local_name() == "r")
            .map(|c| self.read_run(c))
            .collect();
        Inline::Hyperlink(Hyperlink {
            target,
            anchor: element.attr_local("anchor").map(str::to_string),
            tooltip: element.attr_local("tooltip").map(str::to_string),
            history: element.attr_local("history").map(|v| parse_on_off(Some(v))),
            runs,
        })
    }

    fn is_rel_attr(&self, key: &str) -> bool {
        key.split_once(':')
            .map(|(prefix, _)| self.rel_prefixes.iter().any(|p| p == prefix))
            .unwrap_or(false)
    }

    fn read_simple_field(&mut self, element: &XmlElement) -> Option<SimpleField> {
        if !element.attributes.iter().all(|(k, _)| local_part(k) == "instr")
            || element.elements().any(|c| c.local_name() != "r")
        {
            return None;
        }
        Some(SimpleField {
            instruction: element.attr_local("instr").unwrap_or_default().to_string(),
            runs: element.elements().map(|c| self.read_run(c)).collect(),
        })
    }

    // ------------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------------

    pub fn read_run(&mut self, element: &XmlElement) -> Run {
        let mut run = Run::default();
        for child in element.elements() {
            let item = match child.local_name() {
                "rPr" => {
                    run.formatting = read_run_properties(child);
                    continue;
                }
                "t" => RunContent::Text(child.text()),
                "tab" if child.attributes.is_empty() => RunContent::Tab,
                "br" => match read_break(child) {
                    Some(kind) => RunContent::Break(kind),
                    None => RunContent::Opaque(child.clone()),
                },
                "cr" => RunContent::Break(BreakKind::Line),
                "drawing" => self.read_drawing(child),
                "fldChar" => match read_field_char(child) {
                    Some(kind) => RunContent::FieldChar(kind),
                    None => RunContent::Opaque(child.clone()),
                },
                "instrText" => RunContent::InstrText(child.text()),
                "footnoteReference" => self.read_note_reference(child, NoteKind::Footnote),
                "endnoteReference" => self.read_note_reference(child, NoteKind::Endnote),
                _ => match self.unknown(child) {
                    Some(kept) => RunContent::Opaque(kept),
                    None => continue,
                },
            };
            run.content.push(item);
        }
        run
    }

    fn read_drawing(&mut self, element: &XmlElement) -> RunContent {
        let embed = find_embed(element, &self.rel_prefixes);
        if let Some(id) = &embed {
            if self.rels.get(id).is_none() {
                self.broken(id);
                return RunContent::BrokenReference {
                    kind: ReferenceKind::Image,
                    reference: id.clone(),
                    original: element.clone(),
                };
            }
        }
        self.check_references(element);
        RunContent::Drawing(Drawing {
            embed,
            xml: element.clone(),
        })
    }

    fn read_note_reference(&mut self, element: &XmlElement, kind: NoteKind) -> RunContent {
        let id = element.attr_local("id").and_then(|v| v.trim().parse::<i64>().ok());
        let Some(id) = id.filter(|_| only_attrs(element, &["id"])) else {
            return RunContent::Opaque(element.clone());
        };
        let (ids, reference_kind) = match kind {
            NoteKind::Footnote => (&self.notes.footnotes, ReferenceKind::Footnote),
            NoteKind::Endnote => (&self.notes.endnotes, ReferenceKind::Endnote),
        };
        if ids.contains(&id) {
            RunContent::NoteReference { kind, id }
        } else {
            let reference = id.to_string();
            self.broken(&reference);
            RunContent::BrokenReference {
                kind: reference_kind,
                reference,
                original: element.clone(),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------------

    pub fn read_table(&mut self, element: &XmlElement) -> Table {
        let mut table = Table::default();
        for child in element.elements() {
            match child.local_name() {
                "tblPr" => table.properties = read_table_properties(child),
                "tblGrid" => {
                    table.grid = child
                        .elements()
                        .filter(|c| c.local_name() == "gridCol")
                        .map(|c| c.attr_local("w").and_then(|w| w.parse().ok()).unwrap_or(0))
                        .collect();
                }
                "tr" => table.rows.push(self.read_row(child)),
                _ => self.drop_element(child),
            }
        }
        if self.options.check_tables {
            for message in table.check_structure() {
                log::warn!("Table in {}: {}", self.part, message);
                self.warnings.push(Warning::TableStructure {
                    part: self.part.to_string(),
                    message,
                });
            }
        }
        table
    }

    fn read_row(&mut self, element: &XmlElement) -> TableRow {
        let mut row = TableRow::default();
        for child in element.elements() {
            match child.local_name() {
                "trPr" => {
                    let exceptions = row.properties.exceptions.take();
                    row.properties = read_row_properties(child);
                    row.properties.exceptions = exceptions;
                }
                "tblPrEx" => row.properties.exceptions = Some(child.clone()),
                "tc" => row.cells.push(self.read_cell(child)),
                _ => self.drop_element(child),
            }
        }
        row
    }

    fn read_cell(&mut self, element: &XmlElement) -> TableCell {
        let mut cell = TableCell {
            content: Vec::new(),
            ..Default::default()
        };
        if let Some(tcpr) = element.child("tcPr") {
            let (properties, span, merge) = read_cell_properties(tcpr);
            cell.properties = properties;
            cell.grid_span = span;
            cell.v_merge = merge;
        }
        cell.content = self.read_blocks(element.elements().filter(|c| c.local_name() != "tcPr"));
        cell
    }

    // ------------------------------------------------------------------------
    // Sections
    // ------------------------------------------------------------------------

    pub fn read_section(&mut self, element: &XmlElement) -> SectionProperties {
        let mut section = SectionProperties {
            attributes: element.attributes.clone(),
            items: Vec::new(),
        };
        for child in element.elements() {
            let item = match child.local_name() {
                local @ ("headerReference" | "footerReference") => {
                    let expected = if local == "headerReference" {
                        RelationshipType::Header
                    } else {
                        RelationshipType::Footer
                    };
                    let id = child
                        .attributes
                        .iter()
                        .find(|(k, _)| local_part(k) == "id" && self.is_rel_attr(k))
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default();
                    let part = self
                        .rels
                        .get(&id)
                        .filter(|rel| rel.rel_type == expected && self.stories.contains(&rel.target))
                        .map(|rel| rel.target.clone());
                    // a dangling reference is kept verbatim; the encoder reserves its id
                    let Some(part) = part else {
                        self.broken(&id);
                        section.items.push(SectionItem::Other(child.clone()));
                        continue;
                    };
                    let kind = HeaderFooterKind::from_attr(child.attr_local("type").unwrap_or("default"));
                    if expected == RelationshipType::Header {
                        SectionItem::HeaderReference { kind, part }
                    } else {
                        SectionItem::FooterReference { kind, part }
                    }
                }
                "pgSz" if only_attrs(child, &["w", "h", "orient"]) => {
                    match (number(child, "w"), number(child, "h")) {
                        (Some(width), Some(height)) => SectionItem::PageSize {
                            width,
                            height,
                            orientation: child.attr_local("orient").map(str::to_string),
                        },
                        _ => SectionItem::Other(child.clone()),
                    }
                }
                "pgMar" if only_attrs(child, &["top", "right", "bottom", "left", "header", "footer", "gutter"]) => {
                    let values: Option<Vec<i32>> = ["top", "right", "bottom", "left", "header", "footer", "gutter"]
                        .iter()
                        .map(|key| number(child, key))
                        .collect();
                    match values.as_deref() {
                        Some(&[top, right, bottom, left, header, footer, gutter]) => SectionItem::PageMargins {
                            top,
                            right,
                            bottom,
                            left,
                            header,
                            footer,
                            gutter,
                        },
                        _ => SectionItem::Other(child.clone()),
                    }
                }
                _ => {
                    self.check_references(child);
                    SectionItem::Other(child.clone())
                }
            };
            section.items.push(item);
        }
        section
    }
}

fn number<T: std::str::FromStr>(element: &XmlElement, local: &str) -> Option<T> {
    element.attr_local(local)?.parse().ok()
}

fn read_break(element: &XmlElement) -> Option<BreakKind> {
    if !only_attrs(element, &["type"]) {
        return None;
    }
    match element.attr_local("type") {
        None | Some("textWrapping") => Some(BreakKind::Line),
        Some("page") => Some(BreakKind::Page),
        Some("column") => Some(BreakKind::Column),
        Some(_) => None,
    }
}

fn read_field_char(element: &XmlElement) -> Option<FieldCharKind> {
    if !only_attrs(element, &["fldCharType"]) {
        return None;
    }
    match element.attr_local("fldCharType")? {
        "begin" => Some(FieldCharKind::Begin),
        "separate" => Some(FieldCharKind::Separate),
        "end" => Some(FieldCharKind::End),
        _ => None,
    }
}

/// First `r:embed` in a drawing subtree
fn find_embed(element: &XmlElement, prefixes: &[String]) -> Option<String> {
    for (key, value) in &element.attributes {
        if let Some((prefix, local)) = key.split_once(':') {
            if local == "embed" && prefixes.iter().any(|p| p == prefix) {
                return Some(value.clone());
            }
        }
    }
    element.elements().find_map(|child| find_embed(child, prefixes))
}

/// Reads a WordprocessingML fragment (`<w:p>...</w:p>`, `<w:tbl>...`) as blocks of `part`
///
/// The fragment may use any prefix declared on the package's main part root.
pub fn read_fragment(
    xml: &str,
    part: &str,
    package: &DocumentPackage,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<Block>, XmlError> {
    let elements = XmlElement::parse_fragment(xml, &package.root_attributes)?;
    let mut root = XmlElement::new("w:body");
    root.attributes = package.root_attributes.clone();

    let empty = RelationshipTable::new();
    let rels = package.relationships.get(part).unwrap_or(&empty);
    let note_ids = |kind: NoteKind| -> BTreeSet<i64> {
        package
            .notes(kind)
            .map(|notes| notes.entries.keys().copied().collect())
            .unwrap_or_default()
    };
    let notes = NoteIds {
        footnotes: note_ids(NoteKind::Footnote),
        endnotes: note_ids(NoteKind::Endnote),
    };
    let stories: BTreeSet<String> = package.headers.keys().chain(package.footers.keys()).cloned().collect();
    let options = DecodeOptions::default();

    let mut reader = StoryReader::new(part, &root, rels, &notes, &stories, &options, warnings);
    Ok(reader.read_blocks(elements.iter()))
}
