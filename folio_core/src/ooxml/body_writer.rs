//! Story writer: the block model back into WordprocessingML elements
//!
//! Elements are emitted with the original relationship ids; the encoder
//! renumbers them afterwards over the finished tree.

use std::collections::BTreeMap;

use crate::model::{
    Block, BreakKind, FieldCharKind, Hyperlink, Inline, LinkTarget, Note, NoteKind, Notes, Paragraph, Run,
    RunContent, SectionItem, SectionProperties, SimpleField, Table, TableCell, TableRow,
};

use super::parts::NS_WORDPROCESSING;
use super::properties::{
    write_cell_properties, write_paragraph_properties, write_row_properties, write_run_properties,
    write_table_properties,
};
use super::xml::{relationship_prefixes, XmlElement, NS_RELATIONSHIPS};

/// Root attributes with the `w` and relationships namespaces declared
pub fn story_attributes(attributes: &[(String, String)]) -> Vec<(String, String)> {
    let mut out = attributes.to_vec();
    if !out.iter().any(|(k, _)| k == "xmlns:w") {
        out.insert(0, ("xmlns:w".to_string(), NS_WORDPROCESSING.to_string()));
    }
    if !out.iter().any(|(_, v)| v == NS_RELATIONSHIPS) {
        out.push(("xmlns:r".to_string(), NS_RELATIONSHIPS.to_string()));
    }
    out
}

/// `w:t` or `w:instrText` with `xml:space="preserve"` when whitespace would be lost
fn text_element(name: &str, text: &str) -> XmlElement {
    let mut element = XmlElement::new(name);
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) || text.contains("  ") {
        element.set_attr("xml:space", "preserve");
    }
    if !text.is_empty() {
        element = element.with_text(text);
    }
    element
}

/// Writes the content of one story part
pub struct StoryWriter<'a> {
    /// Prefix bound to the relationships namespace on the story root
    rel_prefix: String,
    /// Relationship id of each header and footer part, for section references
    story_ids: &'a BTreeMap<String, String>,
}

impl<'a> StoryWriter<'a> {
    pub fn new(root_attributes: &[(String, String)], story_ids: &'a BTreeMap<String, String>) -> Self {
        let rel_prefix = relationship_prefixes(root_attributes)
            .into_iter()
            .next()
            .unwrap_or_else(|| "r".to_string());
        StoryWriter { rel_prefix, story_ids }
    }

    fn rel_attr(&self, local: &str) -> String {
        format!("{}:{}", self.rel_prefix, local)
    }

    pub fn write_blocks(&self, blocks: &[Block]) -> Vec<XmlElement> {
        blocks.iter().map(|block| self.write_block(block)).collect()
    }

    pub fn write_block(&self, block: &Block) -> XmlElement {
        match block {
            Block::Paragraph(paragraph) => self.write_paragraph(paragraph),
            Block::Table(table) => self.write_table(table),
            Block::Opaque(element) => element.clone(),
        }
    }

    pub fn write_paragraph(&self, paragraph: &Paragraph) -> XmlElement {
        let mut element = XmlElement::new("w:p");
        if let Some(ppr) = write_paragraph_properties(&paragraph.formatting) {
            element = element.with_child(ppr);
        }
        for inline in &paragraph.content {
            element = element.with_child(self.write_inline(inline));
        }
        element
    }

    fn write_inline(&self, inline: &Inline) -> XmlElement {
        match inline {
            Inline::Run(run) => self.write_run(run),
            Inline::Hyperlink(link) => self.write_hyperlink(link),
            Inline::BookmarkStart { id, name } => XmlElement::new("w:bookmarkStart")
                .with_attr("w:id", id.as_str())
                .with_attr("w:name", name.as_str()),
            Inline::BookmarkEnd { id } => XmlElement::new("w:bookmarkEnd").with_attr("w:id", id.as_str()),
            Inline::SimpleField(field) => self.write_simple_field(field),
            Inline::Opaque(element) => element.clone(),
        }
    }

    fn write_hyperlink(&self, link: &Hyperlink) -> XmlElement {
        let mut element = XmlElement::new("w:hyperlink");
        match &link.target {
            LinkTarget::Relationship(id) | LinkTarget::Broken(id) => element.set_attr(self.rel_attr("id"), id.as_str()),
            LinkTarget::Local => {}
        }
        if let Some(anchor) = &link.anchor {
            element.set_attr("w:anchor", anchor.as_str());
        }
        if let Some(tooltip) = &link.tooltip {
            element.set_attr("w:tooltip", tooltip.as_str());
        }
        if let Some(history) = link.history {
            element.set_attr("w:history", if history { "1" } else { "0" });
        }
        for run in &link.runs {
            element = element.with_child(self.write_run(run));
        }
        element
    }

    fn write_simple_field(&self, field: &SimpleField) -> XmlElement {
        let mut element = XmlElement::new("w:fldSimple").with_attr("w:instr", field.instruction.as_str());
        for run in &field.runs {
            element = element.with_child(self.write_run(run));
        }
        element
    }

    pub fn write_run(&self, run: &Run) -> XmlElement {
        let mut element = XmlElement::new("w:r");
        if let Some(rpr) = write_run_properties(&run.formatting) {
            element = element.with_child(rpr);
        }
        for item in &run.content {
            element = element.with_child(write_run_content(item));
        }
        element
    }

    pub fn write_table(&self, table: &Table) -> XmlElement {
        let mut grid = XmlElement::new("w:tblGrid");
        for width in &table.grid {
            grid = grid.with_child(XmlElement::new("w:gridCol").with_attr("w:w", width.to_string()));
        }
        let mut element = XmlElement::new("w:tbl")
            .with_child(write_table_properties(&table.properties))
            .with_child(grid);
        for row in &table.rows {
            element = element.with_child(self.write_row(row));
        }
        element
    }

    fn write_row(&self, row: &TableRow) -> XmlElement {
        let mut element = XmlElement::new("w:tr");
        if let Some(exceptions) = &row.properties.exceptions {
            element = element.with_child(exceptions.clone());
        }
        if let Some(trpr) = write_row_properties(&row.properties) {
            element = element.with_child(trpr);
        }
        for cell in &row.cells {
            element = element.with_child(self.write_cell(cell));
        }
        element
    }

    fn write_cell(&self, cell: &TableCell) -> XmlElement {
        let mut element = XmlElement::new("w:tc");
        if let Some(tcpr) = write_cell_properties(&cell.properties, cell.grid_span, cell.v_merge) {
            element = element.with_child(tcpr);
        }
        for block in &cell.content {
            element = element.with_child(self.write_block(block));
        }
        // a cell must end with a paragraph
        if !matches!(cell.content.last(), Some(Block::Paragraph(_))) {
            element = element.with_child(XmlElement::new("w:p"));
        }
        element
    }

    /// Writes `w:sectPr`; references to parts without a relationship are left out
    pub fn write_section(&self, section: &SectionProperties) -> XmlElement {
        let mut element = XmlElement::new("w:sectPr");
        element.attributes = section.attributes.clone();
        for item in &section.items {
            let child = match item {
                SectionItem::HeaderReference { kind, part } | SectionItem::FooterReference { kind, part } => {
                    let Some(id) = self.story_ids.get(part) else {
                        log::debug!("Dropping section reference to unknown part {}", part);
                        continue;
                    };
                    let name = if matches!(item, SectionItem::HeaderReference { .. }) {
                        "w:headerReference"
                    } else {
                        "w:footerReference"
                    };
                    XmlElement::new(name)
                        .with_attr("w:type", kind.as_attr())
                        .with_attr(self.rel_attr("id"), id.as_str())
                }
                SectionItem::PageSize {
                    width,
                    height,
                    orientation,
                } => {
                    let mut size = XmlElement::new("w:pgSz")
                        .with_attr("w:w", width.to_string())
                        .with_attr("w:h", height.to_string());
                    if let Some(orientation) = orientation {
                        size.set_attr("w:orient", orientation.as_str());
                    }
                    size
                }
                SectionItem::PageMargins {
                    top,
                    right,
                    bottom,
                    left,
                    header,
                    footer,
                    gutter,
                } => XmlElement::new("w:pgMar")
                    .with_attr("w:top", top.to_string())
                    .with_attr("w:right", right.to_string())
                    .with_attr("w:bottom", bottom.to_string())
                    .with_attr("w:left", left.to_string())
                    .with_attr("w:header", header.to_string())
                    .with_attr("w:footer", footer.to_string())
                    .with_attr("w:gutter", gutter.to_string()),
                SectionItem::Other(other) => other.clone(),
            };
            element = element.with_child(child);
        }
        element
    }

    /// Writes a notes part root (`w:footnotes` / `w:endnotes`)
    pub fn write_notes(&self, notes: &Notes, kind: NoteKind) -> XmlElement {
        let (root_name, note_name) = match kind {
            NoteKind::Footnote => ("w:footnotes", "w:footnote"),
            NoteKind::Endnote => ("w:endnotes", "w:endnote"),
        };
        let mut root = XmlElement::new(root_name);
        root.attributes = story_attributes(&notes.attributes);
        for note in notes.entries.values() {
            root = root.with_child(self.write_note(note, note_name));
        }
        root
    }

    fn write_note(&self, note: &Note, name: &str) -> XmlElement {
        let mut element = XmlElement::new(name);
        if let Some(note_type) = &note.note_type {
            element.set_attr("w:type", note_type.as_str());
        }
        element.set_attr("w:id", note.id.to_string());
        for child in self.write_blocks(&note.content) {
            element = element.with_child(child);
        }
        element
    }
}

fn write_run_content(item: &RunContent) -> XmlElement {
    match item {
        RunContent::Text(text) => text_element("w:t", text),
        RunContent::Tab => XmlElement::new("w:tab"),
        RunContent::Break(BreakKind::Line) => XmlElement::new("w:br"),
        RunContent::Break(BreakKind::Page) => XmlElement::new("w:br").with_attr("w:type", "page"),
        RunContent::Break(BreakKind::Column) => XmlElement::new("w:br").with_attr("w:type", "column"),
        RunContent::Drawing(drawing) => drawing.xml.clone(),
        RunContent::FieldChar(kind) => {
            let value = match kind {
                FieldCharKind::Begin => "begin",
                FieldCharKind::Separate => "separate",
                FieldCharKind::End => "end",
            };
            XmlElement::new("w:fldChar").with_attr("w:fldCharType", value)
        }
        RunContent::InstrText(text) => text_element("w:instrText", text),
        RunContent::NoteReference { kind, id } => {
            let name = match kind {
                NoteKind::Footnote => "w:footnoteReference",
                NoteKind::Endnote => "w:endnoteReference",
            };
            XmlElement::new(name).with_attr("w:id", id.to_string())
        }
        RunContent::BrokenReference { original, .. } => original.clone(),
        RunContent::Opaque(element) => element.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HeaderFooterKind, TextFormatting};

    fn writer(ids: &BTreeMap<String, String>) -> StoryWriter<'_> {
        StoryWriter::new(&story_attributes(&[]), ids)
    }

    #[test]
    fn test_story_attributes_adds_namespaces_once() {
        let attrs = story_attributes(&[]);
        assert_eq!(attrs[0].0, "xmlns:w");
        assert_eq!(attrs[1], ("xmlns:r".to_string(), NS_RELATIONSHIPS.to_string()));
        assert_eq!(story_attributes(&attrs), attrs);
    }

    #[test]
    fn test_write_run_preserves_spaces() {
        let ids = BTreeMap::new();
        let mut run = Run::text(" lead\ttrail");
        run.formatting = TextFormatting {
            bold: Some(true),
            ..Default::default()
        };
        let xml = writer(&ids).write_run(&run).to_xml_string();
        assert_eq!(
            xml,
            r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve"> lead</w:t><w:tab/><w:t>trail</w:t></w:r>"#
        );
    }

    #[test]
    fn test_write_hyperlink_uses_relationship_prefix() {
        let ids = BTreeMap::new();
        let paragraph = Paragraph {
            content: vec![Inline::Hyperlink(Hyperlink {
                target: LinkTarget::Relationship("rId4".to_string()),
                anchor: None,
                tooltip: Some("go".to_string()),
                history: Some(true),
                runs: vec![Run::text("site")],
            })],
            ..Default::default()
        };
        let xml = writer(&ids).write_paragraph(&paragraph).to_xml_string();
        assert_eq!(
            xml,
            r#"<w:p><w:hyperlink r:id="rId4" w:tooltip="go" w:history="1"><w:r><w:t>site</w:t></w:r></w:hyperlink></w:p>"#
        );
    }

    #[test]
    fn test_cell_gets_trailing_paragraph() {
        let ids = BTreeMap::new();
        let mut table = Table::grid_of(1, 1, 2000);
        table.rows[0].cells[0].content.clear();
        let xml = writer(&ids).write_table(&table).to_xml_string();
        assert!(xml.contains(r#"<w:tc><w:tcPr><w:tcW w:w="2000" w:type="dxa"/></w:tcPr><w:p/></w:tc>"#));
        assert!(xml.starts_with(r#"<w:tbl><w:tblPr/><w:tblGrid><w:gridCol w:w="2000"/></w:tblGrid>"#));
    }

    #[test]
    fn test_write_section_references() {
        let mut ids = BTreeMap::new();
        ids.insert("word/header1.xml".to_string(), "rId8".to_string());
        let section = SectionProperties {
            attributes: Vec::new(),
            items: vec![
                SectionItem::HeaderReference {
                    kind: HeaderFooterKind::First,
                    part: "word/header1.xml".to_string(),
                },
                SectionItem::FooterReference {
                    kind: HeaderFooterKind::Default,
                    part: "word/footer9.xml".to_string(),
                },
                SectionItem::PageSize {
                    width: 11906,
                    height: 16838,
                    orientation: None,
                },
            ],
        };
        let xml = writer(&ids).write_section(&section).to_xml_string();
        assert_eq!(
            xml,
            r#"<w:sectPr><w:headerReference w:type="first" r:id="rId8"/><w:pgSz w:w="11906" w:h="16838"/></w:sectPr>"#
        );
    }

    #[test]
    fn test_write_notes() {
        let ids = BTreeMap::new();
        let mut notes = Notes::default();
        notes.entries.insert(
            -1,
            Note {
                id: -1,
                note_type: Some("separator".to_string()),
                content: vec![Block::paragraph(Paragraph::new())],
            },
        );
        let root = writer(&ids).write_notes(&notes, NoteKind::Endnote);
        assert_eq!(root.name, "w:endnotes");
        let note = root.child("endnote").unwrap();
        assert_eq!(note.attr("w:type"), Some("separator"));
        assert_eq!(note.attr("w:id"), Some("-1"));
    }
}
