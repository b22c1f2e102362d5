//! Block and inline content of a story (body, header, footer, note)

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::formatting::{Alignment, ParagraphFormatting, TextFormatting};
use crate::ooxml::xml::XmlElement;

/// Logical character emitted for drawings and note references
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

// ============================================================================
// Blocks
// ============================================================================

/// Block-level content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Block {
    Paragraph(Arc<Paragraph>),
    Table(Arc<Table>),
    /// Block-level element kept verbatim (content controls, custom XML, ...)
    Opaque(XmlElement),
}

impl Block {
    pub fn paragraph(paragraph: Paragraph) -> Self {
        Block::Paragraph(Arc::new(paragraph))
    }

    pub fn table(table: Table) -> Self {
        Block::Table(Arc::new(table))
    }

    pub fn as_paragraph(&self) -> Option<&Paragraph> {
        match self {
            Block::Paragraph(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Block::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Appends the plain text of this block, one line per paragraph
    pub fn collect_text(&self, out: &mut String) {
        match self {
            Block::Paragraph(p) => {
                out.push_str(&p.text());
                out.push('\n');
            }
            Block::Table(t) => {
                for row in &t.rows {
                    for cell in &row.cells {
                        for block in &cell.content {
                            block.collect_text(out);
                        }
                    }
                }
            }
            Block::Opaque(_) => {}
        }
    }
}

/// Calls `f` on every paragraph of a block list, descending into tables
pub fn visit_paragraphs<'a>(blocks: &'a [Block], f: &mut dyn FnMut(&'a Paragraph)) {
    for block in blocks {
        match block {
            Block::Paragraph(p) => f(p),
            Block::Table(t) => {
                for row in &t.rows {
                    for cell in &row.cells {
                        visit_paragraphs(&cell.content, f);
                    }
                }
            }
            Block::Opaque(_) => {}
        }
    }
}

// ============================================================================
// Paragraphs and inlines
// ============================================================================

/// A paragraph (`w:p`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paragraph {
    pub formatting: ParagraphFormatting,
    pub content: Vec<Inline>,
}

impl Paragraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paragraph holding a single run of plain text
    pub fn with_text(text: &str) -> Self {
        let mut paragraph = Paragraph::new();
        if !text.is_empty() {
            paragraph.content.push(Inline::Run(Run::text(text)));
        }
        paragraph
    }

    pub fn with_style(mut self, style_id: &str) -> Self {
        self.formatting.style_id = Some(style_id.to_string());
        self
    }

    /// Logical text: run text, tabs as `\t`, breaks as `\n`, objects as U+FFFC
    pub fn text(&self) -> String {
        let mut out = String::new();
        for inline in &self.content {
            for run in inline.runs() {
                run.collect_text(&mut out);
            }
        }
        out
    }

    /// Length of the logical text in characters
    pub fn len(&self) -> usize {
        self.content
            .iter()
            .flat_map(|inline| inline.runs())
            .map(Run::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over every run, including runs nested in hyperlinks and fields
    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.content.iter().flat_map(|inline| inline.runs())
    }
}

/// Inline content of a paragraph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Inline {
    Run(Run),
    Hyperlink(Hyperlink),
    BookmarkStart { id: String, name: String },
    BookmarkEnd { id: String },
    /// `w:fldSimple`
    SimpleField(SimpleField),
    /// Inline element kept verbatim (proofing marks, content controls, ...)
    Opaque(XmlElement),
}

impl Inline {
    /// Runs directly held by this inline
    pub fn runs(&self) -> &[Run] {
        match self {
            Inline::Run(run) => std::slice::from_ref(run),
            Inline::Hyperlink(link) => &link.runs,
            Inline::SimpleField(field) => &field.runs,
            _ => &[],
        }
    }

    /// Mutable access to the runs held by this inline
    pub fn runs_mut(&mut self) -> &mut [Run] {
        match self {
            Inline::Run(run) => std::slice::from_mut(run),
            Inline::Hyperlink(link) => &mut link.runs,
            Inline::SimpleField(field) => &mut field.runs,
            _ => &mut [],
        }
    }
}

/// Where a hyperlink points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkTarget {
    /// Relationship id in the owning part's table
    Relationship(String),
    /// Relationship id that did not resolve when the part was read
    Broken(String),
    /// No relationship: the link only carries an anchor
    Local,
}

/// A hyperlink (`w:hyperlink`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperlink {
    pub target: LinkTarget,
    /// Bookmark name inside the target document (`w:anchor`)
    pub anchor: Option<String>,
    pub tooltip: Option<String>,
    pub history: Option<bool>,
    pub runs: Vec<Run>,
}

/// A simple field (`w:fldSimple`) with its cached result runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleField {
    pub instruction: String,
    pub runs: Vec<Run>,
}

// ============================================================================
// Runs
// ============================================================================

/// A run of uniformly formatted content (`w:r`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Run {
    pub formatting: TextFormatting,
    pub content: Vec<RunContent>,
}

impl Run {
    pub fn new(formatting: TextFormatting) -> Self {
        Run {
            formatting,
            content: Vec::new(),
        }
    }

    /// Run with plain text; `\n` becomes a line break and `\t` a tab
    pub fn text(text: &str) -> Self {
        Run {
            formatting: TextFormatting::default(),
            content: RunContent::from_text(text),
        }
    }

    pub fn with_formatting(mut self, formatting: TextFormatting) -> Self {
        self.formatting = formatting;
        self
    }

    /// Logical length in characters
    pub fn len(&self) -> usize {
        self.content.iter().map(RunContent::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn collect_text(&self, out: &mut String) {
        for item in &self.content {
            item.collect_text(out);
        }
    }

    /// Merges adjacent text items and drops empty ones
    pub fn normalize(&mut self) {
        let mut merged: Vec<RunContent> = Vec::with_capacity(self.content.len());
        for item in self.content.drain(..) {
            match item {
                RunContent::Text(text) if text.is_empty() => {}
                RunContent::Text(text) => match merged.last_mut() {
                    Some(RunContent::Text(prev)) => prev.push_str(&text),
                    _ => merged.push(RunContent::Text(text)),
                },
                other => merged.push(other),
            }
        }
        self.content = merged;
    }
}

/// Kind of a `w:br` element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakKind {
    Line,
    Page,
    Column,
}

/// Complex field character (`w:fldChar/@w:fldCharType`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldCharKind {
    Begin,
    Separate,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NoteKind {
    Footnote,
    Endnote,
}

/// What a broken reference pointed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    Image,
    Footnote,
    Endnote,
}

/// An inline drawing (`w:drawing`)
///
/// The element is kept whole; `embed` is the relationship id of the picture
/// blob when the drawing is a picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drawing {
    pub embed: Option<String>,
    pub xml: XmlElement,
}

/// Content of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunContent {
    Text(String),
    Tab,
    Break(BreakKind),
    Drawing(Drawing),
    FieldChar(FieldCharKind),
    InstrText(String),
    NoteReference { kind: NoteKind, id: i64 },
    /// Reference whose target did not resolve when the part was read
    BrokenReference {
        kind: ReferenceKind,
        reference: String,
        original: XmlElement,
    },
    Opaque(XmlElement),
}

impl RunContent {
    /// Logical length in characters
    pub fn len(&self) -> usize {
        match self {
            RunContent::Text(text) => text.chars().count(),
            RunContent::Tab | RunContent::Break(_) => 1,
            RunContent::Drawing(_) | RunContent::NoteReference { .. } | RunContent::BrokenReference { .. } => 1,
            RunContent::FieldChar(_) | RunContent::InstrText(_) | RunContent::Opaque(_) => 0,
        }
    }

    pub fn collect_text(&self, out: &mut String) {
        match self {
            RunContent::Text(text) => out.push_str(text),
            RunContent::Tab => out.push('\t'),
            RunContent::Break(_) => out.push('\n'),
            RunContent::Drawing(_) | RunContent::NoteReference { .. } | RunContent::BrokenReference { .. } => {
                out.push(OBJECT_REPLACEMENT)
            }
            RunContent::FieldChar(_) | RunContent::InstrText(_) | RunContent::Opaque(_) => {}
        }
    }

    /// Converts plain text into run items; `\n` becomes a line break, `\t` a tab
    pub fn from_text(text: &str) -> Vec<RunContent> {
        let mut items = Vec::new();
        let mut current = String::new();
        for ch in text.chars() {
            match ch {
                '\n' | '\t' => {
                    if !current.is_empty() {
                        items.push(RunContent::Text(std::mem::take(&mut current)));
                    }
                    items.push(if ch == '\n' {
                        RunContent::Break(BreakKind::Line)
                    } else {
                        RunContent::Tab
                    });
                }
                '\r' => {}
                _ => current.push(ch),
            }
        }
        if !current.is_empty() {
            items.push(RunContent::Text(current));
        }
        items
    }
}

// ============================================================================
// Tables
// ============================================================================

/// Width unit of a table or cell measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WidthUnit {
    Auto,
    /// Twentieths of a point
    Dxa,
    /// Fiftieths of a percent
    Pct,
    Nil,
}

impl WidthUnit {
    pub fn from_attr(value: &str) -> Self {
        match value {
            "dxa" => WidthUnit::Dxa,
            "pct" => WidthUnit::Pct,
            "nil" => WidthUnit::Nil,
            _ => WidthUnit::Auto,
        }
    }

    pub fn as_attr(&self) -> &'static str {
        match self {
            WidthUnit::Auto => "auto",
            WidthUnit::Dxa => "dxa",
            WidthUnit::Pct => "pct",
            WidthUnit::Nil => "nil",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Width {
    pub value: i64,
    pub unit: WidthUnit,
}

/// Table-level properties (`w:tblPr`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableProperties {
    pub style_id: Option<String>,
    pub width: Option<Width>,
    pub alignment: Option<Alignment>,
    pub extras: Vec<XmlElement>,
}

/// Row properties (`w:trPr`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowProperties {
    /// Repeat as header row on each page (`w:tblHeader`)
    pub header: Option<bool>,
    pub extras: Vec<XmlElement>,
    /// Table property exceptions of the row (`w:tblPrEx`)
    pub exceptions: Option<XmlElement>,
}

/// Cell properties other than spans (`w:tcPr`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellProperties {
    pub width: Option<Width>,
    pub extras: Vec<XmlElement>,
}

/// Vertical merge marker (`w:vMerge`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VMerge {
    Restart,
    Continue,
}

/// A table (`w:tbl`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Table {
    pub properties: TableProperties,
    /// Grid column widths in twips (`w:tblGrid`)
    pub grid: Vec<u32>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableRow {
    pub properties: RowProperties,
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub properties: CellProperties,
    /// Number of grid columns spanned
    pub grid_span: u32,
    pub v_merge: Option<VMerge>,
    /// Cell content; holds at least one paragraph when written
    pub content: Vec<Block>,
}

impl Default for TableCell {
    fn default() -> Self {
        TableCell {
            properties: CellProperties::default(),
            grid_span: 1,
            v_merge: None,
            content: vec![Block::paragraph(Paragraph::new())],
        }
    }
}

impl TableCell {
    /// Cell holding one paragraph of text
    pub fn with_text(text: &str) -> Self {
        TableCell {
            content: vec![Block::paragraph(Paragraph::with_text(text))],
            ..Default::default()
        }
    }
}

impl Table {
    /// Logical column count: the grid width, or the widest row without a grid
    pub fn column_count(&self) -> usize {
        if !self.grid.is_empty() {
            return self.grid.len();
        }
        self.rows
            .iter()
            .map(|row| row.cells.iter().map(|c| c.grid_span.max(1) as usize).sum::<usize>())
            .max()
            .unwrap_or(0)
    }

    /// Checks span and vertical-merge consistency; returns one message per violation
    pub fn check_structure(&self) -> Vec<String> {
        let columns = self.column_count();
        let mut problems = Vec::new();
        // merge state of each grid column in the previous row
        let mut above: Vec<Option<VMerge>> = vec![None; columns];

        for (row_index, row) in self.rows.iter().enumerate() {
            let span_sum: usize = row.cells.iter().map(|c| c.grid_span.max(1) as usize).sum();
            if span_sum != columns {
                problems.push(format!(
                    "row {} spans {} grid columns, table has {}",
                    row_index, span_sum, columns
                ));
            }

            let mut current: Vec<Option<VMerge>> = vec![None; columns.max(span_sum)];
            let mut column = 0usize;
            for (cell_index, cell) in row.cells.iter().enumerate() {
                let span = cell.grid_span.max(1) as usize;
                if cell.v_merge == Some(VMerge::Continue) {
                    let covered = (column..column + span)
                        .all(|c| matches!(above.get(c), Some(Some(_))));
                    if !covered {
                        problems.push(format!(
                            "row {} cell {} continues a vertical merge with no merged cell above",
                            row_index, cell_index
                        ));
                    }
                }
                for slot in current.iter_mut().skip(column).take(span) {
                    *slot = cell.v_merge;
                }
                column += span;
            }
            current.truncate(columns);
            current.resize(columns, None);
            above = current;
        }
        problems
    }

    /// Simple `rows` x `columns` table with equal column widths
    pub fn grid_of(rows: usize, columns: usize, total_width: u32) -> Self {
        let column_width = if columns == 0 { 0 } else { total_width / columns as u32 };
        Table {
            properties: TableProperties::default(),
            grid: vec![column_width; columns],
            rows: (0..rows)
                .map(|_| TableRow {
                    properties: RowProperties::default(),
                    cells: (0..columns)
                        .map(|_| TableCell {
                            properties: CellProperties {
                                width: Some(Width {
                                    value: column_width as i64,
                                    unit: WidthUnit::Dxa,
                                }),
                                extras: Vec::new(),
                            },
                            ..Default::default()
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraph_logical_text() {
        let mut run = Run::text("a\tb");
        run.content.push(RunContent::Break(BreakKind::Line));
        run.content.push(RunContent::FieldChar(FieldCharKind::Begin));
        run.content.push(RunContent::NoteReference {
            kind: NoteKind::Footnote,
            id: 1,
        });
        let paragraph = Paragraph {
            content: vec![
                Inline::Run(run),
                Inline::BookmarkStart {
                    id: "0".to_string(),
                    name: "x".to_string(),
                },
                Inline::Hyperlink(Hyperlink {
                    target: LinkTarget::Local,
                    anchor: Some("x".to_string()),
                    tooltip: None,
                    history: None,
                    runs: vec![Run::text("link")],
                }),
            ],
            ..Default::default()
        };
        assert_eq!(paragraph.text(), "a\tb\n\u{FFFC}link");
        assert_eq!(paragraph.len(), 9);
    }

    #[test]
    fn test_run_from_text_splits_controls() {
        let run = Run::text("one\ntwo\tthree\r\n");
        assert_eq!(
            run.content,
            vec![
                RunContent::Text("one".to_string()),
                RunContent::Break(BreakKind::Line),
                RunContent::Text("two".to_string()),
                RunContent::Tab,
                RunContent::Text("three".to_string()),
                RunContent::Break(BreakKind::Line),
            ]
        );
    }

    #[test]
    fn test_run_normalize_merges_text() {
        let mut run = Run::default();
        run.content = vec![
            RunContent::Text("ab".to_string()),
            RunContent::Text(String::new()),
            RunContent::Text("cd".to_string()),
            RunContent::Tab,
            RunContent::Text("e".to_string()),
        ];
        run.normalize();
        assert_eq!(
            run.content,
            vec![
                RunContent::Text("abcd".to_string()),
                RunContent::Tab,
                RunContent::Text("e".to_string()),
            ]
        );
    }

    #[test]
    fn test_table_structure_valid_merge() {
        let mut table = Table::grid_of(2, 2, 4000);
        table.rows[0].cells[0].v_merge = Some(VMerge::Restart);
        table.rows[1].cells[0].v_merge = Some(VMerge::Continue);
        assert!(table.check_structure().is_empty());
    }

    #[test]
    fn test_table_structure_reports_violations() {
        let mut table = Table::grid_of(2, 2, 4000);
        table.rows[0].cells[0].grid_span = 2;
        table.rows[1].cells[1].v_merge = Some(VMerge::Continue);
        let problems = table.check_structure();
        assert_eq!(problems.len(), 2);
    }
}
