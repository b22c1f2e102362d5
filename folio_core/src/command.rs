//! # Command Executor
//!
//! Range-addressed edits applied to a [`Document`]. Every command is validated
//! against the current document and either produces a new `Document` or fails with
//! a [`CommandError`]; the input is never modified.
//!
//! Commands serialize as JSON objects tagged by `type`:
//!
//! ```json
//! {"type": "InsertText", "at": {"paragraph": 0, "offset": 5}, "text": ", world"}
//! ```
//!
//! A [`Position`] addresses a top-level body paragraph by ordinal and a character
//! offset in its logical text ([`Paragraph::text`]).

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TemplateOptions;
use crate::editing::{
    delete_range, extract_range, format_range, formatting_at, insert_inlines, insert_text, merge_paragraphs,
    normalize, replace_range, splice_range, split_paragraph,
};
use crate::image::{max_drawing_id, ImageInfo, InlinePicture, EMU_PER_TWIP};
use crate::model::{
    visit_paragraphs, Block, Document, DocumentPackage, Drawing, Hyperlink, Inline, LinkTarget, MediaFile,
    Paragraph, ParagraphFormatting, Run, RunContent, StyleType, Table, TableCell, TextFormatting, MAIN_PART,
};
use crate::ooxml::xml::relationship_prefixes;
use crate::ooxml::{RelationshipType, TargetMode};
use crate::template::substitute_with;
use crate::warning::Warning;

/// Character style given to hyperlink text when the style sheet defines it
const HYPERLINK_STYLE: &str = "Hyperlink";

/// Text width used for new tables when the section has no page size (6.5 inches)
const DEFAULT_TEXT_WIDTH: u32 = 9360;

/// Errors returned by [`execute`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Unknown style: {0}")]
    UnknownStyle(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// A character position in a top-level body paragraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Ordinal among the top-level paragraphs of the body
    pub paragraph: usize,
    /// Character offset in the paragraph's logical text
    pub offset: usize,
}

impl Position {
    pub fn new(paragraph: usize, offset: usize) -> Self {
        Position { paragraph, offset }
    }
}

/// Half-open range between two positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: Position,
    pub end: Position,
}

impl TextRange {
    pub fn new(start: Position, end: Position) -> Self {
        TextRange { start, end }
    }

    /// Range inside one paragraph
    pub fn within(paragraph: usize, start: usize, end: usize) -> Self {
        TextRange {
            start: Position::new(paragraph, start),
            end: Position::new(paragraph, end),
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// A structured edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Inserts text; without `formatting` it takes the formatting of the text before it
    InsertText {
        at: Position,
        text: String,
        #[serde(default)]
        formatting: Option<TextFormatting>,
    },
    /// Replaces a range with text formatted like the first replaced character
    ReplaceText { range: TextRange, text: String },
    DeleteRange { range: TextRange },
    /// Merges `formatting` into every run of the range
    FormatText {
        range: TextRange,
        formatting: TextFormatting,
    },
    /// Merges `formatting` into every paragraph the range touches
    FormatParagraph {
        range: TextRange,
        formatting: ParagraphFormatting,
    },
    /// Resets the run formatting of the range
    ClearFormatting { range: TextRange },
    /// Inserts a `rows` x `columns` table at a position, splitting the paragraph there
    InsertTable {
        at: Position,
        rows: usize,
        columns: usize,
        /// Initial cell text, row by row
        #[serde(default)]
        cells: Vec<Vec<String>>,
        #[serde(default)]
        style_id: Option<String>,
    },
    /// Inserts an inline picture
    InsertImage {
        at: Position,
        data: Vec<u8>,
        #[serde(default)]
        description: String,
        /// Display width in EMU; the height keeps the aspect ratio
        #[serde(default)]
        width: Option<u64>,
    },
    /// Turns a range into a hyperlink to `url`, or to the bookmark `anchor`
    InsertHyperlink {
        range: TextRange,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        anchor: Option<String>,
        #[serde(default)]
        tooltip: Option<String>,
    },
    /// Unwraps the hyperlink at a position, keeping its text
    RemoveHyperlink { at: Position },
    /// Runs template substitution over the whole document
    SetVariables { variables: Value },
    /// Applies a paragraph style to the touched paragraphs or a character style to the range
    ApplyStyle { range: TextRange, style_id: String },
    SplitParagraph { at: Position },
    /// Applies commands in order; fails as a whole if any command fails
    Batch { commands: Vec<Command> },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::InsertText { .. } => "InsertText",
            Command::ReplaceText { .. } => "ReplaceText",
            Command::DeleteRange { .. } => "DeleteRange",
            Command::FormatText { .. } => "FormatText",
            Command::FormatParagraph { .. } => "FormatParagraph",
            Command::ClearFormatting { .. } => "ClearFormatting",
            Command::InsertTable { .. } => "InsertTable",
            Command::InsertImage { .. } => "InsertImage",
            Command::InsertHyperlink { .. } => "InsertHyperlink",
            Command::RemoveHyperlink { .. } => "RemoveHyperlink",
            Command::SetVariables { .. } => "SetVariables",
            Command::ApplyStyle { .. } => "ApplyStyle",
            Command::SplitParagraph { .. } => "SplitParagraph",
            Command::Batch { .. } => "Batch",
        }
    }
}

/// Applies a command and returns the new document
pub fn execute(document: &Document, command: &Command) -> Result<Document, CommandError> {
    execute_with_warnings(document, command).map(|(document, _)| document)
}

/// Applies a command; also returns warnings from template substitution
pub fn execute_with_warnings(document: &Document, command: &Command) -> Result<(Document, Vec<Warning>), CommandError> {
    execute_with(document, command, &TemplateOptions::default())
}

/// Applies a command with explicit template options
pub fn execute_with(
    document: &Document,
    command: &Command,
    options: &TemplateOptions,
) -> Result<(Document, Vec<Warning>), CommandError> {
    let mut warnings = Vec::new();
    let (edited, result) = document.edit(|pkg| apply(pkg, command, options, &mut warnings));
    match result {
        Ok(()) => Ok((edited, warnings)),
        Err(e) => {
            debug!("{} rejected: {}", command.name(), e);
            Err(e)
        }
    }
}

fn apply(
    pkg: &mut DocumentPackage,
    command: &Command,
    options: &TemplateOptions,
    warnings: &mut Vec<Warning>,
) -> Result<(), CommandError> {
    debug!("Executing {}", command.name());
    match command {
        Command::InsertText { at, text, formatting } => {
            check_position(pkg, at)?;
            insert_text(paragraph_mut(pkg, at.paragraph)?, at.offset, text, formatting.as_ref());
            Ok(())
        }
        Command::ReplaceText { range, text } => replace_text(pkg, range, text),
        Command::DeleteRange { range } => {
            check_range(pkg, range)?;
            delete_span(pkg, range)
        }
        Command::FormatText { range, formatting } => {
            check_range(pkg, range)?;
            if let Some(style_id) = &formatting.style_id {
                check_style(pkg, style_id)?;
            }
            for_each_span(pkg, range, |p, start, end| {
                format_range(p, start, end, |f| f.merge(formatting));
            })
        }
        Command::FormatParagraph { range, formatting } => {
            check_range(pkg, range)?;
            if let Some(style_id) = &formatting.style_id {
                check_style(pkg, style_id)?;
            }
            for ordinal in range.start.paragraph..=range.end.paragraph {
                paragraph_mut(pkg, ordinal)?.formatting.merge(formatting);
            }
            Ok(())
        }
        Command::ClearFormatting { range } => {
            check_range(pkg, range)?;
            for_each_span(pkg, range, |p, start, end| {
                format_range(p, start, end, |f| *f = TextFormatting::default());
            })
        }
        Command::InsertTable {
            at,
            rows,
            columns,
            cells,
            style_id,
        } => insert_table(pkg, at, *rows, *columns, cells, style_id.as_deref()),
        Command::InsertImage {
            at,
            data,
            description,
            width,
        } => insert_image(pkg, at, data, description, *width),
        Command::InsertHyperlink {
            range,
            url,
            anchor,
            tooltip,
        } => insert_hyperlink(pkg, range, url.as_deref(), anchor.as_deref(), tooltip.as_deref()),
        Command::RemoveHyperlink { at } => remove_hyperlink(pkg, at),
        Command::SetVariables { variables } => {
            let current = Document::new(pkg.clone());
            let result = substitute_with(&current, variables, options);
            warnings.extend(result.warnings);
            *pkg = result.document.package().clone();
            Ok(())
        }
        Command::ApplyStyle { range, style_id } => apply_style(pkg, range, style_id),
        Command::SplitParagraph { at } => {
            check_position(pkg, at)?;
            let index = block_index(pkg, at.paragraph)?;
            let (left, right) = split_paragraph(paragraph_ref(pkg, at.paragraph)?, at.offset);
            pkg.body.splice(index..=index, [Block::paragraph(left), Block::paragraph(right)]);
            Ok(())
        }
        Command::Batch { commands } => {
            for command in commands {
                apply(pkg, command, options, warnings)?;
            }
            Ok(())
        }
    }
}

// ============================================================================
// Addressing
// ============================================================================

fn block_index(pkg: &DocumentPackage, ordinal: usize) -> Result<usize, CommandError> {
    pkg.body
        .iter()
        .enumerate()
        .filter(|(_, block)| matches!(block, Block::Paragraph(_)))
        .nth(ordinal)
        .map(|(index, _)| index)
        .ok_or_else(|| CommandError::InvalidRange(format!("paragraph {} does not exist", ordinal)))
}

fn paragraph_ref(pkg: &DocumentPackage, ordinal: usize) -> Result<&Paragraph, CommandError> {
    let index = block_index(pkg, ordinal)?;
    pkg.body[index]
        .as_paragraph()
        .ok_or_else(|| CommandError::InvalidRange(format!("paragraph {} does not exist", ordinal)))
}

fn paragraph_mut(pkg: &mut DocumentPackage, ordinal: usize) -> Result<&mut Paragraph, CommandError> {
    let index = block_index(pkg, ordinal)?;
    match &mut pkg.body[index] {
        Block::Paragraph(p) => Ok(Arc::make_mut(p)),
        _ => Err(CommandError::InvalidRange(format!("paragraph {} does not exist", ordinal))),
    }
}

fn check_position(pkg: &DocumentPackage, at: &Position) -> Result<(), CommandError> {
    let len = paragraph_ref(pkg, at.paragraph)?.len();
    if at.offset > len {
        return Err(CommandError::InvalidRange(format!(
            "offset {} is past the end of paragraph {} ({} characters)",
            at.offset, at.paragraph, len
        )));
    }
    Ok(())
}

fn check_range(pkg: &DocumentPackage, range: &TextRange) -> Result<(), CommandError> {
    check_position(pkg, &range.start)?;
    check_position(pkg, &range.end)?;
    if range.end < range.start {
        return Err(CommandError::InvalidRange(format!(
            "range ends ({}:{}) before it starts ({}:{})",
            range.end.paragraph, range.end.offset, range.start.paragraph, range.start.offset
        )));
    }
    Ok(())
}

fn check_style(pkg: &DocumentPackage, style_id: &str) -> Result<StyleType, CommandError> {
    pkg.styles
        .get(style_id)
        .map(|style| style.style_type)
        .ok_or_else(|| CommandError::UnknownStyle(style_id.to_string()))
}

/// Calls `f` with the part of `range` inside each paragraph it touches
fn for_each_span(
    pkg: &mut DocumentPackage,
    range: &TextRange,
    mut f: impl FnMut(&mut Paragraph, usize, usize),
) -> Result<(), CommandError> {
    for ordinal in range.start.paragraph..=range.end.paragraph {
        let p = paragraph_mut(pkg, ordinal)?;
        let start = if ordinal == range.start.paragraph {
            range.start.offset
        } else {
            0
        };
        let end = if ordinal == range.end.paragraph {
            range.end.offset
        } else {
            p.len()
        };
        f(p, start, end);
    }
    Ok(())
}

// ============================================================================
// Text
// ============================================================================

/// Deletes a checked range; a range over several paragraphs merges them into the first
fn delete_span(pkg: &mut DocumentPackage, range: &TextRange) -> Result<(), CommandError> {
    let (start, end) = (range.start, range.end);
    if start.paragraph == end.paragraph {
        delete_range(paragraph_mut(pkg, start.paragraph)?, start.offset, end.offset);
        return Ok(());
    }
    let first = block_index(pkg, start.paragraph)?;
    let last = block_index(pkg, end.paragraph)?;
    let (_, tail) = split_paragraph(paragraph_ref(pkg, end.paragraph)?, end.offset);
    let head = paragraph_mut(pkg, start.paragraph)?;
    let len = head.len();
    delete_range(head, start.offset, len);
    merge_paragraphs(head, &tail);
    debug!("Merged paragraphs {} to {}", start.paragraph, end.paragraph);
    pkg.body.drain(first + 1..=last);
    Ok(())
}

fn replace_text(pkg: &mut DocumentPackage, range: &TextRange, text: &str) -> Result<(), CommandError> {
    check_range(pkg, range)?;
    if range.start.paragraph == range.end.paragraph {
        let paragraph = paragraph_mut(pkg, range.start.paragraph)?;
        replace_range(paragraph, range.start.offset, range.end.offset, text);
        return Ok(());
    }
    let first = paragraph_ref(pkg, range.start.paragraph)?;
    let formatting = formatting_at(first, range.start.offset).cloned();
    delete_span(pkg, range)?;
    insert_text(
        paragraph_mut(pkg, range.start.paragraph)?,
        range.start.offset,
        text,
        formatting.as_ref(),
    );
    Ok(())
}

fn apply_style(pkg: &mut DocumentPackage, range: &TextRange, style_id: &str) -> Result<(), CommandError> {
    check_range(pkg, range)?;
    match check_style(pkg, style_id)? {
        StyleType::Paragraph => {
            for ordinal in range.start.paragraph..=range.end.paragraph {
                paragraph_mut(pkg, ordinal)?.formatting.style_id = Some(style_id.to_string());
            }
            Ok(())
        }
        StyleType::Character => for_each_span(pkg, range, |p, start, end| {
            format_range(p, start, end, |f| f.style_id = Some(style_id.to_string()));
        }),
        other => Err(CommandError::InvalidArgument(format!(
            "{} is a {} style and cannot be applied to text",
            style_id,
            other.as_attr()
        ))),
    }
}

// ============================================================================
// Tables and images
// ============================================================================

/// Replaces the paragraph at `at` with `blocks` placed between its two halves
fn insert_blocks(pkg: &mut DocumentPackage, at: &Position, blocks: Vec<Block>) -> Result<(), CommandError> {
    let index = block_index(pkg, at.paragraph)?;
    let paragraph = paragraph_ref(pkg, at.paragraph)?;
    let len = paragraph.len();
    let mut replacement = Vec::with_capacity(blocks.len() + 2);
    if at.offset == 0 {
        replacement.extend(blocks);
        replacement.push(pkg.body[index].clone());
    } else if at.offset == len {
        replacement.push(pkg.body[index].clone());
        replacement.extend(blocks);
    } else {
        let (left, right) = split_paragraph(paragraph, at.offset);
        replacement.push(Block::paragraph(left));
        replacement.extend(blocks);
        replacement.push(Block::paragraph(right));
    }
    pkg.body.splice(index..=index, replacement);
    Ok(())
}

fn insert_table(
    pkg: &mut DocumentPackage,
    at: &Position,
    rows: usize,
    columns: usize,
    cells: &[Vec<String>],
    style_id: Option<&str>,
) -> Result<(), CommandError> {
    check_position(pkg, at)?;
    if rows == 0 || columns == 0 {
        return Err(CommandError::InvalidArgument(format!(
            "a table needs at least one row and one column, got {}x{}",
            rows, columns
        )));
    }
    if cells.len() > rows || cells.iter().any(|row| row.len() > columns) {
        return Err(CommandError::InvalidArgument(format!(
            "cell text does not fit a {}x{} table",
            rows, columns
        )));
    }
    if let Some(style_id) = style_id {
        if check_style(pkg, style_id)? != StyleType::Table {
            return Err(CommandError::InvalidArgument(format!("{} is not a table style", style_id)));
        }
    }

    let width = pkg.section.text_width().unwrap_or(DEFAULT_TEXT_WIDTH);
    let mut table = Table::grid_of(rows, columns, width);
    table.properties.style_id = style_id.map(str::to_string);
    for (row, texts) in table.rows.iter_mut().zip(cells) {
        for (cell, text) in row.cells.iter_mut().zip(texts) {
            *cell = TableCell {
                content: TableCell::with_text(text).content,
                ..cell.clone()
            };
        }
    }
    insert_blocks(pkg, at, vec![Block::table(table)])?;
    // a table cannot end the body
    if matches!(pkg.body.last(), Some(Block::Table(_))) {
        pkg.body.push(Block::paragraph(Paragraph::new()));
    }
    Ok(())
}

fn insert_image(
    pkg: &mut DocumentPackage,
    at: &Position,
    data: &[u8],
    description: &str,
    width: Option<u64>,
) -> Result<(), CommandError> {
    check_position(pkg, at)?;
    let info = ImageInfo::from_bytes(data).map_err(|e| CommandError::InvalidArgument(e.to_string()))?;
    let (cx, cy) = match width {
        Some(0) => return Err(CommandError::InvalidArgument("image width must be positive".to_string())),
        Some(cx) => info
            .extent_for_width(cx)
            .ok_or_else(|| CommandError::InvalidArgument(format!("image width {} EMU is out of range", cx)))?,
        None => {
            let max = pkg.section.text_width().map(|w| w as u64 * EMU_PER_TWIP);
            info.extent_emu(max)
        }
    };

    let path = pkg.next_media_name(info.format.extension());
    pkg.media.insert(
        path.clone(),
        MediaFile {
            path: path.clone(),
            content_type: info.format.mime_type().to_string(),
            data: Arc::from(data),
        },
    );
    let embed = pkg
        .relationships_mut(MAIN_PART)
        .add(RelationshipType::Image, path.as_str(), TargetMode::Internal);
    let prefixes = relationship_prefixes(&pkg.root_attributes);
    let xml = InlinePicture {
        embed: &embed,
        rel_prefix: &prefixes[0],
        cx,
        cy,
        id: max_drawing_id(&pkg.body) + 1,
        description,
    }
    .to_element();
    debug!("Inserted {} ({}x{} px) as {}", path, info.width, info.height, embed);

    let mut run = Run::default();
    run.content.push(RunContent::Drawing(Drawing {
        embed: Some(embed),
        xml,
    }));
    insert_inlines(paragraph_mut(pkg, at.paragraph)?, at.offset, vec![Inline::Run(run)]);
    Ok(())
}

// ============================================================================
// Hyperlinks
// ============================================================================

fn insert_hyperlink(
    pkg: &mut DocumentPackage,
    range: &TextRange,
    url: Option<&str>,
    anchor: Option<&str>,
    tooltip: Option<&str>,
) -> Result<(), CommandError> {
    check_range(pkg, range)?;
    if range.start.paragraph != range.end.paragraph {
        return Err(CommandError::Unsupported("a hyperlink cannot span paragraphs".to_string()));
    }
    if range.is_collapsed() {
        return Err(CommandError::InvalidArgument("hyperlink range is empty".to_string()));
    }
    if url.is_none() && anchor.is_none() {
        return Err(CommandError::InvalidArgument("hyperlink needs a url or an anchor".to_string()));
    }

    let (ordinal, start, end) = (range.start.paragraph, range.start.offset, range.end.offset);
    for inline in extract_range(paragraph_ref(pkg, ordinal)?, start, end) {
        match inline {
            Inline::Hyperlink(_) => {
                return Err(CommandError::InvalidArgument(
                    "range overlaps an existing hyperlink".to_string(),
                ))
            }
            Inline::SimpleField(_) | Inline::Opaque(_) => {
                return Err(CommandError::Unsupported(
                    "range contains a field or an unsupported element".to_string(),
                ))
            }
            _ => {}
        }
    }

    let target = match url {
        Some(url) => LinkTarget::Relationship(pkg.relationships_mut(MAIN_PART).add(
            RelationshipType::Hyperlink,
            url,
            TargetMode::External,
        )),
        None => LinkTarget::Local,
    };
    let style = pkg
        .styles
        .contains(HYPERLINK_STYLE)
        .then(|| HYPERLINK_STYLE.to_string());

    splice_range(paragraph_mut(pkg, ordinal)?, start, end, |middle| {
        let mut before = Vec::new();
        let mut runs = Vec::new();
        let mut after = Vec::new();
        for inline in middle {
            match inline {
                Inline::Run(mut run) => {
                    if style.is_some() {
                        run.formatting.style_id = style.clone();
                    }
                    runs.push(run);
                }
                Inline::BookmarkEnd { .. } => after.push(inline),
                other => before.push(other),
            }
        }
        before.push(Inline::Hyperlink(Hyperlink {
            history: url.map(|_| true),
            target,
            anchor: anchor.map(str::to_string),
            tooltip: tooltip.map(str::to_string),
            runs,
        }));
        before.extend(after);
        before
    });
    Ok(())
}

fn remove_hyperlink(pkg: &mut DocumentPackage, at: &Position) -> Result<(), CommandError> {
    check_position(pkg, at)?;
    let paragraph = paragraph_mut(pkg, at.paragraph)?;
    let mut pos = 0;
    let mut found = None;
    for (i, inline) in paragraph.content.iter().enumerate() {
        let len: usize = inline.runs().iter().map(Run::len).sum();
        if matches!(inline, Inline::Hyperlink(_)) && len > 0 && pos <= at.offset && at.offset <= pos + len {
            found = Some(i);
            break;
        }
        pos += len;
    }
    let Some(index) = found else {
        return Err(CommandError::InvalidArgument(format!(
            "no hyperlink at {}:{}",
            at.paragraph, at.offset
        )));
    };
    let Inline::Hyperlink(link) = paragraph.content.remove(index) else {
        return Ok(());
    };
    let runs = link.runs.into_iter().map(|mut run| {
        if run.formatting.style_id.as_deref() == Some(HYPERLINK_STYLE) {
            run.formatting.style_id = None;
        }
        Inline::Run(run)
    });
    paragraph.content.splice(index..index, runs);
    normalize(&mut paragraph.content);

    if let LinkTarget::Relationship(id) = link.target {
        let mut still_used = false;
        visit_paragraphs(&pkg.body, &mut |p| {
            still_used = still_used
                || p.content
                    .iter()
                    .any(|i| matches!(i, Inline::Hyperlink(h) if h.target == LinkTarget::Relationship(id.clone())));
        });
        let is_link = pkg
            .relationship(MAIN_PART, &id)
            .is_some_and(|rel| rel.rel_type == RelationshipType::Hyperlink);
        if !still_used && is_link {
            pkg.relationships_mut(MAIN_PART).remove(&id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::MAX_EXTENT_EMU;
    use crate::model::{Style, Underline};
    use serde_json::json;

    fn doc(paragraphs: &[&str]) -> Document {
        let (doc, _) = Document::empty().edit(|pkg| {
            pkg.body = paragraphs
                .iter()
                .map(|text| Block::paragraph(Paragraph::with_text(text)))
                .collect();
        });
        doc
    }

    fn texts(doc: &Document) -> Vec<String> {
        doc.body()
            .iter()
            .filter_map(Block::as_paragraph)
            .map(Paragraph::text)
            .collect()
    }

    fn bold() -> TextFormatting {
        TextFormatting {
            bold: Some(true),
            ..Default::default()
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x0D]);
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[0x08, 0x02, 0x00, 0x00, 0x00, 0, 0, 0, 0]);
        data
    }

    #[test]
    fn test_insert_text() {
        let d = doc(&["Hello"]);
        let out = execute(
            &d,
            &Command::InsertText {
                at: Position::new(0, 5),
                text: ", world".to_string(),
                formatting: None,
            },
        )
        .unwrap();
        assert_eq!(texts(&out), vec!["Hello, world"]);
        // the input is a separate value
        assert_eq!(texts(&d), vec!["Hello"]);
    }

    #[test]
    fn test_invalid_ranges_are_rejected() {
        let d = doc(&["Hello", "World"]);
        let bad = [
            Command::DeleteRange {
                range: TextRange::within(0, 2, 9),
            },
            Command::DeleteRange {
                range: TextRange::within(5, 0, 1),
            },
            Command::DeleteRange {
                range: TextRange::new(Position::new(1, 0), Position::new(0, 2)),
            },
            Command::InsertText {
                at: Position::new(0, 6),
                text: "x".to_string(),
                formatting: None,
            },
        ];
        for command in &bad {
            assert!(matches!(execute(&d, command), Err(CommandError::InvalidRange(_))), "{:?}", command);
        }
        assert_eq!(texts(&d), vec!["Hello", "World"]);
    }

    #[test]
    fn test_delete_across_paragraphs_merges() {
        let d = doc(&["zero", "one", "two", "three", "four", "five"]);
        let out = execute(
            &d,
            &Command::DeleteRange {
                range: TextRange::new(Position::new(3, 2), Position::new(5, 2)),
            },
        )
        .unwrap();
        assert_eq!(texts(&out), vec!["zero", "one", "two", "thve"]);
    }

    #[test]
    fn test_replace_keeps_first_character_formatting() {
        let (d, _) = Document::empty().edit(|pkg| {
            pkg.body = vec![Block::paragraph(Paragraph {
                content: vec![
                    Inline::Run(Run::text("plain ")),
                    Inline::Run(Run::text("bold").with_formatting(bold())),
                ],
                ..Default::default()
            })];
        });
        let out = execute(
            &d,
            &Command::ReplaceText {
                range: TextRange::within(0, 6, 10),
                text: "strong".to_string(),
            },
        )
        .unwrap();
        let p = out.paragraph(0).unwrap();
        assert_eq!(p.text(), "plain strong");
        assert_eq!(formatting_at(p, 7), Some(&bold()));
    }

    #[test]
    fn test_replace_across_paragraphs() {
        let d = doc(&["first line", "second line"]);
        let out = execute(
            &d,
            &Command::ReplaceText {
                range: TextRange::new(Position::new(0, 6), Position::new(1, 7)),
                text: "and last ".to_string(),
            },
        )
        .unwrap();
        assert_eq!(texts(&out), vec!["first and last line"]);
    }

    #[test]
    fn test_format_text_merges() {
        let d = doc(&["Hello world"]);
        let underline = TextFormatting {
            underline: Some(Underline::Single),
            ..Default::default()
        };
        let out = execute(
            &d,
            &Command::FormatText {
                range: TextRange::within(0, 0, 5),
                formatting: bold(),
            },
        )
        .unwrap();
        let out = execute(
            &out,
            &Command::FormatText {
                range: TextRange::within(0, 0, 11),
                formatting: underline,
            },
        )
        .unwrap();
        let p = out.paragraph(0).unwrap();
        let first = formatting_at(p, 0).unwrap();
        assert_eq!(first.bold, Some(true));
        assert_eq!(first.underline, Some(Underline::Single));
        let last = formatting_at(p, 8).unwrap();
        assert_eq!(last.bold, None);
        assert_eq!(last.underline, Some(Underline::Single));

        let cleared = execute(
            &out,
            &Command::ClearFormatting {
                range: TextRange::within(0, 0, 11),
            },
        )
        .unwrap();
        let p = cleared.paragraph(0).unwrap();
        assert!(p.runs().all(|r| r.formatting.is_empty()));
        assert_eq!(p.runs().count(), 1);
    }

    #[test]
    fn test_format_paragraph_and_styles() {
        let d = doc(&["a", "b", "c"]);
        let out = execute(
            &d,
            &Command::ApplyStyle {
                range: TextRange::new(Position::new(0, 0), Position::new(1, 0)),
                style_id: "Heading1".to_string(),
            },
        )
        .unwrap();
        let styles: Vec<Option<String>> = (0..3)
            .map(|i| out.paragraph(i).unwrap().formatting.style_id.clone())
            .collect();
        assert_eq!(styles, vec![Some("Heading1".to_string()), Some("Heading1".to_string()), None]);

        let unknown = execute(
            &d,
            &Command::ApplyStyle {
                range: TextRange::within(0, 0, 1),
                style_id: "Nope".to_string(),
            },
        );
        assert_eq!(unknown, Err(CommandError::UnknownStyle("Nope".to_string())));

        let keep = execute(
            &d,
            &Command::FormatParagraph {
                range: TextRange::within(2, 0, 0),
                formatting: ParagraphFormatting {
                    keep_next: Some(true),
                    ..Default::default()
                },
            },
        )
        .unwrap();
        assert_eq!(keep.paragraph(2).unwrap().formatting.keep_next, Some(true));
    }

    #[test]
    fn test_apply_character_style() {
        let (d, _) = Document::empty().edit(|pkg| {
            pkg.body = vec![Block::paragraph(Paragraph::with_text("quoted text"))];
            Arc::make_mut(&mut pkg.styles).upsert(Style::new("Quote", StyleType::Character).named("Quote"));
        });
        let out = execute(
            &d,
            &Command::ApplyStyle {
                range: TextRange::within(0, 0, 6),
                style_id: "Quote".to_string(),
            },
        )
        .unwrap();
        let p = out.paragraph(0).unwrap();
        assert_eq!(formatting_at(p, 0).unwrap().style_id.as_deref(), Some("Quote"));
        assert_eq!(formatting_at(p, 7).unwrap().style_id, None);
        assert_eq!(p.formatting.style_id, None);
    }

    #[test]
    fn test_insert_table_splits_paragraph() {
        let d = doc(&["before after"]);
        let out = execute(
            &d,
            &Command::InsertTable {
                at: Position::new(0, 7),
                rows: 2,
                columns: 3,
                cells: vec![vec!["a".to_string(), "b".to_string()]],
                style_id: Some("TableGrid".to_string()),
            },
        )
        .unwrap();
        assert_eq!(out.body().len(), 3);
        assert_eq!(texts(&out), vec!["before ", "after"]);
        let table = out.body()[1].as_table().unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.column_count(), 3);
        assert!(table.check_structure().is_empty());
        assert_eq!(table.properties.style_id.as_deref(), Some("TableGrid"));
        assert_eq!(table.rows[0].cells[1].content[0].as_paragraph().unwrap().text(), "b");
        assert_eq!(table.rows[1].cells[2].content.len(), 1);
    }

    #[test]
    fn test_insert_table_at_end_adds_paragraph() {
        let d = doc(&["text"]);
        let out = execute(
            &d,
            &Command::InsertTable {
                at: Position::new(0, 4),
                rows: 1,
                columns: 1,
                cells: Vec::new(),
                style_id: None,
            },
        )
        .unwrap();
        assert!(matches!(out.body(), [Block::Paragraph(_), Block::Table(_), Block::Paragraph(_)]));
    }

    #[test]
    fn test_insert_table_rejects_bad_shapes() {
        let d = doc(&["text"]);
        let zero = Command::InsertTable {
            at: Position::new(0, 0),
            rows: 0,
            columns: 2,
            cells: Vec::new(),
            style_id: None,
        };
        assert!(matches!(execute(&d, &zero), Err(CommandError::InvalidArgument(_))));
        let not_table = Command::InsertTable {
            at: Position::new(0, 0),
            rows: 1,
            columns: 1,
            cells: Vec::new(),
            style_id: Some("Heading1".to_string()),
        };
        assert!(matches!(execute(&d, &not_table), Err(CommandError::InvalidArgument(_))));
    }

    #[test]
    fn test_insert_image() {
        let d = doc(&["logo: "]);
        let out = execute(
            &d,
            &Command::InsertImage {
                at: Position::new(0, 6),
                data: png(200, 100),
                description: "logo".to_string(),
                width: Some(914_400),
            },
        )
        .unwrap();
        let pkg = out.package();
        let media = pkg.media.get("word/media/image1.png").unwrap();
        assert_eq!(media.content_type, "image/png");
        let p = out.paragraph(0).unwrap();
        let drawing = p
            .runs()
            .flat_map(|r| r.content.iter())
            .find_map(|item| match item {
                RunContent::Drawing(d) => Some(d),
                _ => None,
            })
            .unwrap();
        let embed = drawing.embed.clone().unwrap();
        let rel = out.relationship(MAIN_PART, &embed).unwrap();
        assert_eq!(rel.rel_type, RelationshipType::Image);
        assert_eq!(rel.target, "word/media/image1.png");
        let extent = drawing.xml.child("inline").unwrap().child("extent").unwrap();
        assert_eq!(extent.attr("cx"), Some("914400"));
        assert_eq!(extent.attr("cy"), Some("457200"));
        assert_eq!(max_drawing_id(out.body()), 1);
    }

    #[test]
    fn test_insert_image_rejects_garbage() {
        let d = doc(&["x"]);
        let result = execute(
            &d,
            &Command::InsertImage {
                at: Position::new(0, 0),
                data: Vec::new(),
                description: String::new(),
                width: None,
            },
        );
        assert!(matches!(result, Err(CommandError::InvalidArgument(_))));
        assert!(d.package().media.is_empty());
    }

    #[test]
    fn test_insert_image_rejects_oversized_width() {
        let d = doc(&["x"]);
        for width in [u64::MAX / 2, u64::MAX, MAX_EXTENT_EMU] {
            let result = execute(
                &d,
                &Command::InsertImage {
                    at: Position::new(0, 0),
                    data: png(1, 10),
                    description: String::new(),
                    width: Some(width),
                },
            );
            assert!(matches!(result, Err(CommandError::InvalidArgument(_))), "width {}", width);
        }

        let json = format!(
            r#"{{"type": "InsertImage", "at": {{"paragraph": 0, "offset": 0}}, "data": {:?}, "description": "", "width": {}}}"#,
            png(1, 10),
            u64::MAX / 2
        );
        let command: Command = serde_json::from_str(&json).unwrap();
        assert!(matches!(execute(&d, &command), Err(CommandError::InvalidArgument(_))));
        assert!(d.package().media.is_empty());
    }

    #[test]
    fn test_insert_and_remove_hyperlink() {
        let d = doc(&["see the docs here"]);
        let out = execute(
            &d,
            &Command::InsertHyperlink {
                range: TextRange::within(0, 8, 12),
                url: Some("https://example.com".to_string()),
                anchor: None,
                tooltip: None,
            },
        )
        .unwrap();
        let p = out.paragraph(0).unwrap();
        assert_eq!(p.text(), "see the docs here");
        let Inline::Hyperlink(link) = &p.content[1] else {
            panic!("expected a hyperlink, got {:?}", p.content);
        };
        let LinkTarget::Relationship(id) = &link.target else {
            panic!("expected a relationship target");
        };
        let rel = out.relationship(MAIN_PART, id).unwrap();
        assert_eq!(rel.target, "https://example.com");
        assert_eq!(rel.mode, TargetMode::External);
        assert_eq!(link.runs[0].formatting.style_id.as_deref(), Some(HYPERLINK_STYLE));

        let overlap = execute(
            &out,
            &Command::InsertHyperlink {
                range: TextRange::within(0, 10, 15),
                url: None,
                anchor: Some("top".to_string()),
                tooltip: None,
            },
        );
        assert!(matches!(overlap, Err(CommandError::InvalidArgument(_))));

        let removed = execute(&out, &Command::RemoveHyperlink { at: Position::new(0, 9) }).unwrap();
        let p = removed.paragraph(0).unwrap();
        assert!(matches!(&p.content[..], [Inline::Run(_)]));
        assert!(removed.relationship(MAIN_PART, id).is_none());
    }

    #[test]
    fn test_hyperlink_across_paragraphs_is_unsupported() {
        let d = doc(&["one", "two"]);
        let result = execute(
            &d,
            &Command::InsertHyperlink {
                range: TextRange::new(Position::new(0, 1), Position::new(1, 1)),
                url: Some("https://example.com".to_string()),
                anchor: None,
                tooltip: None,
            },
        );
        assert!(matches!(result, Err(CommandError::Unsupported(_))));
    }

    #[test]
    fn test_split_paragraph() {
        let d = doc(&["HelloWorld"]);
        let out = execute(&d, &Command::SplitParagraph { at: Position::new(0, 5) }).unwrap();
        assert_eq!(texts(&out), vec!["Hello", "World"]);
    }

    #[test]
    fn test_set_variables_returns_warnings() {
        let d = doc(&["Dear {name}, {missing}"]);
        let (out, warnings) = execute_with_warnings(
            &d,
            &Command::SetVariables {
                variables: json!({"name": "Ada"}),
            },
        )
        .unwrap();
        assert_eq!(texts(&out), vec!["Dear Ada, "]);
        assert_eq!(
            warnings,
            vec![Warning::UnresolvedVariable {
                name: "missing".to_string()
            }]
        );
    }

    #[test]
    fn test_batch_is_atomic() {
        let d = doc(&["abc"]);
        let batch = Command::Batch {
            commands: vec![
                Command::InsertText {
                    at: Position::new(0, 3),
                    text: "d".to_string(),
                    formatting: None,
                },
                Command::DeleteRange {
                    range: TextRange::within(0, 0, 10),
                },
            ],
        };
        assert!(matches!(execute(&d, &batch), Err(CommandError::InvalidRange(_))));
        assert_eq!(texts(&d), vec!["abc"]);

        let ok = Command::Batch {
            commands: vec![
                Command::InsertText {
                    at: Position::new(0, 3),
                    text: "d".to_string(),
                    formatting: None,
                },
                Command::DeleteRange {
                    range: TextRange::within(0, 0, 1),
                },
            ],
        };
        assert_eq!(texts(&execute(&d, &ok).unwrap()), vec!["bcd"]);
    }

    #[test]
    fn test_command_from_json() {
        let command: Command = serde_json::from_str(
            r#"{"type": "ReplaceText",
                "range": {"start": {"paragraph": 0, "offset": 1}, "end": {"paragraph": 0, "offset": 3}},
                "text": "XY"}"#,
        )
        .unwrap();
        assert_eq!(
            command,
            Command::ReplaceText {
                range: TextRange::within(0, 1, 3),
                text: "XY".to_string()
            }
        );
        let insert: Command =
            serde_json::from_str(r#"{"type": "InsertText", "at": {"paragraph": 0, "offset": 0}, "text": "x"}"#).unwrap();
        assert_eq!(insert.name(), "InsertText");
    }
}
