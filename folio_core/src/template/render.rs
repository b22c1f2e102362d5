//! Section expansion and variable substitution over block lists

use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;

use super::scope::{section_elements, to_text, Scope};
use super::tags::{pair_tags, scan_tags, Tag, TagKind};
use crate::config::TemplateOptions;
use crate::editing::{delete_range, formatting_at, insert_inlines, normalize, split_inlines, split_paragraph};
use crate::model::{visit_paragraphs, Block, DocumentPackage, Inline, Paragraph, Run, RunContent, Table, TableRow};
use crate::ooxml::read_fragment;
use crate::text_index::TextIndex;
use crate::warning::Warning;

fn paragraph_tags(paragraph: &Paragraph) -> Vec<Tag> {
    scan_tags(&TextIndex::new(paragraph))
}

fn is_blank(paragraph: &Paragraph) -> bool {
    paragraph.text().trim().is_empty()
}

fn has_tag_start(blocks: &[Block]) -> bool {
    let mut found = false;
    visit_paragraphs(blocks, &mut |p| {
        found = found
            || p.runs()
                .flat_map(|run| run.content.iter())
                .any(|item| matches!(item, RunContent::Text(t) if t.contains('{')));
    });
    found
}

/// Renders the stories of one package
pub struct Renderer<'a> {
    package: &'a DocumentPackage,
    options: &'a TemplateOptions,
    /// Part whose relationships fragments resolve against
    part: String,
    warnings: Vec<Warning>,
}

impl<'a> Renderer<'a> {
    pub fn new(package: &'a DocumentPackage, options: &'a TemplateOptions) -> Self {
        Renderer {
            package,
            options,
            part: String::new(),
            warnings: Vec::new(),
        }
    }

    /// Warnings in first-seen order, each reported once
    pub fn finish(self) -> Vec<Warning> {
        let mut unique: Vec<Warning> = Vec::with_capacity(self.warnings.len());
        for warning in self.warnings {
            if !unique.contains(&warning) {
                unique.push(warning);
            }
        }
        unique
    }

    pub fn render_story(&mut self, part: &str, blocks: &[Block], scope: &Scope<'_>) -> Vec<Block> {
        self.part = part.to_string();
        if !has_tag_start(blocks) {
            return blocks.to_vec();
        }
        debug!("Rendering template tags in {}", part);
        self.render_blocks(blocks, scope)
    }

    fn unbalanced(&mut self, tag: &Tag) {
        warn!("Unbalanced template tag {}", tag.source());
        self.warnings.push(Warning::UnbalancedTag { tag: tag.source() });
    }

    fn resolve_text(&mut self, name: &str, scope: &Scope<'_>) -> String {
        match scope.lookup(name) {
            Some(value) => to_text(value),
            None => {
                if self.options.warn_unresolved {
                    self.warnings.push(Warning::UnresolvedVariable { name: name.to_string() });
                }
                String::new()
            }
        }
    }

    // ------------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------------

    /// Expands the first paragraph-range section of the list, recursing into the rest
    fn render_blocks(&mut self, blocks: &[Block], scope: &Scope<'_>) -> Vec<Block> {
        let located: Vec<(usize, Tag)> = blocks
            .iter()
            .enumerate()
            .filter_map(|(i, block)| block.as_paragraph().map(|p| (i, p)))
            .flat_map(|(i, p)| paragraph_tags(p).into_iter().map(move |tag| (i, tag)))
            .collect();
        let pairing = pair_tags(located.iter().map(|(_, tag)| tag));
        let range = pairing
            .pairs
            .iter()
            .find(|(open, close)| located[*open].0 != located[*close].0);

        let Some(&(open, close)) = range else {
            let mut out = Vec::with_capacity(blocks.len());
            for block in blocks {
                out.extend(self.render_block(block, scope));
            }
            return out;
        };

        let (open_at, open_tag) = &located[open];
        let (close_at, close_tag) = &located[close];
        let (Some(open_p), Some(close_p)) = (blocks[*open_at].as_paragraph(), blocks[*close_at].as_paragraph())
        else {
            return blocks.to_vec();
        };

        let (before, _) = split_paragraph(open_p, open_tag.start);
        let (_, first) = split_paragraph(open_p, open_tag.end);
        let (last, _) = split_paragraph(close_p, close_tag.start);
        let (_, after) = split_paragraph(close_p, close_tag.end);

        let mut out = Vec::new();
        for block in &blocks[..*open_at] {
            out.extend(self.render_block(block, scope));
        }
        if !is_blank(&before) {
            out.extend(self.render_paragraph(before, scope));
        }

        let mut body = Vec::new();
        if !is_blank(&first) {
            body.push(Block::paragraph(first));
        }
        body.extend(blocks[*open_at + 1..*close_at].iter().cloned());
        if !is_blank(&last) {
            body.push(Block::paragraph(last));
        }
        let inverted = open_tag.kind == TagKind::InvertedOpen;
        let elements = section_elements(scope.lookup(&open_tag.name), inverted);
        debug!("Section {} renders {} time(s)", open_tag.source(), elements.len());
        for element in elements {
            let inner = scope.enter(&open_tag.name, element);
            out.extend(self.render_blocks(&body, &inner));
        }

        let mut tail = Vec::new();
        if !is_blank(&after) {
            tail.push(Block::paragraph(after));
        }
        tail.extend(blocks[*close_at + 1..].iter().cloned());
        out.extend(self.render_blocks(&tail, scope));
        out
    }

    fn render_block(&mut self, block: &Block, scope: &Scope<'_>) -> Vec<Block> {
        match block {
            Block::Paragraph(p) => {
                if paragraph_tags(p).is_empty() {
                    vec![block.clone()]
                } else {
                    self.render_paragraph(p.as_ref().clone(), scope)
                }
            }
            Block::Table(t) => {
                if has_tag_start(std::slice::from_ref(block)) {
                    vec![Block::table(self.render_table(t, scope))]
                } else {
                    vec![block.clone()]
                }
            }
            Block::Opaque(_) => vec![block.clone()],
        }
    }

    // ------------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------------

    fn render_table(&mut self, table: &Table, scope: &Scope<'_>) -> Table {
        let mut rows = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            rows.extend(self.render_row(row.clone(), scope));
        }
        Table {
            properties: table.properties.clone(),
            grid: table.grid.clone(),
            rows,
        }
    }

    /// Repeats a row whose section markers sit in different cells
    fn render_row(&mut self, mut row: TableRow, scope: &Scope<'_>) -> Vec<TableRow> {
        // (cell, block, tag)
        let located: Vec<(usize, usize, Tag)> = row
            .cells
            .iter()
            .enumerate()
            .flat_map(|(c, cell)| {
                cell.content
                    .iter()
                    .enumerate()
                    .filter_map(|(b, block)| block.as_paragraph().map(|p| (b, p)))
                    .flat_map(move |(b, p)| paragraph_tags(p).into_iter().map(move |tag| (c, b, tag)))
            })
            .collect();
        let pairing = pair_tags(located.iter().map(|(_, _, tag)| tag));
        let crossing = pairing
            .pairs
            .iter()
            .find(|(open, close)| located[*open].0 != located[*close].0);

        let Some(&(open, close)) = crossing else {
            for cell in &mut row.cells {
                let mut content = self.render_blocks(&cell.content, scope);
                if !content.iter().any(|b| matches!(b, Block::Paragraph(_))) {
                    content.push(Block::paragraph(Paragraph::new()));
                }
                cell.content = content;
            }
            return vec![row];
        };

        let open_tag = located[open].2.clone();
        for &(c, b, ref tag) in [&located[close], &located[open]] {
            if let Some(Block::Paragraph(p)) = row.cells.get_mut(c).and_then(|cell| cell.content.get_mut(b)) {
                delete_range(Arc::make_mut(p), tag.start, tag.end);
            }
        }

        let inverted = open_tag.kind == TagKind::InvertedOpen;
        let elements = section_elements(scope.lookup(&open_tag.name), inverted);
        debug!("Row section {} renders {} time(s)", open_tag.source(), elements.len());
        let mut rows = Vec::new();
        for element in elements {
            let inner = scope.enter(&open_tag.name, element);
            rows.extend(self.render_row(row.clone(), &inner));
        }
        rows
    }

    // ------------------------------------------------------------------------
    // Paragraphs
    // ------------------------------------------------------------------------

    fn render_paragraph(&mut self, paragraph: Paragraph, scope: &Scope<'_>) -> Vec<Block> {
        let tags = paragraph_tags(&paragraph);
        if let [tag] = tags.as_slice() {
            if tag.kind == TagKind::Raw && self.options.raw_xml {
                let index = TextIndex::new(&paragraph);
                let alone = index.slice(0, tag.start).trim().is_empty()
                    && index.slice(tag.end, index.len()).trim().is_empty();
                if alone {
                    if let Some(blocks) = self.fragment(&tag.name, scope) {
                        return blocks;
                    }
                }
            }
        }
        vec![Block::paragraph(self.render_inline(paragraph, scope))]
    }

    /// Blocks of a `{@name}` value; `None` when it is not a parsable fragment
    fn fragment(&mut self, name: &str, scope: &Scope<'_>) -> Option<Vec<Block>> {
        let Some(Value::String(xml)) = scope.lookup(name) else {
            return None;
        };
        let mut warnings = Vec::new();
        match read_fragment(xml, &self.part, self.package, &mut warnings) {
            Ok(blocks) => {
                self.warnings.extend(warnings);
                Some(blocks)
            }
            Err(e) => {
                warn!("Value of {{@{}}} is not a WordprocessingML fragment: {}", name, e);
                None
            }
        }
    }

    /// Expands the first inline section of the paragraph, recursing into what follows
    fn render_inline(&mut self, paragraph: Paragraph, scope: &Scope<'_>) -> Paragraph {
        let tags = paragraph_tags(&paragraph);
        let pairing = pair_tags(&tags);
        let Some(&(open, close)) = pairing.pairs.first() else {
            return self.render_simple(paragraph, &tags, scope);
        };
        let open_tag = &tags[open];
        let close_tag = &tags[close];

        let formatting = paragraph.formatting.clone();
        let (left, rest) = split_inlines(paragraph.content, open_tag.start);
        let (_, rest) = split_inlines(rest, open_tag.end - open_tag.start);
        let (body, rest) = split_inlines(rest, close_tag.start - open_tag.end);
        let (_, right) = split_inlines(rest, close_tag.end - close_tag.start);

        let left = Paragraph {
            formatting: formatting.clone(),
            content: left,
        };
        let left_tags = paragraph_tags(&left);
        let mut content = self.render_simple(left, &left_tags, scope).content;

        let inverted = open_tag.kind == TagKind::InvertedOpen;
        for element in section_elements(scope.lookup(&open_tag.name), inverted) {
            let inner = scope.enter(&open_tag.name, element);
            let copy = Paragraph {
                formatting: formatting.clone(),
                content: body.clone(),
            };
            content.extend(self.render_inline(copy, &inner).content);
        }

        let right = Paragraph {
            formatting: formatting.clone(),
            content: right,
        };
        content.extend(self.render_inline(right, scope).content);
        normalize(&mut content);
        Paragraph { formatting, content }
    }

    /// Substitutes variables; section tags left here have no partner
    fn render_simple(&mut self, mut paragraph: Paragraph, tags: &[Tag], scope: &Scope<'_>) -> Paragraph {
        let mut values = Vec::with_capacity(tags.len());
        for tag in tags {
            if tag.kind.is_section() {
                self.unbalanced(tag);
                values.push(None);
            } else {
                values.push(Some(self.resolve_text(&tag.name, scope)));
            }
        }
        // right to left, so earlier offsets stay valid
        for (tag, text) in tags.iter().zip(values).rev() {
            let Some(text) = text else { continue };
            if text.is_empty() {
                delete_range(&mut paragraph, tag.start, tag.end);
                continue;
            }
            let formatting = formatting_at(&paragraph, tag.start).cloned().unwrap_or_default();
            let content = if self.options.linebreaks {
                RunContent::from_text(&text)
            } else {
                vec![RunContent::Text(text)]
            };
            let value = Run { formatting, content };
            let width = value.len();
            // inserted behind the opening brace so it lands in the container holding the tag
            insert_inlines(&mut paragraph, tag.start + 1, vec![Inline::Run(value)]);
            delete_range(&mut paragraph, tag.start + 1 + width, tag.end + width);
            delete_range(&mut paragraph, tag.start, tag.start + 1);
        }
        paragraph
    }
}
