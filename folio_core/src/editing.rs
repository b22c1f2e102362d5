//! Offset-addressed edits on paragraph content
//!
//! Every operation first cuts the inline list at the requested character offsets,
//! so an edit only ever touches whole inlines. Containers (hyperlinks, simple
//! fields) straddling a cut are split into two containers with the same
//! attributes; [`normalize`] joins them again afterwards.
//!
//! Zero-length items (field characters, instruction text, opaque run content,
//! bookmarks) never count as "inside" a range: at a cut they stay on the left, and
//! a delete keeps them.

use crate::model::{Hyperlink, Inline, Paragraph, Run, RunContent, SimpleField, TextFormatting};

// ============================================================================
// Cutting
// ============================================================================

/// Splits a sequence of items with logical lengths at a character offset
///
/// Items ending at or before `at` go left, including zero-length items sitting
/// exactly at `at`; the item straddling `at` is split with `split`.
fn split_seq<T>(
    items: Vec<T>,
    at: usize,
    len: impl Fn(&T) -> usize,
    split: impl Fn(T, usize) -> (T, Option<T>),
) -> (Vec<T>, Vec<T>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut pos = 0;
    for item in items {
        if !right.is_empty() {
            right.push(item);
            continue;
        }
        let n = len(&item);
        if pos + n <= at {
            left.push(item);
            pos += n;
        } else if pos >= at {
            right.push(item);
        } else {
            let (head, tail) = split(item, at - pos);
            left.push(head);
            right.extend(tail);
        }
    }
    (left, right)
}

fn split_item(item: RunContent, at: usize) -> (RunContent, Option<RunContent>) {
    match item {
        RunContent::Text(text) => {
            let byte = text.char_indices().nth(at).map(|(b, _)| b).unwrap_or(text.len());
            let (head, tail) = text.split_at(byte);
            (RunContent::Text(head.to_string()), Some(RunContent::Text(tail.to_string())))
        }
        // every other item is at most one character long
        other => (other, None),
    }
}

/// Splits a run into two runs with the same formatting
pub fn split_run(run: Run, at: usize) -> (Run, Run) {
    let (head, tail) = split_seq(run.content, at, RunContent::len, split_item);
    (
        Run {
            formatting: run.formatting.clone(),
            content: head,
        },
        Run {
            formatting: run.formatting,
            content: tail,
        },
    )
}

fn split_runs(runs: Vec<Run>, at: usize) -> (Vec<Run>, Vec<Run>) {
    split_seq(runs, at, Run::len, |run, at| {
        let (head, tail) = split_run(run, at);
        (head, Some(tail))
    })
}

fn inline_len(inline: &Inline) -> usize {
    inline.runs().iter().map(Run::len).sum()
}

fn split_inline(inline: Inline, at: usize) -> (Inline, Option<Inline>) {
    match inline {
        Inline::Run(run) => {
            let (head, tail) = split_run(run, at);
            (Inline::Run(head), Some(Inline::Run(tail)))
        }
        Inline::Hyperlink(link) => {
            let (head, tail) = split_runs(link.runs, at);
            let template = Hyperlink {
                target: link.target,
                anchor: link.anchor,
                tooltip: link.tooltip,
                history: link.history,
                runs: Vec::new(),
            };
            let mut right = template.clone();
            right.runs = tail;
            (
                Inline::Hyperlink(Hyperlink { runs: head, ..template }),
                Some(Inline::Hyperlink(right)),
            )
        }
        Inline::SimpleField(field) => {
            let (head, tail) = split_runs(field.runs, at);
            (
                Inline::SimpleField(SimpleField {
                    instruction: field.instruction.clone(),
                    runs: head,
                }),
                Some(Inline::SimpleField(SimpleField {
                    instruction: field.instruction,
                    runs: tail,
                })),
            )
        }
        other => (other, None),
    }
}

/// Cuts an inline list at a character offset of its logical text
pub fn split_inlines(content: Vec<Inline>, at: usize) -> (Vec<Inline>, Vec<Inline>) {
    split_seq(content, at, inline_len, split_inline)
}

/// Offset of the start of every inline, plus the total length
fn inline_offsets(content: &[Inline]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(content.len() + 1);
    let mut pos = 0;
    for inline in content {
        offsets.push(pos);
        pos += inline_len(inline);
    }
    offsets.push(pos);
    offsets
}

// ============================================================================
// Normalization
// ============================================================================

fn has_field_chars(run: &Run) -> bool {
    run.content
        .iter()
        .any(|item| matches!(item, RunContent::FieldChar(_) | RunContent::InstrText(_)))
}

fn runs_mergeable(a: &Run, b: &Run) -> bool {
    a.formatting == b.formatting && !has_field_chars(a) && !has_field_chars(b)
}

fn same_link(a: &Hyperlink, b: &Hyperlink) -> bool {
    a.target == b.target && a.anchor == b.anchor && a.tooltip == b.tooltip && a.history == b.history
}

fn normalize_runs(runs: &mut Vec<Run>) {
    let mut merged: Vec<Run> = Vec::with_capacity(runs.len());
    for mut run in runs.drain(..) {
        run.normalize();
        if run.is_empty() {
            continue;
        }
        match merged.last_mut() {
            Some(last) if runs_mergeable(last, &run) => {
                last.content.extend(run.content);
                last.normalize();
            }
            _ => merged.push(run),
        }
    }
    *runs = merged;
}

/// Joins `next` into `last` when both are the same kind with equal attributes
fn absorb(last: &mut Inline, next: Inline) -> Option<Inline> {
    match (last, next) {
        (Inline::Run(a), Inline::Run(b)) if runs_mergeable(a, &b) => {
            a.content.extend(b.content);
            None
        }
        (Inline::Hyperlink(a), Inline::Hyperlink(b)) if same_link(a, &b) => {
            a.runs.extend(b.runs);
            None
        }
        (Inline::SimpleField(a), Inline::SimpleField(b)) if a.instruction == b.instruction => {
            a.runs.extend(b.runs);
            None
        }
        (_, next) => Some(next),
    }
}

/// Merges adjacent runs and containers with equal formatting and drops empty runs
pub fn normalize(content: &mut Vec<Inline>) {
    let mut merged: Vec<Inline> = Vec::with_capacity(content.len());
    for inline in content.drain(..) {
        if let Inline::Run(run) = &inline {
            if run.is_empty() {
                continue;
            }
        }
        let rest = match merged.last_mut() {
            Some(last) => absorb(last, inline),
            None => Some(inline),
        };
        merged.extend(rest);
    }
    for inline in &mut merged {
        match inline {
            Inline::Run(run) => run.normalize(),
            Inline::Hyperlink(link) => normalize_runs(&mut link.runs),
            Inline::SimpleField(field) => normalize_runs(&mut field.runs),
            _ => {}
        }
    }
    *content = merged;
}

// ============================================================================
// Range operations
// ============================================================================

/// Cuts `[start, end)` out of the paragraph, replaces it with `f(middle)` and normalizes
pub fn splice_range(paragraph: &mut Paragraph, start: usize, end: usize, f: impl FnOnce(Vec<Inline>) -> Vec<Inline>) {
    let content = std::mem::take(&mut paragraph.content);
    let (mut left, rest) = split_inlines(content, start);
    let (middle, right) = split_inlines(rest, end.saturating_sub(start));
    left.extend(f(middle));
    left.extend(right);
    normalize(&mut left);
    paragraph.content = left;
}

/// Copy of the inlines covering `[start, end)`
pub fn extract_range(paragraph: &Paragraph, start: usize, end: usize) -> Vec<Inline> {
    let (_, rest) = split_inlines(paragraph.content.clone(), start);
    let (middle, _) = split_inlines(rest, end.saturating_sub(start));
    middle
}

/// Removes every item with a logical length from `[start, end)`
///
/// Runs and containers left without content are dropped; zero-length inlines
/// such as bookmarks survive.
pub fn delete_range(paragraph: &mut Paragraph, start: usize, end: usize) {
    if start >= end {
        return;
    }
    splice_range(paragraph, start, end, |middle| {
        middle.into_iter().filter_map(strip_inline).collect()
    });
}

fn strip_run(mut run: Run) -> Option<Run> {
    run.content.retain(|item| item.len() == 0);
    (!run.content.is_empty()).then_some(run)
}

fn strip_inline(inline: Inline) -> Option<Inline> {
    match inline {
        Inline::Run(run) => strip_run(run).map(Inline::Run),
        Inline::Hyperlink(mut link) => {
            link.runs = link.runs.into_iter().filter_map(strip_run).collect();
            (!link.runs.is_empty()).then_some(Inline::Hyperlink(link))
        }
        Inline::SimpleField(mut field) => {
            field.runs = field.runs.into_iter().filter_map(strip_run).collect();
            (!field.runs.is_empty()).then_some(Inline::SimpleField(field))
        }
        other => Some(other),
    }
}

/// Applies `f` to the formatting of every run in `[start, end)`
pub fn format_range(
    paragraph: &mut Paragraph,
    start: usize,
    end: usize,
    mut f: impl FnMut(&mut TextFormatting),
) {
    if start >= end {
        return;
    }
    splice_range(paragraph, start, end, |mut middle| {
        for inline in &mut middle {
            for run in inline.runs_mut() {
                f(&mut run.formatting);
            }
        }
        middle
    });
}

/// Formatting of the run holding the character at `offset`
pub fn formatting_at(paragraph: &Paragraph, offset: usize) -> Option<&TextFormatting> {
    let mut pos = 0;
    for run in paragraph.runs() {
        let len = run.len();
        if pos <= offset && offset < pos + len {
            return Some(&run.formatting);
        }
        pos += len;
    }
    None
}

/// Formatting typed text at `offset` picks up: the run to the left, else the run
/// to the right, else the paragraph mark
fn inherited_formatting(paragraph: &Paragraph, offset: usize) -> TextFormatting {
    let mut pos = 0;
    let mut left = None;
    let mut right = None;
    for run in paragraph.runs() {
        let len = run.len();
        if len == 0 {
            continue;
        }
        if pos < offset {
            left = Some(&run.formatting);
        } else if right.is_none() {
            right = Some(&run.formatting);
        }
        pos += len;
    }
    left.or(right)
        .or(paragraph.formatting.mark_formatting.as_ref())
        .cloned()
        .unwrap_or_default()
}

/// Inserts inlines at a character offset
///
/// An offset strictly inside a hyperlink or field places bare runs inside it.
pub fn insert_inlines(paragraph: &mut Paragraph, offset: usize, inlines: Vec<Inline>) {
    if inlines.is_empty() {
        return;
    }
    let offsets = inline_offsets(&paragraph.content);
    let inside_container = paragraph.content.iter().enumerate().any(|(i, inline)| {
        matches!(inline, Inline::Hyperlink(_) | Inline::SimpleField(_)) && offsets[i] < offset && offset < offsets[i + 1]
    });
    let all_runs = inlines.iter().all(|inline| matches!(inline, Inline::Run(_)));

    let content = std::mem::take(&mut paragraph.content);
    let (mut left, right) = split_inlines(content, offset);
    if inside_container && all_runs {
        let runs = inlines.into_iter().filter_map(|inline| match inline {
            Inline::Run(run) => Some(run),
            _ => None,
        });
        match left.last_mut() {
            Some(Inline::Hyperlink(link)) => link.runs.extend(runs),
            Some(Inline::SimpleField(field)) => field.runs.extend(runs),
            _ => left.extend(runs.map(Inline::Run)),
        }
    } else {
        // directly after the last inline with text, ahead of trailing bookmarks
        let at = left
            .iter()
            .rposition(|inline| inline_len(inline) > 0)
            .map(|i| i + 1)
            .unwrap_or(left.len());
        left.splice(at..at, inlines);
    }
    left.extend(right);
    normalize(&mut left);
    paragraph.content = left;
}

/// Inserts text at a character offset
///
/// Without explicit `formatting` the text takes the formatting of the run to its
/// left. `\n` becomes a line break and `\t` a tab.
pub fn insert_text(paragraph: &mut Paragraph, offset: usize, text: &str, formatting: Option<&TextFormatting>) {
    if text.is_empty() {
        return;
    }
    let formatting = match formatting {
        Some(f) => f.clone(),
        None => inherited_formatting(paragraph, offset),
    };
    let run = Run::text(text).with_formatting(formatting);
    insert_inlines(paragraph, offset, vec![Inline::Run(run)]);
}

/// Replaces `[start, end)` with text formatted like the first replaced character
pub fn replace_range(paragraph: &mut Paragraph, start: usize, end: usize, text: &str) {
    let formatting = if start < end {
        formatting_at(paragraph, start).cloned()
    } else {
        None
    };
    delete_range(paragraph, start, end);
    insert_text(paragraph, start, text, formatting.as_ref());
}

// ============================================================================
// Paragraph operations
// ============================================================================

/// Splits a paragraph in two; both halves keep the paragraph formatting
pub fn split_paragraph(paragraph: &Paragraph, offset: usize) -> (Paragraph, Paragraph) {
    let (mut left, mut right) = split_inlines(paragraph.content.clone(), offset);
    normalize(&mut left);
    normalize(&mut right);
    (
        Paragraph {
            formatting: paragraph.formatting.clone(),
            content: left,
        },
        Paragraph {
            formatting: paragraph.formatting.clone(),
            content: right,
        },
    )
}

/// Appends the content of `next` to `paragraph`, keeping `paragraph`'s formatting
pub fn merge_paragraphs(paragraph: &mut Paragraph, next: &Paragraph) {
    paragraph.content.extend(next.content.iter().cloned());
    normalize(&mut paragraph.content);
}
