//! Logical text of a paragraph and the map from character offsets back to run items
//!
//! Offsets are counted in `char`s of the logical text (see [`Paragraph::text`]).
//! Template scanning, find and command addressing all go through this map so that
//! the three agree on what an offset means.

use crate::model::{Inline, Paragraph};

/// Address of one run item inside a paragraph
///
/// `run` indexes [`Inline::runs`] of the inline, `item` the run's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemPath {
    pub inline: usize,
    pub run: usize,
    pub item: usize,
}

/// A character position resolved to its run item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub path: ItemPath,
    /// Character offset inside the item
    pub offset: usize,
}

/// Logical extent of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSpan {
    pub inline: usize,
    pub run: usize,
    pub start: usize,
    pub end: usize,
}

impl RunSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy)]
struct ItemSpan {
    path: ItemPath,
    start: usize,
    len: usize,
}

/// Position map over the logical text of a paragraph
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    text: String,
    /// Byte offset of every char, followed by `text.len()`
    char_bytes: Vec<usize>,
    /// Items with a non-zero length, in order
    items: Vec<ItemSpan>,
    runs: Vec<RunSpan>,
}

impl TextIndex {
    pub fn new(paragraph: &Paragraph) -> Self {
        Self::from_inlines(&paragraph.content)
    }

    pub fn from_inlines(content: &[Inline]) -> Self {
        let mut index = TextIndex::default();
        let mut offset = 0;
        for (inline_index, inline) in content.iter().enumerate() {
            for (run_index, run) in inline.runs().iter().enumerate() {
                let run_start = offset;
                for (item_index, item) in run.content.iter().enumerate() {
                    let len = item.len();
                    if len == 0 {
                        continue;
                    }
                    item.collect_text(&mut index.text);
                    index.items.push(ItemSpan {
                        path: ItemPath {
                            inline: inline_index,
                            run: run_index,
                            item: item_index,
                        },
                        start: offset,
                        len,
                    });
                    offset += len;
                }
                index.runs.push(RunSpan {
                    inline: inline_index,
                    run: run_index,
                    start: run_start,
                    end: offset,
                });
            }
        }
        index.finish();
        index
    }

    /// Index over plain text fragments; fragment `i` becomes inline `i` with one item
    pub fn from_fragments<'a>(fragments: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = TextIndex::default();
        let mut offset = 0;
        for (i, fragment) in fragments.into_iter().enumerate() {
            let len = fragment.chars().count();
            index.text.push_str(fragment);
            let path = ItemPath {
                inline: i,
                run: 0,
                item: 0,
            };
            if len > 0 {
                index.items.push(ItemSpan {
                    path,
                    start: offset,
                    len,
                });
            }
            index.runs.push(RunSpan {
                inline: i,
                run: 0,
                start: offset,
                end: offset + len,
            });
            offset += len;
        }
        index.finish();
        index
    }

    fn finish(&mut self) {
        self.char_bytes = self.text.char_indices().map(|(b, _)| b).collect();
        self.char_bytes.push(self.text.len());
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.char_bytes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Item holding the character at `offset`
    pub fn locate(&self, offset: usize) -> Option<Location> {
        let position = self.items.partition_point(|item| item.start + item.len <= offset);
        let item = self.items.get(position)?;
        (item.start <= offset).then(|| Location {
            path: item.path,
            offset: offset - item.start,
        })
    }

    /// Every run, including empty ones, in document order
    pub fn runs(&self) -> &[RunSpan] {
        &self.runs
    }

    /// Character offset of a byte offset into [`text`](Self::text)
    pub fn char_offset(&self, byte: usize) -> usize {
        match self.char_bytes.binary_search(&byte) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        }
    }

    /// Byte offset into [`text`](Self::text) of a character offset
    pub fn byte_offset(&self, offset: usize) -> usize {
        self.char_bytes
            .get(offset)
            .copied()
            .unwrap_or(self.text.len())
    }

    /// Text between two character offsets
    pub fn slice(&self, start: usize, end: usize) -> &str {
        let start = self.byte_offset(start);
        let end = self.byte_offset(end).max(start);
        &self.text[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Hyperlink, LinkTarget, Run, RunContent};

    fn paragraph() -> Paragraph {
        let mut first = Run::text("Hé");
        first.content.insert(0, RunContent::FieldChar(crate::model::FieldCharKind::Begin));
        Paragraph {
            content: vec![
                Inline::Run(first),
                Inline::BookmarkStart {
                    id: "0".to_string(),
                    name: "mark".to_string(),
                },
                Inline::Hyperlink(Hyperlink {
                    target: LinkTarget::Local,
                    anchor: Some("mark".to_string()),
                    tooltip: None,
                    history: None,
                    runs: vec![Run::text("l"), Run::text("lo\tx")],
                }),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_text_matches_paragraph() {
        let p = paragraph();
        let index = TextIndex::new(&p);
        assert_eq!(index.text(), p.text());
        assert_eq!(index.text(), "Héllo\tx");
        assert_eq!(index.len(), 7);
        assert_eq!(index.len(), p.len());
    }

    #[test]
    fn test_locate_skips_zero_width_items() {
        let index = TextIndex::new(&paragraph());
        // the field char at item 0 has no width
        assert_eq!(
            index.locate(0),
            Some(Location {
                path: ItemPath { inline: 0, run: 0, item: 1 },
                offset: 0
            })
        );
        assert_eq!(
            index.locate(4),
            Some(Location {
                path: ItemPath { inline: 2, run: 1, item: 0 },
                offset: 1
            })
        );
        // tab item
        assert_eq!(index.locate(5).map(|l| l.path.item), Some(1));
        assert_eq!(index.locate(7), None);
    }

    #[test]
    fn test_run_spans() {
        let index = TextIndex::new(&paragraph());
        let spans: Vec<(usize, usize, usize, usize)> =
            index.runs().iter().map(|r| (r.inline, r.run, r.start, r.end)).collect();
        assert_eq!(spans, vec![(0, 0, 0, 2), (2, 0, 2, 3), (2, 1, 3, 7)]);
    }

    #[test]
    fn test_byte_and_char_offsets() {
        let index = TextIndex::new(&paragraph());
        // 'é' is two bytes
        assert_eq!(index.byte_offset(2), 3);
        assert_eq!(index.char_offset(3), 2);
        assert_eq!(index.slice(1, 3), "él");
        assert_eq!(index.byte_offset(99), index.text().len());
    }

    #[test]
    fn test_from_fragments() {
        let index = TextIndex::from_fragments(["{na", "me}", ""]);
        assert_eq!(index.text(), "{name}");
        assert_eq!(index.locate(3).map(|l| (l.path.inline, l.offset)), Some((1, 0)));
        assert_eq!(index.runs().len(), 3);
    }
}
