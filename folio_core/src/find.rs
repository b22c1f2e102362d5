//! Find and replace over the top-level body paragraphs
//!
//! Matches are reported as [`TextRange`]s in the same character offsets the command
//! executor uses, so a match can be fed straight back as a `ReplaceText` command.

use log::{debug, warn};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::command::{execute, Command, CommandError, Position, TextRange};
use crate::model::{Block, Document};
use crate::text_index::TextIndex;

/// Search options for find and replace operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Text to find
    #[serde(default)]
    pub query: String,
    /// Replacement text; `$1` / `${name}` expand capture groups in regex mode
    #[serde(default)]
    pub replace: String,
    /// Match case (default: false)
    #[serde(default)]
    pub case_sensitive: bool,
    /// Match whole words only (default: false)
    #[serde(default)]
    pub whole_word: bool,
    /// Treat query as regular expression (default: false)
    #[serde(default)]
    pub regex: bool,
    /// Continue from beginning when reaching end (default: true)
    #[serde(default = "default_wrap")]
    pub wrap_around: bool,
    /// Search backward (upward) (default: false)
    #[serde(default)]
    pub search_backward: bool,
}

fn default_wrap() -> bool {
    true
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            query: String::new(),
            replace: String::new(),
            case_sensitive: false,
            whole_word: false,
            regex: false,
            wrap_around: true,
            search_backward: false,
        }
    }
}

impl SearchOptions {
    /// Plain, case-insensitive search for `query`
    pub fn new(query: &str) -> Self {
        SearchOptions {
            query: query.to_string(),
            ..Default::default()
        }
    }
}

/// A single match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindMatch {
    pub range: TextRange,
    /// The actual matched text
    pub matched_text: String,
}

impl FindMatch {
    /// Length of the match in characters
    pub fn length(&self) -> usize {
        self.range.end.offset - self.range.start.offset
    }
}

/// All matches of a search plus the match the user is on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SearchResultSet {
    #[serde(default)]
    pub results: Vec<FindMatch>,
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub current_index: Option<usize>,
}

impl SearchResultSet {
    pub fn from_results(results: Vec<FindMatch>) -> Self {
        let total_count = results.len();
        SearchResultSet {
            results,
            total_count,
            current_index: None,
        }
    }

    pub fn set_current(&mut self, index: Option<usize>) {
        self.current_index = index.filter(|i| *i < self.results.len());
    }

    pub fn current(&self) -> Option<&FindMatch> {
        self.current_index.and_then(|i| self.results.get(i))
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Compiles the query; plain queries are escaped
fn matcher(options: &SearchOptions) -> Result<Regex, regex::Error> {
    let pattern = if options.regex {
        options.query.clone()
    } else {
        regex::escape(&options.query)
    };
    RegexBuilder::new(&pattern)
        .case_insensitive(!options.case_sensitive)
        .build()
}

/// Byte offsets where UAX #29 word segments start or end
fn word_bounds(text: &str) -> Vec<usize> {
    let mut bounds: Vec<usize> = text.split_word_bound_indices().map(|(i, _)| i).collect();
    bounds.push(text.len());
    bounds
}

/// Non-empty matches in one paragraph text, with their replacement text
fn paragraph_matches(
    text: &str,
    re: &Regex,
    options: &SearchOptions,
    replacements: bool,
) -> Vec<(usize, usize, String)> {
    let bounds = options.whole_word.then(|| word_bounds(text));
    let mut found = Vec::new();
    let mut pos = 0;
    while pos <= text.len() {
        let Some(caps) = re.captures_at(text, pos) else {
            break;
        };
        let Some(m) = caps.get(0) else {
            break;
        };
        let whole = bounds
            .as_ref()
            .map_or(true, |b| b.binary_search(&m.start()).is_ok() && b.binary_search(&m.end()).is_ok());
        if m.is_empty() || !whole {
            // retry one character further on
            pos = m.start() + text[m.start()..].chars().next().map_or(1, char::len_utf8);
            continue;
        }
        let replacement = if !replacements {
            String::new()
        } else if options.regex {
            let mut out = String::new();
            caps.expand(&options.replace, &mut out);
            out
        } else {
            options.replace.clone()
        };
        found.push((m.start(), m.end(), replacement));
        pos = m.end();
    }
    found
}

fn collect(
    document: &Document,
    options: &SearchOptions,
    replacements: bool,
) -> Result<Vec<(FindMatch, String)>, regex::Error> {
    if options.query.is_empty() {
        return Ok(Vec::new());
    }
    let re = matcher(options)?;
    let mut out = Vec::new();
    for (ordinal, paragraph) in document.body().iter().filter_map(Block::as_paragraph).enumerate() {
        let index = TextIndex::new(paragraph);
        for (start, end, replacement) in paragraph_matches(index.text(), &re, options, replacements) {
            let found = FindMatch {
                range: TextRange::within(ordinal, index.char_offset(start), index.char_offset(end)),
                matched_text: index.text()[start..end].to_string(),
            };
            out.push((found, replacement));
        }
    }
    Ok(out)
}

/// Every match in document order; an invalid regex finds nothing
pub fn find_all(document: &Document, options: &SearchOptions) -> Vec<FindMatch> {
    match collect(document, options, false) {
        Ok(found) => found.into_iter().map(|(m, _)| m).collect(),
        Err(e) => {
            warn!("Invalid search pattern {:?}: {}", options.query, e);
            Vec::new()
        }
    }
}

/// Next match from `from`, honouring `search_backward` and `wrap_around`
pub fn find_next(document: &Document, options: &SearchOptions, from: Position) -> Option<FindMatch> {
    let all = find_all(document, options);
    let found = if options.search_backward {
        all.iter().rev().find(|m| m.range.start < from)
    } else {
        all.iter().find(|m| m.range.start >= from)
    };
    match found {
        Some(m) => Some(m.clone()),
        None if options.wrap_around => {
            if options.search_backward {
                all.last().cloned()
            } else {
                all.first().cloned()
            }
        }
        None => None,
    }
}

/// The `Batch` of `ReplaceText` commands that replaces every match
///
/// Commands run from the last match to the first so that earlier ranges stay valid.
pub fn replace_command(document: &Document, options: &SearchOptions) -> Result<Command, CommandError> {
    let mut found = collect(document, options, true)
        .map_err(|e| CommandError::InvalidArgument(format!("invalid search pattern: {}", e)))?;
    found.sort_by(|(a, _), (b, _)| b.range.start.cmp(&a.range.start));
    let commands = found
        .into_iter()
        .map(|(m, text)| Command::ReplaceText { range: m.range, text })
        .collect();
    Ok(Command::Batch { commands })
}

/// Replaces every match; returns the new document and the number of replacements
pub fn replace_all(document: &Document, options: &SearchOptions) -> Result<(Document, usize), CommandError> {
    let command = replace_command(document, options)?;
    let count = match &command {
        Command::Batch { commands } => commands.len(),
        _ => 1,
    };
    debug!("Replacing {} match(es) of {:?}", count, options.query);
    Ok((execute(document, &command)?, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Paragraph;

    fn doc(paragraphs: &[&str]) -> Document {
        let (doc, _) = Document::empty().edit(|pkg| {
            pkg.body = paragraphs
                .iter()
                .map(|text| Block::paragraph(Paragraph::with_text(text)))
                .collect();
        });
        doc
    }

    fn starts(matches: &[FindMatch]) -> Vec<(usize, usize)> {
        matches
            .iter()
            .map(|m| (m.range.start.paragraph, m.range.start.offset))
            .collect()
    }

    #[test]
    fn test_search_options_default() {
        let options = SearchOptions::default();
        assert_eq!(options.query, "");
        assert_eq!(options.replace, "");
        assert!(!options.case_sensitive);
        assert!(!options.whole_word);
        assert!(!options.regex);
        assert!(options.wrap_around);
        assert!(!options.search_backward);
    }

    #[test]
    fn test_search_options_from_json_defaults() {
        let options: SearchOptions = serde_json::from_str(r#"{"query": "x"}"#).unwrap();
        assert_eq!(options, SearchOptions::new("x"));
    }

    #[test]
    fn test_find_all_across_paragraphs() {
        let d = doc(&["hello world hello", "nothing", "Hello again"]);
        let matches = find_all(&d, &SearchOptions::new("hello"));
        assert_eq!(starts(&matches), vec![(0, 0), (0, 12), (2, 0)]);
        assert_eq!(matches[2].matched_text, "Hello");
        assert_eq!(matches[0].length(), 5);
    }

    #[test]
    fn test_case_sensitive() {
        let d = doc(&["Hello hello HELLO"]);
        let options = SearchOptions {
            case_sensitive: true,
            ..SearchOptions::new("hello")
        };
        assert_eq!(starts(&find_all(&d, &options)), vec![(0, 6)]);
    }

    #[test]
    fn test_whole_word() {
        let d = doc(&["hello shell ell ell."]);
        let options = SearchOptions {
            whole_word: true,
            ..SearchOptions::new("ell")
        };
        assert_eq!(starts(&find_all(&d, &options)), vec![(0, 12), (0, 16)]);
    }

    #[test]
    fn test_regex_and_special_characters() {
        let d = doc(&["hello123 world456 (a+b)"]);
        let digits = SearchOptions {
            regex: true,
            ..SearchOptions::new(r"\d+")
        };
        let matches = find_all(&d, &digits);
        assert_eq!(matches[0].matched_text, "123");
        assert_eq!(matches.len(), 2);

        // plain queries are literal
        assert_eq!(starts(&find_all(&d, &SearchOptions::new("(a+b)"))), vec![(0, 18)]);

        let invalid = SearchOptions {
            regex: true,
            ..SearchOptions::new("(")
        };
        assert!(find_all(&d, &invalid).is_empty());
    }

    #[test]
    fn test_offsets_are_characters() {
        let d = doc(&["naïve café"]);
        let matches = find_all(&d, &SearchOptions::new("café"));
        assert_eq!(matches[0].range, TextRange::within(0, 6, 10));
    }

    #[test]
    fn test_find_next_wraps() {
        let d = doc(&["hello world", "say hello"]);
        let options = SearchOptions::new("hello");
        let next = find_next(&d, &options, Position::new(0, 1)).unwrap();
        assert_eq!(next.range.start, Position::new(1, 4));
        let wrapped = find_next(&d, &options, Position::new(1, 5)).unwrap();
        assert_eq!(wrapped.range.start, Position::new(0, 0));

        let no_wrap = SearchOptions {
            wrap_around: false,
            ..options.clone()
        };
        assert!(find_next(&d, &no_wrap, Position::new(1, 5)).is_none());

        let backward = SearchOptions {
            search_backward: true,
            ..options
        };
        let prev = find_next(&d, &backward, Position::new(1, 4)).unwrap();
        assert_eq!(prev.range.start, Position::new(0, 0));
    }

    #[test]
    fn test_replace_all_orders_from_the_end() {
        let d = doc(&["first", "second", "abcdefoo bar cat dog foo xyz"]);
        let options = SearchOptions {
            replace: "longer".to_string(),
            ..SearchOptions::new("foo")
        };
        let Command::Batch { commands } = replace_command(&d, &options).unwrap() else {
            panic!("expected a batch");
        };
        let ranges: Vec<TextRange> = commands
            .iter()
            .map(|c| match c {
                Command::ReplaceText { range, .. } => *range,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(ranges, vec![TextRange::within(2, 21, 24), TextRange::within(2, 5, 8)]);

        let (out, count) = replace_all(&d, &options).unwrap();
        assert_eq!(count, 2);
        assert_eq!(out.paragraph(2).unwrap().text(), "abcdelonger bar cat dog longer xyz");
    }

    #[test]
    fn test_regex_replacement_expands_groups() {
        let d = doc(&["2024-01-31"]);
        let options = SearchOptions {
            regex: true,
            replace: "$3/$2/$1".to_string(),
            ..SearchOptions::new(r"(\d+)-(\d+)-(\d+)")
        };
        let (out, _) = replace_all(&d, &options).unwrap();
        assert_eq!(out.paragraph(0).unwrap().text(), "31/01/2024");
    }

    #[test]
    fn test_result_set() {
        let d = doc(&["a a a"]);
        let mut set = SearchResultSet::from_results(find_all(&d, &SearchOptions::new("a")));
        assert_eq!(set.total_count, 3);
        set.set_current(Some(1));
        assert_eq!(set.current().map(|m| m.range.start.offset), Some(2));
        set.set_current(Some(7));
        assert!(set.current().is_none());
    }
}
