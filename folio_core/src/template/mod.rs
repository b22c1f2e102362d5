//! # Template Substitution
//!
//! Mustache-style tags over the logical text of paragraphs:
//!
//! | Tag | Meaning |
//! | --- | --- |
//! | `{name}` | variable, inserted as text |
//! | `{#name}` ... `{/name}` | section: repeated per array element, kept once for other truthy values |
//! | `{^name}` ... `{/name}` | inverted section: kept when the value is falsy or absent |
//! | `{@name}` | raw WordprocessingML fragment when alone in its paragraph |
//!
//! Section markers in different paragraphs of one block list repeat the paragraph
//! range between them; markers in one paragraph repeat the inline content between
//! them; markers in different cells of one table row repeat the row.
//!
//! # Example
//!
//! ```
//! use folio_core::model::{Block, Document, Paragraph};
//! use folio_core::template::substitute;
//! use serde_json::json;
//!
//! let (doc, _) = Document::empty().edit(|pkg| {
//!     pkg.body = vec![Block::paragraph(Paragraph::with_text("Dear {name},"))];
//! });
//! let result = substitute(&doc, &json!({"name": "Ada"}));
//! assert_eq!(result.document.text(), "Dear Ada,\n");
//! assert!(result.warnings.is_empty());
//! ```

mod render;
mod scope;
mod tags;

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use scope::{is_truthy, Scope};
pub use tags::{pair_tags, scan_tags, Pairing, Tag, TagKind};

use crate::config::TemplateOptions;
use crate::model::{visit_paragraphs, Block, Document, Notes, Paragraph, MAIN_PART};
use crate::ooxml::types::{ENDNOTES_PART, FOOTNOTES_PART};
use crate::text_index::TextIndex;
use crate::warning::Warning;
use render::Renderer;

/// Result of [`substitute`]
#[derive(Debug, Clone)]
pub struct Substituted {
    pub document: Document,
    pub warnings: Vec<Warning>,
}

/// Substitutes `variables` into every story of the document with default options
pub fn substitute(document: &Document, variables: &Value) -> Substituted {
    substitute_with(document, variables, &TemplateOptions::default())
}

/// Substitutes `variables` into the body, headers, footers and notes
///
/// Never fails: unknown names render empty with [`Warning::UnresolvedVariable`], and
/// section tags without a partner stay as text with [`Warning::UnbalancedTag`].
pub fn substitute_with(document: &Document, variables: &Value, options: &TemplateOptions) -> Substituted {
    let package = document.package();
    let scope = Scope::new(variables);
    let mut renderer = Renderer::new(package, options);

    let mut body = renderer.render_story(MAIN_PART, &package.body, &scope);
    if body.is_empty() {
        body.push(Block::paragraph(Paragraph::new()));
    }
    let mut render_stories = |stories: &BTreeMap<String, crate::model::HeaderFooter>| {
        stories
            .iter()
            .map(|(part, story)| {
                let mut story = story.clone();
                story.content = renderer.render_story(part, &story.content, &scope);
                (part.clone(), story)
            })
            .collect::<BTreeMap<_, _>>()
    };
    let headers = render_stories(&package.headers);
    let footers = render_stories(&package.footers);
    let mut render_notes = |notes: &Option<Notes>, part: &str| {
        notes.as_ref().map(|notes| {
            let mut notes = notes.clone();
            for note in notes.entries.values_mut() {
                note.content = renderer.render_story(part, &note.content, &scope);
            }
            notes
        })
    };
    let footnotes = render_notes(&package.footnotes, FOOTNOTES_PART);
    let endnotes = render_notes(&package.endnotes, ENDNOTES_PART);
    let warnings = renderer.finish();

    let (document, _) = document.edit(|pkg| {
        pkg.body = body;
        pkg.headers = headers;
        pkg.footers = footers;
        pkg.footnotes = footnotes;
        pkg.endnotes = endnotes;
    });
    info!("Template substituted with {} warning(s)", warnings.len());
    Substituted { document, warnings }
}

// ============================================================================
// Schema inspection
// ============================================================================

/// A section found by [`analyze`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSchema {
    pub name: String,
    pub inverted: bool,
    /// Variables used inside, relative to the section element
    pub variables: Vec<String>,
    pub sections: Vec<SectionSchema>,
}

/// Variables and sections a template uses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSchema {
    pub variables: Vec<String>,
    pub sections: Vec<SectionSchema>,
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

fn attach(sections: &mut Vec<SectionSchema>, section: SectionSchema) {
    match sections
        .iter_mut()
        .find(|s| s.name == section.name && s.inverted == section.inverted)
    {
        Some(existing) => {
            for name in &section.variables {
                push_unique(&mut existing.variables, name);
            }
            for child in section.sections {
                attach(&mut existing.sections, child);
            }
        }
        None => sections.push(section),
    }
}

/// Builds the schema of a tag sequence
///
/// The live editor runs the same routine over its own text fragments, through
/// [`TextIndex::from_fragments`] and [`scan_tags`].
pub fn schema_of(tags: &[Tag]) -> TemplateSchema {
    let mut schema = TemplateSchema::default();
    let mut open: Vec<SectionSchema> = Vec::new();

    fn close(open: &mut Vec<SectionSchema>, schema: &mut TemplateSchema) {
        if let Some(section) = open.pop() {
            match open.last_mut() {
                Some(parent) => attach(&mut parent.sections, section),
                None => attach(&mut schema.sections, section),
            }
        }
    }

    for tag in tags {
        match tag.kind {
            TagKind::SectionOpen | TagKind::InvertedOpen => open.push(SectionSchema {
                name: tag.name.clone(),
                inverted: tag.kind == TagKind::InvertedOpen,
                ..Default::default()
            }),
            TagKind::SectionClose => {
                if let Some(depth) = open.iter().rposition(|s| s.name == tag.name) {
                    while open.len() > depth {
                        close(&mut open, &mut schema);
                    }
                }
            }
            TagKind::Variable | TagKind::Raw => match open.last_mut() {
                Some(section) => {
                    let prefix = format!("{}.", section.name);
                    let name = tag.name.strip_prefix(&prefix).unwrap_or(&tag.name);
                    push_unique(&mut section.variables, name);
                }
                None => push_unique(&mut schema.variables, &tag.name),
            },
        }
    }
    while !open.is_empty() {
        close(&mut open, &mut schema);
    }
    schema
}

/// Lists the variables and sections used anywhere in the document
pub fn analyze(document: &Document) -> TemplateSchema {
    let package = document.package();
    let mut tags = Vec::new();
    let mut collect = |blocks: &[Block]| {
        visit_paragraphs(blocks, &mut |p| tags.extend(scan_tags(&TextIndex::new(p))));
    };
    collect(&package.body);
    for story in package.headers.values().chain(package.footers.values()) {
        collect(&story.content);
    }
    schema_of(&tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Hyperlink, Inline, LinkTarget, Run, Table, TableCell, TableRow, TextFormatting};
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

    #[test]
    fn test_variables_split_across_runs() {
        let bold = TextFormatting {
            bold: Some(true),
            ..Default::default()
        };
        let (doc, _) = Document::empty().edit(|pkg| {
            pkg.body = vec![Block::paragraph(Paragraph {
                content: vec![
                    Inline::Run(Run::text("Hello {fir")),
                    Inline::Run(Run::text("st} and {last}").with_formatting(bold.clone())),
                ],
                ..Default::default()
            })];
        });
        let result = substitute(&doc, &json!({"first": "Ada", "last": "Lovelace"}));
        let p = result.document.paragraph(0).unwrap();
        assert_eq!(p.text(), "Hello Ada and Lovelace");
        // the value takes the formatting of the run holding the opening brace
        let runs: Vec<&Run> = p.runs().collect();
        assert_eq!(runs[0].formatting, TextFormatting::default());
        assert_eq!(crate::editing::formatting_at(p, 14), Some(&bold));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_unresolved_variable_warns_once() {
        let result = substitute(&doc(&["{x} and {x}"]), &json!({}));
        assert_eq!(texts(&result.document), vec![" and "]);
        assert_eq!(result.warnings, vec![Warning::UnresolvedVariable { name: "x".to_string() }]);
    }

    #[test]
    fn test_paragraph_loop() {
        let d = doc(&["Order", "{#items}", "{items.name}: {price}", "{/items}", "Total"]);
        let vars = json!({"items": [{"name": "Pen", "price": 1}, {"name": "Cup", "price": 3}]});
        let result = substitute(&d, &vars);
        assert_eq!(texts(&result.document), vec!["Order", "Pen: 1", "Cup: 3", "Total"]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_markers_with_surrounding_text() {
        let d = doc(&["Intro {#show}first", "last{/show} outro"]);
        let on = substitute(&d, &json!({"show": true}));
        assert_eq!(texts(&on.document), vec!["Intro ", "first", "last", " outro"]);
        let off = substitute(&d, &json!({"show": false}));
        assert_eq!(texts(&off.document), vec!["Intro ", " outro"]);
    }

    #[test]
    fn test_conditional_and_inverted() {
        let d = doc(&["{#vip}", "Welcome back", "{/vip}", "{^vip}", "Sign up", "{/vip}"]);
        let vip = substitute(&d, &json!({"vip": {"level": 2}}));
        assert_eq!(texts(&vip.document), vec!["Welcome back"]);
        let guest = substitute(&d, &json!({}));
        assert_eq!(texts(&guest.document), vec!["Sign up"]);
        // an absent section name is not an unresolved variable
        assert!(guest.warnings.is_empty());
    }

    #[test]
    fn test_inline_section() {
        let d = doc(&["Tags: {#tags}[{.}]{/tags}!"]);
        let result = substitute(&d, &json!({"tags": ["a", "b"]}));
        assert_eq!(texts(&result.document), vec!["Tags: [a][b]!"]);
    }

    #[test]
    fn test_nested_sections_use_outer_scope() {
        let d = doc(&["{#groups}", "{name}:{#members} {.}/{groups.name}{/members}", "{/groups}"]);
        let vars = json!({"groups": [{"name": "g1", "members": ["x", "y"]}]});
        let result = substitute(&d, &vars);
        assert_eq!(texts(&result.document), vec!["g1: x/g1 y/g1"]);
    }

    #[test]
    fn test_unbalanced_tags_stay_as_text() {
        let d = doc(&["{#open} text", "{/other}"]);
        let result = substitute(&d, &json!({}));
        assert_eq!(texts(&result.document), vec!["{#open} text", "{/other}"]);
        assert_eq!(
            result.warnings,
            vec![
                Warning::UnbalancedTag { tag: "{#open}".to_string() },
                Warning::UnbalancedTag { tag: "{/other}".to_string() },
            ]
        );
    }

    #[test]
    fn test_table_row_loop() {
        let row = TableRow {
            properties: Default::default(),
            cells: vec![TableCell::with_text("{#rows}{name}"), TableCell::with_text("{qty}{/rows}")],
        };
        let header = TableRow {
            properties: Default::default(),
            cells: vec![TableCell::with_text("Name"), TableCell::with_text("Qty")],
        };
        let mut table = Table::grid_of(0, 2, 4000);
        table.rows = vec![header, row];
        let (d, _) = Document::empty().edit(|pkg| pkg.body = vec![Block::table(table)]);
        let vars = json!({"rows": [{"name": "Pen", "qty": 2}, {"name": "Cup", "qty": 1}]});
        let result = substitute(&d, &vars);
        let table = result.document.body()[0].as_table().unwrap();
        let cells: Vec<Vec<String>> = table
            .rows
            .iter()
            .map(|r| {
                r.cells
                    .iter()
                    .map(|c| c.content[0].as_paragraph().map(Paragraph::text).unwrap_or_default())
                    .collect()
            })
            .collect();
        assert_eq!(cells, vec![vec!["Name", "Qty"], vec!["Pen", "2"], vec!["Cup", "1"]]);
        assert!(table.check_structure().is_empty());
    }

    #[test]
    fn test_raw_fragment_replaces_paragraph() {
        let d = doc(&["before", "{@block}", "after"]);
        let vars = json!({"block": "<w:p><w:r><w:t>one</w:t></w:r></w:p><w:p><w:r><w:t>two</w:t></w:r></w:p>"});
        let result = substitute(&d, &vars);
        assert_eq!(texts(&result.document), vec!["before", "one", "two", "after"]);

        let broken = substitute(&d, &json!({"block": "<w:p>"}));
        assert_eq!(texts(&broken.document), vec!["before", "<w:p>", "after"]);
    }

    #[test]
    fn test_untouched_blocks_are_shared() {
        let d = doc(&["static", "{x}"]);
        let result = substitute(&d, &json!({"x": 1}));
        match (&d.body()[0], &result.document.body()[0]) {
            (Block::Paragraph(a), Block::Paragraph(b)) => assert!(std::sync::Arc::ptr_eq(a, b)),
            _ => panic!("expected paragraphs"),
        }
    }

    #[test]
    fn test_hyperlink_text_substituted() {
        let (d, _) = Document::empty().edit(|pkg| {
            pkg.body = vec![Block::paragraph(Paragraph {
                content: vec![Inline::Hyperlink(Hyperlink {
                    target: LinkTarget::Local,
                    anchor: Some("top".to_string()),
                    tooltip: None,
                    history: None,
                    runs: vec![Run::text("Go to {place}")],
                })],
                ..Default::default()
            })];
        });
        let result = substitute(&d, &json!({"place": "start"}));
        let p = result.document.paragraph(0).unwrap();
        assert_eq!(p.text(), "Go to start");
        assert!(matches!(&p.content[..], [Inline::Hyperlink(_)]));
    }

    #[test]
    fn test_linebreak_option() {
        let d = doc(&["{addr}"]);
        let vars = json!({"addr": "1 Main St\nSpringfield"});
        let result = substitute(&d, &vars);
        assert_eq!(texts(&result.document), vec!["1 Main St\nSpringfield"]);
        let p = result.document.paragraph(0).unwrap();
        assert!(p.runs().any(|r| r.content.iter().any(|c| matches!(c, crate::model::RunContent::Break(_)))));
    }

    #[test]
    fn test_analyze_schema() {
        let d = doc(&[
            "{title}",
            "{#items}",
            "{items.name} {price} {#tags}{.}{/tags}",
            "{/items}",
            "{^items}none{/items}",
            "{title}",
        ]);
        let schema = analyze(&d);
        assert_eq!(schema.variables, vec!["title"]);
        assert_eq!(schema.sections.len(), 2);
        let items = &schema.sections[0];
        assert_eq!(items.name, "items");
        assert!(!items.inverted);
        assert_eq!(items.variables, vec!["name", "price"]);
        assert_eq!(items.sections[0].name, "tags");
        assert_eq!(items.sections[0].variables, vec!["."]);
        assert!(schema.sections[1].inverted);
    }

    #[test]
    fn test_schema_of_live_fragments() {
        let index = TextIndex::from_fragments(["{#ro", "ws}{a}", "{/rows}{b}"]);
        let schema = schema_of(&scan_tags(&index));
        assert_eq!(schema.variables, vec!["b"]);
        assert_eq!(schema.sections[0].variables, vec!["a"]);
    }
}
