//! Style definitions (`word/styles.xml`)

use serde::{Deserialize, Serialize};

use super::content::TableProperties;
use super::formatting::{
    ColorRef, LineRule, ParagraphFormatting, RunFonts, Spacing, TextFormatting, ThemeColor, ThemeFont, Underline,
};
use crate::ooxml::xml::XmlElement;

/// Type of a style (`w:style/@w:type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StyleType {
    Paragraph,
    Character,
    Table,
    Numbering,
}

impl StyleType {
    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "paragraph" => Some(StyleType::Paragraph),
            "character" => Some(StyleType::Character),
            "table" => Some(StyleType::Table),
            "numbering" => Some(StyleType::Numbering),
            _ => None,
        }
    }

    pub fn as_attr(&self) -> &'static str {
        match self {
            StyleType::Paragraph => "paragraph",
            StyleType::Character => "character",
            StyleType::Table => "table",
            StyleType::Numbering => "numbering",
        }
    }
}

/// A named style (`w:style`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub style_id: String,
    pub style_type: StyleType,
    /// Display name (`w:name`)
    pub name: Option<String>,
    pub based_on: Option<String>,
    pub next: Option<String>,
    /// Linked paragraph/character style
    pub link: Option<String>,
    /// Default style of its type (`w:default="1"`)
    pub is_default: bool,
    pub custom: bool,
    pub ui_priority: Option<u32>,
    pub quick_format: bool,
    pub semi_hidden: bool,
    pub unhide_when_used: bool,
    pub paragraph: Option<ParagraphFormatting>,
    pub run: Option<TextFormatting>,
    pub table: Option<TableProperties>,
    /// Style children without a typed field, kept verbatim
    pub extras: Vec<XmlElement>,
}

impl Style {
    pub fn new(style_id: &str, style_type: StyleType) -> Self {
        Style {
            style_id: style_id.to_string(),
            style_type,
            name: None,
            based_on: None,
            next: None,
            link: None,
            is_default: false,
            custom: false,
            ui_priority: None,
            quick_format: false,
            semi_hidden: false,
            unhide_when_used: false,
            paragraph: None,
            run: None,
            table: None,
            extras: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn based_on(mut self, parent: &str) -> Self {
        self.based_on = Some(parent.to_string());
        self
    }
}

/// Document-wide default formatting (`w:docDefaults`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocDefaults {
    pub run: TextFormatting,
    pub paragraph: ParagraphFormatting,
}

/// Contents of the styles part
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleSheet {
    /// Root element attributes (namespace declarations)
    pub attributes: Vec<(String, String)>,
    pub defaults: DocDefaults,
    /// `w:latentStyles`, kept verbatim
    pub latent_styles: Option<XmlElement>,
    /// Styles in document order
    pub styles: Vec<Style>,
}

impl StyleSheet {
    /// Looks a style up by id
    pub fn get(&self, style_id: &str) -> Option<&Style> {
        self.styles.iter().find(|s| s.style_id == style_id)
    }

    pub fn contains(&self, style_id: &str) -> bool {
        self.get(style_id).is_some()
    }

    /// Default style of the given type
    pub fn default_style(&self, style_type: StyleType) -> Option<&Style> {
        self.styles
            .iter()
            .find(|s| s.style_type == style_type && s.is_default)
    }

    /// Adds a style or replaces the one with the same id
    pub fn upsert(&mut self, style: Style) {
        match self.styles.iter_mut().find(|s| s.style_id == style.style_id) {
            Some(slot) => *slot = style,
            None => self.styles.push(style),
        }
    }

    /// Built-in style sheet used for new documents and when the styles part is absent
    pub fn builtin() -> Self {
        let theme_fonts = RunFonts {
            ascii_theme: Some(ThemeFont::MinorHAnsi),
            h_ansi_theme: Some(ThemeFont::MinorHAnsi),
            east_asia_theme: Some(ThemeFont::MinorEastAsia),
            cs_theme: Some(ThemeFont::MinorBidi),
            ..Default::default()
        };
        let defaults = DocDefaults {
            run: TextFormatting {
                fonts: Some(theme_fonts),
                size: Some(22),
                ..Default::default()
            },
            paragraph: ParagraphFormatting {
                spacing: Some(Spacing {
                    after: Some(160),
                    line: Some(259),
                    line_rule: Some(LineRule::Auto),
                    ..Default::default()
                }),
                ..Default::default()
            },
        };

        let mut normal = Style::new("Normal", StyleType::Paragraph).named("Normal");
        normal.is_default = true;
        normal.quick_format = true;

        let mut default_font = Style::new("DefaultParagraphFont", StyleType::Character)
            .named("Default Paragraph Font");
        default_font.is_default = true;
        default_font.ui_priority = Some(1);
        default_font.semi_hidden = true;
        default_font.unhide_when_used = true;

        let heading = |level: u8, size: u32| {
            let mut style = Style::new(&format!("Heading{}", level), StyleType::Paragraph)
                .named(&format!("heading {}", level))
                .based_on("Normal");
            style.next = Some("Normal".to_string());
            style.ui_priority = Some(9);
            style.quick_format = true;
            style.paragraph = Some(ParagraphFormatting {
                keep_next: Some(true),
                keep_lines: Some(true),
                spacing: Some(Spacing {
                    before: Some(if level == 1 { 240 } else { 40 }),
                    after: Some(0),
                    ..Default::default()
                }),
                outline_level: Some(level - 1),
                ..Default::default()
            });
            style.run = Some(TextFormatting {
                fonts: Some(RunFonts {
                    ascii_theme: Some(ThemeFont::MajorHAnsi),
                    h_ansi_theme: Some(ThemeFont::MajorHAnsi),
                    east_asia_theme: Some(ThemeFont::MajorEastAsia),
                    cs_theme: Some(ThemeFont::MajorBidi),
                    ..Default::default()
                }),
                color: Some(ColorRef::Theme {
                    slot: ThemeColor::Accent1,
                    tint: None,
                    shade: Some("BF".to_string()),
                    fallback: Some("2F5496".to_string()),
                }),
                size: Some(size),
                ..Default::default()
            });
            style
        };

        let mut hyperlink = Style::new("Hyperlink", StyleType::Character)
            .named("Hyperlink")
            .based_on("DefaultParagraphFont");
        hyperlink.ui_priority = Some(99);
        hyperlink.unhide_when_used = true;
        hyperlink.run = Some(TextFormatting {
            color: Some(ColorRef::Theme {
                slot: ThemeColor::Hyperlink,
                tint: None,
                shade: None,
                fallback: Some("0563C1".to_string()),
            }),
            underline: Some(Underline::Single),
            ..Default::default()
        });

        let mut table_normal = Style::new("TableNormal", StyleType::Table).named("Normal Table");
        table_normal.is_default = true;
        table_normal.ui_priority = Some(99);
        table_normal.semi_hidden = true;
        table_normal.unhide_when_used = true;

        let mut table_grid = Style::new("TableGrid", StyleType::Table)
            .named("Table Grid")
            .based_on("TableNormal");
        table_grid.ui_priority = Some(39);
        table_grid.paragraph = Some(ParagraphFormatting {
            spacing: Some(Spacing {
                after: Some(0),
                line: Some(240),
                line_rule: Some(LineRule::Auto),
                ..Default::default()
            }),
            ..Default::default()
        });
        table_grid.table = Some(TableProperties {
            extras: vec![table_grid_borders()],
            ..Default::default()
        });

        StyleSheet {
            attributes: Vec::new(),
            defaults,
            latent_styles: None,
            styles: vec![
                normal,
                default_font,
                heading(1, 32),
                heading(2, 26),
                heading(3, 24),
                hyperlink,
                table_normal,
                table_grid,
            ],
        }
    }
}

/// Single-line borders on every edge (`w:tblBorders`)
fn table_grid_borders() -> XmlElement {
    let mut borders = XmlElement::new("w:tblBorders");
    for edge in ["top", "left", "bottom", "right", "insideH", "insideV"] {
        borders = borders.with_child(
            XmlElement::new(format!("w:{}", edge))
                .with_attr("w:val", "single")
                .with_attr("w:sz", "4")
                .with_attr("w:space", "0")
                .with_attr("w:color", "auto"),
        );
    }
    borders
}
