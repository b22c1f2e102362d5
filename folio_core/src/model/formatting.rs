//! Run and paragraph formatting records
//!
//! Every field is optional: `None` means "not set at this level" so that
//! records can be layered by the style resolver and merged by edit commands.

use serde::{Deserialize, Serialize};

use crate::ooxml::xml::XmlElement;

// ============================================================================
// Colours and fonts
// ============================================================================

/// Theme colour slot referenced from formatting (`w:themeColor`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThemeColor {
    Dark1,
    Light1,
    Dark2,
    Light2,
    Accent1,
    Accent2,
    Accent3,
    Accent4,
    Accent5,
    Accent6,
    Hyperlink,
    FollowedHyperlink,
    Text1,
    Background1,
    Text2,
    Background2,
}

impl ThemeColor {
    /// Parses the `w:themeColor` attribute value
    pub fn from_attr(value: &str) -> Option<Self> {
        Some(match value {
            "dark1" => ThemeColor::Dark1,
            "light1" => ThemeColor::Light1,
            "dark2" => ThemeColor::Dark2,
            "light2" => ThemeColor::Light2,
            "accent1" => ThemeColor::Accent1,
            "accent2" => ThemeColor::Accent2,
            "accent3" => ThemeColor::Accent3,
            "accent4" => ThemeColor::Accent4,
            "accent5" => ThemeColor::Accent5,
            "accent6" => ThemeColor::Accent6,
            "hyperlink" => ThemeColor::Hyperlink,
            "followedHyperlink" => ThemeColor::FollowedHyperlink,
            "text1" => ThemeColor::Text1,
            "background1" => ThemeColor::Background1,
            "text2" => ThemeColor::Text2,
            "background2" => ThemeColor::Background2,
            _ => return None,
        })
    }

    /// Attribute value written back to `w:themeColor`
    pub fn as_attr(&self) -> &'static str {
        match self {
            ThemeColor::Dark1 => "dark1",
            ThemeColor::Light1 => "light1",
            ThemeColor::Dark2 => "dark2",
            ThemeColor::Light2 => "light2",
            ThemeColor::Accent1 => "accent1",
            ThemeColor::Accent2 => "accent2",
            ThemeColor::Accent3 => "accent3",
            ThemeColor::Accent4 => "accent4",
            ThemeColor::Accent5 => "accent5",
            ThemeColor::Accent6 => "accent6",
            ThemeColor::Hyperlink => "hyperlink",
            ThemeColor::FollowedHyperlink => "followedHyperlink",
            ThemeColor::Text1 => "text1",
            ThemeColor::Background1 => "background1",
            ThemeColor::Text2 => "text2",
            ThemeColor::Background2 => "background2",
        }
    }

    /// Key of the colour scheme entry in the theme part (`dk1`, `accent1`, ...)
    pub fn scheme_key(&self) -> &'static str {
        match self {
            ThemeColor::Dark1 | ThemeColor::Text1 => "dk1",
            ThemeColor::Light1 | ThemeColor::Background1 => "lt1",
            ThemeColor::Dark2 | ThemeColor::Text2 => "dk2",
            ThemeColor::Light2 | ThemeColor::Background2 => "lt2",
            ThemeColor::Accent1 => "accent1",
            ThemeColor::Accent2 => "accent2",
            ThemeColor::Accent3 => "accent3",
            ThemeColor::Accent4 => "accent4",
            ThemeColor::Accent5 => "accent5",
            ThemeColor::Accent6 => "accent6",
            ThemeColor::Hyperlink => "hlink",
            ThemeColor::FollowedHyperlink => "folHlink",
        }
    }
}

/// A colour value: automatic, literal RGB, or a reference into the theme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorRef {
    Auto,
    /// Six hex digits, no leading `#`
    Literal(String),
    Theme {
        slot: ThemeColor,
        /// `w:themeTint`, hex byte
        tint: Option<String>,
        /// `w:themeShade`, hex byte
        shade: Option<String>,
        /// Literal value written alongside the theme reference
        fallback: Option<String>,
    },
}

impl ColorRef {
    /// Literal colour, normalized to upper-case hex without `#`
    pub fn literal(hex: &str) -> Self {
        ColorRef::Literal(hex.trim_start_matches('#').to_ascii_uppercase())
    }
}

/// Theme font reference used by `w:rFonts` (`w:asciiTheme`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThemeFont {
    MajorAscii,
    MajorHAnsi,
    MajorEastAsia,
    MajorBidi,
    MinorAscii,
    MinorHAnsi,
    MinorEastAsia,
    MinorBidi,
}

impl ThemeFont {
    pub fn from_attr(value: &str) -> Option<Self> {
        Some(match value {
            "majorAscii" => ThemeFont::MajorAscii,
            "majorHAnsi" => ThemeFont::MajorHAnsi,
            "majorEastAsia" => ThemeFont::MajorEastAsia,
            "majorBidi" => ThemeFont::MajorBidi,
            "minorAscii" => ThemeFont::MinorAscii,
            "minorHAnsi" => ThemeFont::MinorHAnsi,
            "minorEastAsia" => ThemeFont::MinorEastAsia,
            "minorBidi" => ThemeFont::MinorBidi,
            _ => return None,
        })
    }

    pub fn as_attr(&self) -> &'static str {
        match self {
            ThemeFont::MajorAscii => "majorAscii",
            ThemeFont::MajorHAnsi => "majorHAnsi",
            ThemeFont::MajorEastAsia => "majorEastAsia",
            ThemeFont::MajorBidi => "majorBidi",
            ThemeFont::MinorAscii => "minorAscii",
            ThemeFont::MinorHAnsi => "minorHAnsi",
            ThemeFont::MinorEastAsia => "minorEastAsia",
            ThemeFont::MinorBidi => "minorBidi",
        }
    }

    /// Whether the reference points at the heading (major) font set
    pub fn is_major(&self) -> bool {
        matches!(
            self,
            ThemeFont::MajorAscii | ThemeFont::MajorHAnsi | ThemeFont::MajorEastAsia | ThemeFont::MajorBidi
        )
    }
}

/// Font selection per script (`w:rFonts`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFonts {
    pub ascii: Option<String>,
    pub h_ansi: Option<String>,
    pub east_asia: Option<String>,
    pub cs: Option<String>,
    pub ascii_theme: Option<ThemeFont>,
    pub h_ansi_theme: Option<ThemeFont>,
    pub east_asia_theme: Option<ThemeFont>,
    pub cs_theme: Option<ThemeFont>,
    /// Script used for ambiguous characters (`w:hint`)
    pub hint: Option<String>,
}

impl RunFonts {
    /// Same font for every script
    pub fn uniform(name: &str) -> Self {
        RunFonts {
            ascii: Some(name.to_string()),
            h_ansi: Some(name.to_string()),
            east_asia: Some(name.to_string()),
            cs: Some(name.to_string()),
            ..Default::default()
        }
    }

    /// Overlays the fields set in `other`
    ///
    /// A literal font and a theme font for the same script exclude each other, so
    /// setting one clears the other.
    pub fn merge(&mut self, other: &RunFonts) {
        fn pick(
            literal: &mut Option<String>,
            theme: &mut Option<ThemeFont>,
            new_literal: &Option<String>,
            new_theme: &Option<ThemeFont>,
        ) {
            if new_theme.is_some() {
                *theme = *new_theme;
                *literal = new_literal.clone();
            } else if new_literal.is_some() {
                *literal = new_literal.clone();
                *theme = None;
            }
        }
        pick(&mut self.ascii, &mut self.ascii_theme, &other.ascii, &other.ascii_theme);
        pick(&mut self.h_ansi, &mut self.h_ansi_theme, &other.h_ansi, &other.h_ansi_theme);
        pick(&mut self.east_asia, &mut self.east_asia_theme, &other.east_asia, &other.east_asia_theme);
        pick(&mut self.cs, &mut self.cs_theme, &other.cs, &other.cs_theme);
        if other.hint.is_some() {
            self.hint = other.hint.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == RunFonts::default()
    }
}

// ============================================================================
// Run formatting
// ============================================================================

/// Underline style (`w:u/@w:val`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Underline {
    None,
    Single,
    Double,
    Thick,
    Dotted,
    Dash,
    Wave,
    Words,
    Other(String),
}

impl Underline {
    pub fn from_attr(value: &str) -> Self {
        match value {
            "none" => Underline::None,
            "single" => Underline::Single,
            "double" => Underline::Double,
            "thick" => Underline::Thick,
            "dotted" => Underline::Dotted,
            "dash" => Underline::Dash,
            "wave" => Underline::Wave,
            "words" => Underline::Words,
            other => Underline::Other(other.to_string()),
        }
    }

    pub fn as_attr(&self) -> &str {
        match self {
            Underline::None => "none",
            Underline::Single => "single",
            Underline::Double => "double",
            Underline::Thick => "thick",
            Underline::Dotted => "dotted",
            Underline::Dash => "dash",
            Underline::Wave => "wave",
            Underline::Words => "words",
            Underline::Other(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerticalAlign {
    Baseline,
    Superscript,
    Subscript,
}

impl VerticalAlign {
    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "baseline" => Some(VerticalAlign::Baseline),
            "superscript" => Some(VerticalAlign::Superscript),
            "subscript" => Some(VerticalAlign::Subscript),
            _ => None,
        }
    }

    pub fn as_attr(&self) -> &'static str {
        match self {
            VerticalAlign::Baseline => "baseline",
            VerticalAlign::Superscript => "superscript",
            VerticalAlign::Subscript => "subscript",
        }
    }
}

/// Character formatting (`w:rPr`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextFormatting {
    /// Character style id (`w:rStyle`)
    pub style_id: Option<String>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<Underline>,
    pub strike: Option<bool>,
    pub double_strike: Option<bool>,
    pub caps: Option<bool>,
    pub small_caps: Option<bool>,
    pub hidden: Option<bool>,
    pub vertical_align: Option<VerticalAlign>,
    pub fonts: Option<RunFonts>,
    /// Font size in half-points (`w:sz`)
    pub size: Option<u32>,
    pub color: Option<ColorRef>,
    /// Highlight colour name (`yellow`, `green`, ...)
    pub highlight: Option<String>,
    /// Property children without a typed field, kept verbatim
    pub extras: Vec<XmlElement>,
}

impl TextFormatting {
    pub fn is_empty(&self) -> bool {
        *self == TextFormatting::default()
    }

    /// Overlays every field set in `other`; unset fields keep their value
    pub fn merge(&mut self, other: &TextFormatting) {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        overlay!(
            style_id,
            bold,
            italic,
            underline,
            strike,
            double_strike,
            caps,
            small_caps,
            hidden,
            vertical_align,
            size,
            color,
            highlight
        );
        if let Some(fonts) = &other.fonts {
            self.fonts.get_or_insert_with(RunFonts::default).merge(fonts);
        }
        merge_extras(&mut self.extras, &other.extras);
    }

    /// Returns a copy with `other` overlaid
    pub fn merged(&self, other: &TextFormatting) -> TextFormatting {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}

// ============================================================================
// Paragraph formatting
// ============================================================================

/// Paragraph alignment (`w:jc`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
    Distribute,
    Other(String),
}

impl Alignment {
    pub fn from_attr(value: &str) -> Self {
        match value {
            "left" | "start" => Alignment::Left,
            "center" => Alignment::Center,
            "right" | "end" => Alignment::Right,
            "both" => Alignment::Justify,
            "distribute" => Alignment::Distribute,
            other => Alignment::Other(other.to_string()),
        }
    }

    pub fn as_attr(&self) -> &str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Justify => "both",
            Alignment::Distribute => "distribute",
            Alignment::Other(value) => value,
        }
    }
}

/// Paragraph indentation in twips (`w:ind`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Indentation {
    pub left: Option<i32>,
    pub right: Option<i32>,
    pub first_line: Option<i32>,
    pub hanging: Option<i32>,
}

impl Indentation {
    pub fn merge(&mut self, other: &Indentation) {
        if other.left.is_some() {
            self.left = other.left;
        }
        if other.right.is_some() {
            self.right = other.right;
        }
        // first line and hanging indents exclude each other
        if other.first_line.is_some() {
            self.first_line = other.first_line;
            self.hanging = None;
        }
        if other.hanging.is_some() {
            self.hanging = other.hanging;
            self.first_line = None;
        }
    }
}

/// How `Spacing::line` is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineRule {
    Auto,
    Exact,
    AtLeast,
}

impl LineRule {
    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(LineRule::Auto),
            "exact" => Some(LineRule::Exact),
            "atLeast" => Some(LineRule::AtLeast),
            _ => None,
        }
    }

    pub fn as_attr(&self) -> &'static str {
        match self {
            LineRule::Auto => "auto",
            LineRule::Exact => "exact",
            LineRule::AtLeast => "atLeast",
        }
    }
}

/// Paragraph spacing in twips (`w:spacing`); `line` is in 240ths of a line for `Auto`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spacing {
    pub before: Option<u32>,
    pub after: Option<u32>,
    pub line: Option<u32>,
    pub line_rule: Option<LineRule>,
}

impl Spacing {
    pub fn merge(&mut self, other: &Spacing) {
        if other.before.is_some() {
            self.before = other.before;
        }
        if other.after.is_some() {
            self.after = other.after;
        }
        if other.line.is_some() {
            self.line = other.line;
        }
        if other.line_rule.is_some() {
            self.line_rule = other.line_rule;
        }
    }
}

/// List membership of a paragraph (`w:numPr`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingRef {
    pub num_id: u32,
    pub level: u32,
}

/// Paragraph formatting (`w:pPr`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParagraphFormatting {
    /// Paragraph style id (`w:pStyle`)
    pub style_id: Option<String>,
    pub alignment: Option<Alignment>,
    pub indentation: Option<Indentation>,
    pub spacing: Option<Spacing>,
    pub numbering: Option<NumberingRef>,
    pub keep_next: Option<bool>,
    pub keep_lines: Option<bool>,
    pub page_break_before: Option<bool>,
    /// Outline level, 0-based (`w:outlineLvl`)
    pub outline_level: Option<u8>,
    /// Formatting of the paragraph mark (`w:pPr/w:rPr`)
    pub mark_formatting: Option<TextFormatting>,
    /// Property children without a typed field, kept verbatim
    pub extras: Vec<XmlElement>,
}

impl ParagraphFormatting {
    pub fn is_empty(&self) -> bool {
        *self == ParagraphFormatting::default()
    }

    /// Overlays every field set in `other`; unset fields keep their value
    pub fn merge(&mut self, other: &ParagraphFormatting) {
        if other.style_id.is_some() {
            self.style_id = other.style_id.clone();
        }
        if other.alignment.is_some() {
            self.alignment = other.alignment.clone();
        }
        if let Some(ind) = &other.indentation {
            self.indentation.get_or_insert_with(Indentation::default).merge(ind);
        }
        if let Some(spacing) = &other.spacing {
            self.spacing.get_or_insert_with(Spacing::default).merge(spacing);
        }
        if other.numbering.is_some() {
            self.numbering = other.numbering;
        }
        if other.keep_next.is_some() {
            self.keep_next = other.keep_next;
        }
        if other.keep_lines.is_some() {
            self.keep_lines = other.keep_lines;
        }
        if other.page_break_before.is_some() {
            self.page_break_before = other.page_break_before;
        }
        if other.outline_level.is_some() {
            self.outline_level = other.outline_level;
        }
        if let Some(mark) = &other.mark_formatting {
            self.mark_formatting.get_or_insert_with(TextFormatting::default).merge(mark);
        }
        merge_extras(&mut self.extras, &other.extras);
    }

    pub fn merged(&self, other: &ParagraphFormatting) -> ParagraphFormatting {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}

/// Replaces extras with the same element name, appends the rest
fn merge_extras(target: &mut Vec<XmlElement>, incoming: &[XmlElement]) {
    for extra in incoming {
        match target.iter_mut().find(|e| e.name == extra.name) {
            Some(slot) => *slot = extra.clone(),
            None => target.push(extra.clone()),
        }
    }
}
