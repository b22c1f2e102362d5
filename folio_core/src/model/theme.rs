//! Theme colours and fonts, and the font table

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::formatting::ThemeFont;
use crate::ooxml::xml::XmlElement;

/// Colour scheme keys in the order they appear in a theme part
pub const COLOR_SLOTS: [&str; 12] = [
    "dk1", "lt1", "dk2", "lt2", "accent1", "accent2", "accent3", "accent4", "accent5", "accent6", "hlink",
    "folHlink",
];

/// One font set of the font scheme (`a:majorFont` / `a:minorFont`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSet {
    pub latin: String,
    pub east_asian: String,
    pub complex_script: String,
    /// Per-script overrides (`a:font/@script` to typeface)
    pub scripts: BTreeMap<String, String>,
}

/// Document theme (`word/theme/theme1.xml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub name: Option<String>,
    /// Colour slot (`dk1`, `accent1`, ...) to six-digit hex
    pub colors: BTreeMap<String, String>,
    pub major: FontSet,
    pub minor: FontSet,
    /// The parsed theme part; written back with the colours and fonts patched in
    pub raw: Option<XmlElement>,
}

impl Default for Theme {
    fn default() -> Self {
        Theme::office()
    }
}

impl Theme {
    /// The default Office theme
    pub fn office() -> Self {
        let colors = [
            ("dk1", "000000"),
            ("lt1", "FFFFFF"),
            ("dk2", "44546A"),
            ("lt2", "E7E6E6"),
            ("accent1", "4472C4"),
            ("accent2", "ED7D31"),
            ("accent3", "A5A5A5"),
            ("accent4", "FFC000"),
            ("accent5", "5B9BD5"),
            ("accent6", "70AD47"),
            ("hlink", "0563C1"),
            ("folHlink", "954F72"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Theme {
            name: Some("Office Theme".to_string()),
            colors,
            major: FontSet {
                latin: "Calibri Light".to_string(),
                ..Default::default()
            },
            minor: FontSet {
                latin: "Calibri".to_string(),
                ..Default::default()
            },
            raw: None,
        }
    }

    /// Literal colour of a scheme slot
    pub fn color(&self, slot: &str) -> Option<&str> {
        self.colors.get(slot).map(String::as_str)
    }

    /// Typeface named by a theme font reference
    pub fn font(&self, font: ThemeFont) -> Option<&str> {
        let set = if font.is_major() { &self.major } else { &self.minor };
        let name = match font {
            ThemeFont::MajorAscii | ThemeFont::MajorHAnsi | ThemeFont::MinorAscii | ThemeFont::MinorHAnsi => {
                &set.latin
            }
            ThemeFont::MajorEastAsia | ThemeFont::MinorEastAsia => &set.east_asian,
            ThemeFont::MajorBidi | ThemeFont::MinorBidi => &set.complex_script,
        };
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

/// A font table entry (`w:font`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Font {
    pub name: String,
    pub charset: Option<String>,
    pub family: Option<String>,
    pub pitch: Option<String>,
    /// Remaining children (`w:panose1`, `w:sig`, ...)
    pub extras: Vec<XmlElement>,
}

impl Font {
    fn simple(name: &str, family: &str) -> Self {
        Font {
            name: name.to_string(),
            charset: Some("00".to_string()),
            family: Some(family.to_string()),
            pitch: Some("variable".to_string()),
            extras: Vec::new(),
        }
    }
}

/// Contents of the font table part
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontTable {
    pub attributes: Vec<(String, String)>,
    pub fonts: Vec<Font>,
}

impl FontTable {
    /// Font table matching the built-in styles and theme
    pub fn builtin() -> Self {
        FontTable {
            attributes: Vec::new(),
            fonts: vec![
                Font::simple("Calibri", "swiss"),
                Font::simple("Times New Roman", "roman"),
                Font::simple("Calibri Light", "swiss"),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&Font> {
        self.fonts.iter().find(|f| f.name == name)
    }
}
