//! Numbering definitions (`word/numbering.xml`)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::formatting::{ParagraphFormatting, TextFormatting};
use crate::ooxml::xml::XmlElement;

/// Kind of list a numbered paragraph belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListKind {
    Bullet,
    Numbered,
    /// Level defined with `w:numFmt="none"`
    Unnumbered,
}

/// One level of a list definition (`w:lvl`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListLevel {
    pub level: u32,
    pub start: Option<u32>,
    /// `w:numFmt` value (`decimal`, `bullet`, `lowerLetter`, ...)
    pub format: Option<String>,
    pub restart: Option<u32>,
    pub style_id: Option<String>,
    pub is_legal: bool,
    /// `w:suff` value (`tab`, `space`, `nothing`)
    pub suffix: Option<String>,
    /// `w:lvlText` value (`%1.`)
    pub text: Option<String>,
    pub picture_bullet: Option<u32>,
    /// `w:lvlJc` value
    pub justification: Option<String>,
    pub paragraph: Option<ParagraphFormatting>,
    pub run: Option<TextFormatting>,
    /// Template code (`w:tplc`)
    pub template_code: Option<String>,
    /// Level not yet used by any paragraph (`w:tentative`)
    pub tentative: bool,
}

impl ListLevel {
    pub fn kind(&self) -> ListKind {
        match self.format.as_deref() {
            Some("bullet") => ListKind::Bullet,
            Some("none") => ListKind::Unnumbered,
            _ => ListKind::Numbered,
        }
    }
}

/// Abstract list definition (`w:abstractNum`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbstractNumbering {
    pub id: u32,
    /// Attributes other than the id
    pub attributes: Vec<(String, String)>,
    /// Children other than levels (`w:nsid`, `w:multiLevelType`, `w:tmpl`, ...)
    pub extras: Vec<XmlElement>,
    pub levels: Vec<ListLevel>,
}

/// Level override of a list instance (`w:lvlOverride`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelOverride {
    pub level: u32,
    pub start_override: Option<u32>,
    pub definition: Option<ListLevel>,
}

/// List instance (`w:num`) referenced by paragraphs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingInstance {
    pub num_id: u32,
    /// Attributes other than the id
    pub attributes: Vec<(String, String)>,
    pub abstract_id: u32,
    pub overrides: Vec<LevelOverride>,
}

/// Contents of the numbering part
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingDefinitions {
    pub attributes: Vec<(String, String)>,
    /// Children written before the abstract definitions (`w:numPicBullet`)
    pub picture_bullets: Vec<XmlElement>,
    pub abstract_nums: BTreeMap<u32, AbstractNumbering>,
    pub instances: BTreeMap<u32, NumberingInstance>,
    /// Trailing children (`w:numIdMacAtCleanup`, ...)
    pub extras: Vec<XmlElement>,
}

impl NumberingDefinitions {
    /// Effective level definition for a list instance, overrides first
    pub fn level(&self, num_id: u32, level: u32) -> Option<&ListLevel> {
        let instance = self.instances.get(&num_id)?;
        if let Some(definition) = instance
            .overrides
            .iter()
            .filter(|o| o.level == level)
            .find_map(|o| o.definition.as_ref())
        {
            return Some(definition);
        }
        self.abstract_nums
            .get(&instance.abstract_id)?
            .levels
            .iter()
            .find(|l| l.level == level)
    }

    /// Resolves whether `num_id` at `level` is a bulleted or numbered list
    pub fn list_kind(&self, num_id: u32, level: u32) -> Option<ListKind> {
        // numId 0 removes numbering
        if num_id == 0 {
            return None;
        }
        self.level(num_id, level).map(ListLevel::kind)
    }
}
