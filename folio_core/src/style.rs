//! # Style Resolution
//!
//! Computes effective formatting by layering, in increasing priority:
//! - document defaults (`w:docDefaults`)
//! - the `basedOn` chain, root ancestor first
//! - the run's character style chain (runs only)
//! - direct formatting
//!
//! Theme colours and fonts are looked up last, into [`ResolvedFormatting::color`] and
//! [`ResolvedFormatting::font_family`]; the merged records keep the theme reference.

use std::collections::BTreeSet;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::model::{
    ColorRef, ListKind, NumberingDefinitions, Paragraph, ParagraphFormatting, Run, Style, StyleSheet, StyleType,
    TextFormatting, Theme,
};
use crate::warning::Warning;

/// Effective formatting at one point of the document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFormatting {
    pub paragraph: ParagraphFormatting,
    pub run: TextFormatting,
    /// Six-digit hex colour; `None` for automatic
    pub color: Option<String>,
    /// Typeface for Latin text
    pub font_family: Option<String>,
}

/// Resolves formatting against one style sheet and theme
pub struct StyleResolver<'a> {
    styles: &'a StyleSheet,
    theme: &'a Theme,
    numbering: Option<&'a NumberingDefinitions>,
    warnings: Vec<Warning>,
}

impl<'a> StyleResolver<'a> {
    /// Creates a resolver; `basedOn` cycles are detected up front
    pub fn new(styles: &'a StyleSheet, theme: &'a Theme) -> Self {
        let mut resolver = StyleResolver {
            styles,
            theme,
            numbering: None,
            warnings: Vec::new(),
        };
        resolver.detect_cycles();
        resolver
    }

    /// Enables [`list_kind`](Self::list_kind) lookups
    pub fn with_numbering(mut self, numbering: Option<&'a NumberingDefinitions>) -> Self {
        self.numbering = numbering;
        self
    }

    /// One [`Warning::CyclicStyle`] per `basedOn` cycle, named by its smallest id
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    fn detect_cycles(&mut self) {
        let mut reported = BTreeSet::new();
        for style in &self.styles.styles {
            let mut seen: Vec<&str> = vec![style.style_id.as_str()];
            let mut current = style;
            while let Some(parent) = current.based_on.as_deref().and_then(|id| self.styles.get(id)) {
                if let Some(start) = seen.iter().position(|id| *id == parent.style_id) {
                    let cycle = &seen[start..];
                    if let Some(first) = cycle.iter().min() {
                        reported.insert(first.to_string());
                    }
                    break;
                }
                seen.push(parent.style_id.as_str());
                current = parent;
            }
        }
        for style_id in reported {
            warn!("Style {} is part of a basedOn cycle", style_id);
            self.warnings.push(Warning::CyclicStyle { style_id });
        }
    }

    /// Style and its ancestors, root first; the walk stops where it would revisit a style
    fn chain(&self, style: &'a Style) -> Vec<&'a Style> {
        let mut chain = vec![style];
        let mut current = style;
        while let Some(parent) = current.based_on.as_deref().and_then(|id| self.styles.get(id)) {
            if chain.iter().any(|s| s.style_id == parent.style_id) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// Paragraph style by id, else the default paragraph style
    fn paragraph_style(&self, style_id: Option<&str>) -> Option<&'a Style> {
        style_id
            .and_then(|id| self.styles.get(id))
            .or_else(|| self.styles.default_style(StyleType::Paragraph))
    }

    /// Formatting of a paragraph style, including document defaults
    ///
    /// An unknown or absent id resolves the default paragraph style.
    pub fn resolve_paragraph_style(&self, style_id: Option<&str>) -> ResolvedFormatting {
        let mut paragraph = self.styles.defaults.paragraph.clone();
        let mut run = self.styles.defaults.run.clone();
        if let Some(style) = self.paragraph_style(style_id) {
            for link in self.chain(style) {
                if let Some(p) = &link.paragraph {
                    paragraph.merge(p);
                }
                if let Some(r) = &link.run {
                    run.merge(r);
                }
            }
            paragraph.style_id = Some(style.style_id.clone());
        }
        // style ids in the merged records name the resolved style, not a layer
        run.style_id = None;
        self.finish(paragraph, run)
    }

    /// Effective formatting of a paragraph, direct formatting included
    pub fn resolve_paragraph(&self, paragraph: &Paragraph) -> ResolvedFormatting {
        let mut resolved = self.resolve_paragraph_style(paragraph.formatting.style_id.as_deref());
        let style_id = resolved.paragraph.style_id.take();
        resolved.paragraph.merge(&paragraph.formatting);
        resolved.paragraph.style_id = style_id;
        resolved
    }

    /// Effective formatting of a run inside a paragraph with the given style
    pub fn resolve_run_formatting(&self, run: &Run, paragraph_style_id: Option<&str>) -> ResolvedFormatting {
        let base = self.resolve_paragraph_style(paragraph_style_id);
        let mut formatting = base.run;
        if let Some(style) = run
            .formatting
            .style_id
            .as_deref()
            .and_then(|id| self.styles.get(id))
            .filter(|s| s.style_type == StyleType::Character)
        {
            for link in self.chain(style) {
                if let Some(r) = &link.run {
                    formatting.merge(r);
                }
            }
        }
        formatting.merge(&run.formatting);
        self.finish(base.paragraph, formatting)
    }

    /// Bullet or numbered, from the paragraph's effective numbering reference
    pub fn list_kind(&self, paragraph: &Paragraph) -> Option<ListKind> {
        let numbering = self.resolve_paragraph(paragraph).paragraph.numbering?;
        self.numbering?.list_kind(numbering.num_id, numbering.level)
    }

    fn finish(&self, paragraph: ParagraphFormatting, run: TextFormatting) -> ResolvedFormatting {
        let color = run.color.as_ref().and_then(|c| self.resolve_color(c));
        let font_family = run.fonts.as_ref().and_then(|fonts| {
            fonts
                .ascii_theme
                .and_then(|f| self.theme.font(f))
                .map(str::to_string)
                .or_else(|| fonts.ascii.clone())
        });
        ResolvedFormatting {
            paragraph,
            run,
            color,
            font_family,
        }
    }

    /// Literal colour for a colour reference; `None` for automatic
    pub fn resolve_color(&self, color: &ColorRef) -> Option<String> {
        match color {
            ColorRef::Auto => None,
            ColorRef::Literal(hex) => Some(hex.clone()),
            ColorRef::Theme {
                slot,
                tint,
                shade,
                fallback,
            } => match self.theme.color(slot.scheme_key()) {
                Some(base) => {
                    let mut rgb = parse_hex(base)?;
                    if let Some(t) = tint.as_deref().and_then(parse_byte) {
                        rgb = rgb.map(|c| apply_tint(c, t));
                    }
                    if let Some(s) = shade.as_deref().and_then(parse_byte) {
                        rgb = rgb.map(|c| apply_shade(c, s));
                    }
                    Some(format!("{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2]))
                }
                None => fallback.clone(),
            },
        }
    }
}

fn parse_byte(value: &str) -> Option<u8> {
    u8::from_str_radix(value, 16).ok()
}

fn parse_hex(value: &str) -> Option<[u8; 3]> {
    if value.len() != 6 {
        return None;
    }
    Some([
        parse_byte(value.get(0..2)?)?,
        parse_byte(value.get(2..4)?)?,
        parse_byte(value.get(4..6)?)?,
    ])
}

/// Moves a channel toward white; `tint` 0xFF keeps it unchanged
fn apply_tint(channel: u8, tint: u8) -> u8 {
    let c = channel as u32;
    let t = tint as u32;
    ((c * t + 255 * (255 - t) + 127) / 255) as u8
}

/// Moves a channel toward black; `shade` 0xFF keeps it unchanged
fn apply_shade(channel: u8, shade: u8) -> u8 {
    ((channel as u32 * shade as u32 + 127) / 255) as u8
}
