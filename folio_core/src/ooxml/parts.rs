//! Non-story parts: styles, theme, numbering, font table and core properties

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::model::{
    AbstractNumbering, CoreProperties, DocDefaults, Font, FontSet, FontTable, LevelOverride, ListLevel,
    NumberingDefinitions, NumberingInstance, Style, StyleSheet, StyleType, Theme,
};
use crate::warning::Warning;

use super::properties::{
    finish, only_attrs, read_number, read_paragraph_properties, read_run_properties, read_string,
    read_table_properties, val, valued, write_paragraph_properties, write_run_properties,
    write_table_properties,
};
use super::xml::{local_part, parse_on_off, XmlElement, XmlError, XmlNode};

pub const NS_WORDPROCESSING: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const NS_DRAWING: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

const STYLE_ORDER: &[&str] = &[
    "name", "aliases", "basedOn", "next", "link", "autoRedefine", "hidden", "uiPriority", "semiHidden",
    "unhideWhenUsed", "qFormat", "locked", "personal", "personalCompose", "personalReply", "rsid", "pPr", "rPr",
    "tblPr", "trPr", "tcPr", "tblStylePr",
];

const LEVEL_ORDER: &[&str] = &[
    "start", "numFmt", "lvlRestart", "pStyle", "isLgl", "suff", "lvlText", "lvlPicBulletId", "legacy", "lvlJc",
    "pPr", "rPr",
];

const FONT_ORDER: &[&str] = &[
    "altName", "panose1", "charset", "family", "notTrueType", "pitch", "sig", "embedRegular", "embedBold",
    "embedItalic", "embedBoldItalic",
];

fn root_attributes(attributes: &[(String, String)]) -> Vec<(String, String)> {
    if attributes.iter().any(|(k, _)| k == "xmlns:w") {
        attributes.to_vec()
    } else {
        let mut out = vec![("xmlns:w".to_string(), NS_WORDPROCESSING.to_string())];
        out.extend(attributes.iter().cloned());
        out
    }
}

fn with_attributes(name: &str, attributes: Vec<(String, String)>) -> XmlElement {
    let mut element = XmlElement::new(name);
    element.attributes = attributes;
    element
}

fn flag(element: &XmlElement) -> bool {
    parse_on_off(val(element))
}

// ============================================================================
// Styles
// ============================================================================

/// Reads `word/styles.xml`
pub fn read_styles(root: &XmlElement) -> StyleSheet {
    let mut sheet = StyleSheet {
        attributes: root.attributes.clone(),
        ..Default::default()
    };
    for child in root.elements() {
        match child.local_name() {
            "docDefaults" => sheet.defaults = read_doc_defaults(child),
            "latentStyles" => sheet.latent_styles = Some(child.clone()),
            "style" => match read_style(child) {
                Some(style) => sheet.styles.push(style),
                None => log::warn!("Skipping style without an id"),
            },
            other => log::debug!("Ignoring styles child <{}>", other),
        }
    }
    sheet
}

fn read_doc_defaults(element: &XmlElement) -> DocDefaults {
    let mut defaults = DocDefaults::default();
    if let Some(rpr) = element.child("rPrDefault").and_then(|e| e.child("rPr")) {
        defaults.run = read_run_properties(rpr);
    }
    if let Some(ppr) = element.child("pPrDefault").and_then(|e| e.child("pPr")) {
        defaults.paragraph = read_paragraph_properties(ppr);
    }
    defaults
}

fn read_style(element: &XmlElement) -> Option<Style> {
    let style_id = element.attr_local("styleId")?;
    let style_type = element
        .attr_local("type")
        .and_then(StyleType::from_attr)
        .unwrap_or(StyleType::Paragraph);
    let mut style = Style::new(style_id, style_type);
    style.is_default = element.attr_local("default").map(|v| parse_on_off(Some(v))).unwrap_or(false);
    style.custom = element
        .attr_local("customStyle")
        .map(|v| parse_on_off(Some(v)))
        .unwrap_or(false);

    for child in element.elements() {
        let typed = match child.local_name() {
            "name" => read_string(child, &mut style.name),
            "basedOn" => read_string(child, &mut style.based_on),
            "next" => read_string(child, &mut style.next),
            "link" => read_string(child, &mut style.link),
            "uiPriority" => read_number(child, &mut style.ui_priority),
            "qFormat" if only_attrs(child, &["val"]) => {
                style.quick_format = flag(child);
                true
            }
            "semiHidden" if only_attrs(child, &["val"]) => {
                style.semi_hidden = flag(child);
                true
            }
            "unhideWhenUsed" if only_attrs(child, &["val"]) => {
                style.unhide_when_used = flag(child);
                true
            }
            "pPr" => {
                style.paragraph = Some(read_paragraph_properties(child));
                true
            }
            "rPr" => {
                style.run = Some(read_run_properties(child));
                true
            }
            "tblPr" => {
                style.table = Some(read_table_properties(child));
                true
            }
            _ => false,
        };
        if !typed {
            style.extras.push(child.clone());
        }
    }
    Some(style)
}

/// Builds `word/styles.xml`
pub fn write_styles(sheet: &StyleSheet) -> XmlElement {
    let mut root = with_attributes("w:styles", root_attributes(&sheet.attributes));

    let mut defaults = XmlElement::new("w:docDefaults");
    if let Some(rpr) = write_run_properties(&sheet.defaults.run) {
        defaults = defaults.with_child(XmlElement::new("w:rPrDefault").with_child(rpr));
    }
    if let Some(ppr) = write_paragraph_properties(&sheet.defaults.paragraph) {
        defaults = defaults.with_child(XmlElement::new("w:pPrDefault").with_child(ppr));
    }
    if !defaults.children.is_empty() {
        root = root.with_child(defaults);
    }
    if let Some(latent) = &sheet.latent_styles {
        root = root.with_child(latent.clone());
    }
    for style in &sheet.styles {
        root = root.with_child(write_style(style));
    }
    root
}

fn write_style(style: &Style) -> XmlElement {
    let mut children = Vec::new();
    if let Some(name) = &style.name {
        children.push(valued("w:name", name.as_str()));
    }
    if let Some(parent) = &style.based_on {
        children.push(valued("w:basedOn", parent.as_str()));
    }
    if let Some(next) = &style.next {
        children.push(valued("w:next", next.as_str()));
    }
    if let Some(link) = &style.link {
        children.push(valued("w:link", link.as_str()));
    }
    if let Some(priority) = style.ui_priority {
        children.push(valued("w:uiPriority", priority.to_string()));
    }
    if style.semi_hidden {
        children.push(XmlElement::new("w:semiHidden"));
    }
    if style.unhide_when_used {
        children.push(XmlElement::new("w:unhideWhenUsed"));
    }
    if style.quick_format {
        children.push(XmlElement::new("w:qFormat"));
    }
    if let Some(ppr) = style.paragraph.as_ref().and_then(write_paragraph_properties) {
        children.push(ppr);
    }
    if let Some(rpr) = style.run.as_ref().and_then(write_run_properties) {
        children.push(rpr);
    }
    if let Some(table) = &style.table {
        children.push(write_table_properties(table));
    }

    let mut element = finish(children, &style.extras, STYLE_ORDER, "w:style").unwrap_or_else(|| XmlElement::new("w:style"));
    let mut attributes = vec![("w:type".to_string(), style.style_type.as_attr().to_string())];
    if style.is_default {
        attributes.push(("w:default".to_string(), "1".to_string()));
    }
    if style.custom {
        attributes.push(("w:customStyle".to_string(), "1".to_string()));
    }
    attributes.push(("w:styleId".to_string(), style.style_id.clone()));
    element.attributes = attributes;
    element
}

// ============================================================================
// Theme
// ============================================================================

/// Theme written when a document has none of its own
const DEFAULT_THEME_XML: &str = r#"<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements><a:clrScheme name="Office"><a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="44546A"/></a:dk2><a:lt2><a:srgbClr val="E7E6E6"/></a:lt2><a:accent1><a:srgbClr val="4472C4"/></a:accent1><a:accent2><a:srgbClr val="ED7D31"/></a:accent2><a:accent3><a:srgbClr val="A5A5A5"/></a:accent3><a:accent4><a:srgbClr val="FFC000"/></a:accent4><a:accent5><a:srgbClr val="5B9BD5"/></a:accent5><a:accent6><a:srgbClr val="70AD47"/></a:accent6><a:hlink><a:srgbClr val="0563C1"/></a:hlink><a:folHlink><a:srgbClr val="954F72"/></a:folHlink></a:clrScheme><a:fontScheme name="Office"><a:majorFont><a:latin typeface="Calibri Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme><a:fmtScheme name="Office"><a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst><a:lnStyleLst><a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="12700"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="19050"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst><a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst><a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst></a:fmtScheme></a:themeElements><a:objectDefaults/><a:extraClrSchemeLst/></a:theme>"#;

fn theme_elements(root: &XmlElement) -> Option<&XmlElement> {
    root.child("themeElements")
}

/// Reads `word/theme/theme1.xml`
pub fn read_theme(root: &XmlElement) -> Theme {
    let mut theme = Theme {
        name: root.attr("name").map(str::to_string),
        colors: BTreeMap::new(),
        major: FontSet::default(),
        minor: FontSet::default(),
        raw: Some(root.clone()),
    };
    let Some(elements) = theme_elements(root) else {
        return theme;
    };
    if let Some(scheme) = elements.child("clrScheme") {
        for slot in scheme.elements() {
            let value = slot.elements().find_map(|color| match color.local_name() {
                "srgbClr" => color.attr("val"),
                "sysClr" => color.attr("lastClr"),
                _ => None,
            });
            if let Some(value) = value {
                theme.colors.insert(slot.local_name().to_string(), value.to_ascii_uppercase());
            }
        }
    }
    if let Some(fonts) = elements.child("fontScheme") {
        if let Some(major) = fonts.child("majorFont") {
            theme.major = read_font_set(major);
        }
        if let Some(minor) = fonts.child("minorFont") {
            theme.minor = read_font_set(minor);
        }
    }
    theme
}

fn read_font_set(element: &XmlElement) -> FontSet {
    let typeface = |local: &str| {
        element
            .child(local)
            .and_then(|e| e.attr("typeface"))
            .unwrap_or_default()
            .to_string()
    };
    let scripts = element
        .elements()
        .filter(|e| e.local_name() == "font")
        .filter_map(|e| Some((e.attr("script")?.to_string(), e.attr("typeface")?.to_string())))
        .collect();
    FontSet {
        latin: typeface("latin"),
        east_asian: typeface("ea"),
        complex_script: typeface("cs"),
        scripts,
    }
}

/// Builds the theme part: the stored tree (or the default theme) with colours and fonts patched in
pub fn write_theme(theme: &Theme) -> Result<XmlElement, XmlError> {
    let mut root = match &theme.raw {
        Some(raw) => raw.clone(),
        None => XmlElement::parse(DEFAULT_THEME_XML.as_bytes())?,
    };
    if let Some(name) = &theme.name {
        root.set_attr("name", name.as_str());
    }
    let prefix = root.prefix().unwrap_or("a").to_string();
    for elements in root.elements_mut().filter(|e| e.local_name() == "themeElements") {
        for part in elements.elements_mut() {
            match part.local_name() {
                "clrScheme" => patch_colors(part, &theme.colors, &prefix),
                "fontScheme" => {
                    for set in part.elements_mut() {
                        match set.local_name() {
                            "majorFont" => patch_font_set(set, &theme.major, &prefix),
                            "minorFont" => patch_font_set(set, &theme.minor, &prefix),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
    }
    Ok(root)
}

fn patch_colors(scheme: &mut XmlElement, colors: &BTreeMap<String, String>, prefix: &str) {
    for slot in scheme.elements_mut() {
        let Some(value) = colors.get(slot.local_name()) else {
            continue;
        };
        let current = slot.elements().find_map(|color| match color.local_name() {
            "srgbClr" => color.attr("val"),
            "sysClr" => color.attr("lastClr"),
            _ => None,
        });
        if current.map(|c| c.eq_ignore_ascii_case(value)) != Some(true) {
            slot.children = vec![XmlNode::Element(
                XmlElement::new(format!("{}:srgbClr", prefix)).with_attr("val", value.as_str()),
            )];
        }
    }
}

fn patch_font_set(element: &mut XmlElement, fonts: &FontSet, prefix: &str) {
    for (local, value) in [
        ("latin", &fonts.latin),
        ("ea", &fonts.east_asian),
        ("cs", &fonts.complex_script),
    ] {
        if let Some(face) = element.elements_mut().find(|e| e.local_name() == local) {
            face.set_attr("typeface", value.as_str());
        }
    }
    let mut seen = Vec::new();
    element.children.retain_mut(|node| match node {
        XmlNode::Element(e) if e.local_name() == "font" => {
            let Some(script) = e.attr("script").map(str::to_string) else {
                return true;
            };
            match fonts.scripts.get(&script) {
                Some(face) => {
                    e.set_attr("typeface", face.as_str());
                    seen.push(script);
                    true
                }
                None => false,
            }
        }
        _ => true,
    });
    for (script, face) in &fonts.scripts {
        if !seen.contains(script) {
            element.children.push(XmlNode::Element(
                XmlElement::new(format!("{}:font", prefix))
                    .with_attr("script", script.as_str())
                    .with_attr("typeface", face.as_str()),
            ));
        }
    }
}

// ============================================================================
// Numbering
// ============================================================================

/// Reads `word/numbering.xml`; level children that cannot be represented are dropped
pub fn read_numbering(root: &XmlElement, part: &str, warnings: &mut Vec<Warning>) -> NumberingDefinitions {
    let mut defs = NumberingDefinitions {
        attributes: root.attributes.clone(),
        ..Default::default()
    };
    for child in root.elements() {
        match child.local_name() {
            "numPicBullet" => defs.picture_bullets.push(child.clone()),
            "abstractNum" => {
                let Some(id) = child.attr_local("abstractNumId").and_then(|v| v.parse().ok()) else {
                    log::warn!("Skipping abstract numbering without an id");
                    continue;
                };
                let mut abstract_num = AbstractNumbering {
                    id,
                    attributes: other_attributes(child, "abstractNumId"),
                    ..Default::default()
                };
                for item in child.elements() {
                    if item.local_name() == "lvl" {
                        abstract_num.levels.push(read_level(item, part, warnings));
                    } else {
                        abstract_num.extras.push(item.clone());
                    }
                }
                defs.abstract_nums.insert(id, abstract_num);
            }
            "num" => {
                let Some(num_id) = child.attr_local("numId").and_then(|v| v.parse().ok()) else {
                    log::warn!("Skipping numbering instance without an id");
                    continue;
                };
                let mut instance = NumberingInstance {
                    num_id,
                    attributes: other_attributes(child, "numId"),
                    ..Default::default()
                };
                for item in child.elements() {
                    match item.local_name() {
                        "abstractNumId" => {
                            let mut value = None;
                            read_number(item, &mut value);
                            instance.abstract_id = value.unwrap_or(0);
                        }
                        "lvlOverride" => instance.overrides.push(read_override(item, part, warnings)),
                        other => warnings.push(Warning::UnsupportedElement {
                            part: part.to_string(),
                            element: other.to_string(),
                            preserved: false,
                        }),
                    }
                }
                defs.instances.insert(num_id, instance);
            }
            _ => defs.extras.push(child.clone()),
        }
    }
    defs
}

fn other_attributes(element: &XmlElement, id: &str) -> Vec<(String, String)> {
    element
        .attributes
        .iter()
        .filter(|(k, _)| local_part(k) != id)
        .cloned()
        .collect()
}

fn read_override(element: &XmlElement, part: &str, warnings: &mut Vec<Warning>) -> LevelOverride {
    let mut result = LevelOverride {
        level: element.attr_local("ilvl").and_then(|v| v.parse().ok()).unwrap_or(0),
        start_override: None,
        definition: None,
    };
    for child in element.elements() {
        match child.local_name() {
            "startOverride" => {
                read_number(child, &mut result.start_override);
            }
            "lvl" => result.definition = Some(read_level(child, part, warnings)),
            other => warnings.push(Warning::UnsupportedElement {
                part: part.to_string(),
                element: other.to_string(),
                preserved: false,
            }),
        }
    }
    result
}

fn read_level(element: &XmlElement, part: &str, warnings: &mut Vec<Warning>) -> ListLevel {
    let mut level = ListLevel {
        level: element.attr_local("ilvl").and_then(|v| v.parse().ok()).unwrap_or(0),
        template_code: element.attr_local("tplc").map(str::to_string),
        tentative: element.attr_local("tentative").map(|v| parse_on_off(Some(v))).unwrap_or(false),
        ..Default::default()
    };
    for child in element.elements() {
        let typed = match child.local_name() {
            "start" => read_number(child, &mut level.start),
            "numFmt" => {
                level.format = val(child).map(str::to_string);
                level.format.is_some()
            }
            "lvlRestart" => read_number(child, &mut level.restart),
            "pStyle" => read_string(child, &mut level.style_id),
            "isLgl" => {
                level.is_legal = flag(child);
                true
            }
            "suff" => read_string(child, &mut level.suffix),
            "lvlText" => {
                level.text = Some(val(child).unwrap_or_default().to_string());
                true
            }
            "lvlPicBulletId" => read_number(child, &mut level.picture_bullet),
            "lvlJc" => read_string(child, &mut level.justification),
            "pPr" => {
                level.paragraph = Some(read_paragraph_properties(child));
                true
            }
            "rPr" => {
                level.run = Some(read_run_properties(child));
                true
            }
            _ => false,
        };
        if !typed {
            warnings.push(Warning::UnsupportedElement {
                part: part.to_string(),
                element: child.local_name().to_string(),
                preserved: false,
            });
        }
    }
    level
}

/// Builds `word/numbering.xml`
pub fn write_numbering(defs: &NumberingDefinitions) -> XmlElement {
    let mut root = with_attributes("w:numbering", root_attributes(&defs.attributes));
    for bullet in &defs.picture_bullets {
        root = root.with_child(bullet.clone());
    }
    for abstract_num in defs.abstract_nums.values() {
        let mut element = XmlElement::new("w:abstractNum").with_attr("w:abstractNumId", abstract_num.id.to_string());
        element.attributes.extend(abstract_num.attributes.iter().cloned());
        for extra in &abstract_num.extras {
            element = element.with_child(extra.clone());
        }
        for level in &abstract_num.levels {
            element = element.with_child(write_level(level));
        }
        root = root.with_child(element);
    }
    for instance in defs.instances.values() {
        let mut element = XmlElement::new("w:num").with_attr("w:numId", instance.num_id.to_string());
        element.attributes.extend(instance.attributes.iter().cloned());
        element = element.with_child(valued("w:abstractNumId", instance.abstract_id.to_string()));
        for o in &instance.overrides {
            let mut item = XmlElement::new("w:lvlOverride").with_attr("w:ilvl", o.level.to_string());
            if let Some(start) = o.start_override {
                item = item.with_child(valued("w:startOverride", start.to_string()));
            }
            if let Some(definition) = &o.definition {
                item = item.with_child(write_level(definition));
            }
            element = element.with_child(item);
        }
        root = root.with_child(element);
    }
    for extra in &defs.extras {
        root = root.with_child(extra.clone());
    }
    root
}

fn write_level(level: &ListLevel) -> XmlElement {
    let mut children = Vec::new();
    if let Some(start) = level.start {
        children.push(valued("w:start", start.to_string()));
    }
    if let Some(format) = &level.format {
        children.push(valued("w:numFmt", format.as_str()));
    }
    if let Some(restart) = level.restart {
        children.push(valued("w:lvlRestart", restart.to_string()));
    }
    if let Some(style) = &level.style_id {
        children.push(valued("w:pStyle", style.as_str()));
    }
    if level.is_legal {
        children.push(XmlElement::new("w:isLgl"));
    }
    if let Some(suffix) = &level.suffix {
        children.push(valued("w:suff", suffix.as_str()));
    }
    if let Some(text) = &level.text {
        children.push(valued("w:lvlText", text.as_str()));
    }
    if let Some(bullet) = level.picture_bullet {
        children.push(valued("w:lvlPicBulletId", bullet.to_string()));
    }
    if let Some(jc) = &level.justification {
        children.push(valued("w:lvlJc", jc.as_str()));
    }
    if let Some(ppr) = level.paragraph.as_ref().and_then(write_paragraph_properties) {
        children.push(ppr);
    }
    if let Some(rpr) = level.run.as_ref().and_then(write_run_properties) {
        children.push(rpr);
    }
    let mut element = finish(children, &[], LEVEL_ORDER, "w:lvl").unwrap_or_else(|| XmlElement::new("w:lvl"));
    let mut attributes = vec![("w:ilvl".to_string(), level.level.to_string())];
    if let Some(code) = &level.template_code {
        attributes.push(("w:tplc".to_string(), code.clone()));
    }
    if level.tentative {
        attributes.push(("w:tentative".to_string(), "1".to_string()));
    }
    element.attributes = attributes;
    element
}

// ============================================================================
// Font table
// ============================================================================

/// Reads `word/fontTable.xml`
pub fn read_font_table(root: &XmlElement) -> FontTable {
    let mut table = FontTable {
        attributes: root.attributes.clone(),
        fonts: Vec::new(),
    };
    for element in root.elements().filter(|e| e.local_name() == "font") {
        let Some(name) = element.attr_local("name") else {
            continue;
        };
        let mut font = Font {
            name: name.to_string(),
            charset: None,
            family: None,
            pitch: None,
            extras: Vec::new(),
        };
        for child in element.elements() {
            let typed = match child.local_name() {
                "charset" => read_string(child, &mut font.charset),
                "family" => read_string(child, &mut font.family),
                "pitch" => read_string(child, &mut font.pitch),
                _ => false,
            };
            if !typed {
                font.extras.push(child.clone());
            }
        }
        table.fonts.push(font);
    }
    table
}

/// Builds `word/fontTable.xml`
pub fn write_font_table(table: &FontTable) -> XmlElement {
    let mut root = with_attributes("w:fonts", root_attributes(&table.attributes));
    for font in &table.fonts {
        let mut children = Vec::new();
        if let Some(charset) = &font.charset {
            children.push(valued("w:charset", charset.as_str()));
        }
        if let Some(family) = &font.family {
            children.push(valued("w:family", family.as_str()));
        }
        if let Some(pitch) = &font.pitch {
            children.push(valued("w:pitch", pitch.as_str()));
        }
        let mut element =
            finish(children, &font.extras, FONT_ORDER, "w:font").unwrap_or_else(|| XmlElement::new("w:font"));
        element.attributes = vec![("w:name".to_string(), font.name.clone())];
        root = root.with_child(element);
    }
    root
}

// ============================================================================
// Core properties
// ============================================================================

const CORE_NAMESPACES: [(&str, &str); 5] = [
    (
        "xmlns:cp",
        "http://schemas.openxmlformats.org/package/2006/metadata/core-properties",
    ),
    ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
    ("xmlns:dcterms", "http://purl.org/dc/terms/"),
    ("xmlns:dcmitype", "http://purl.org/dc/dcmitype/"),
    ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
];

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(value.trim()) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            log::warn!("Ignoring core property timestamp {:?}: {}", value, e);
            None
        }
    }
}

/// Reads `docProps/core.xml`
pub fn read_core_properties(root: &XmlElement) -> CoreProperties {
    let mut props = CoreProperties::default();
    for child in root.elements() {
        let text = child.text();
        let value = Some(text.clone());
        match child.local_name() {
            "title" => props.title = value,
            "subject" => props.subject = value,
            "creator" => props.creator = value,
            "keywords" => props.keywords = value,
            "description" => props.description = value,
            "lastModifiedBy" => props.last_modified_by = value,
            "revision" => props.revision = value,
            "category" => props.category = value,
            "created" => props.created = parse_timestamp(&text),
            "modified" => props.modified = parse_timestamp(&text),
            other => log::debug!("Ignoring core property <{}>", other),
        }
    }
    props
}

/// Builds `docProps/core.xml`
pub fn write_core_properties(props: &CoreProperties) -> XmlElement {
    let mut root = XmlElement::new("cp:coreProperties");
    for (key, value) in CORE_NAMESPACES {
        root.set_attr(key, value);
    }
    let text_fields = [
        ("dc:title", &props.title),
        ("dc:subject", &props.subject),
        ("dc:creator", &props.creator),
        ("cp:keywords", &props.keywords),
        ("dc:description", &props.description),
        ("cp:lastModifiedBy", &props.last_modified_by),
        ("cp:revision", &props.revision),
        ("cp:category", &props.category),
    ];
    for (name, value) in text_fields {
        if let Some(value) = value {
            let mut element = XmlElement::new(name);
            if !value.is_empty() {
                element = element.with_text(value.as_str());
            }
            root = root.with_child(element);
        }
    }
    for (name, value) in [("dcterms:created", props.created), ("dcterms:modified", props.modified)] {
        if let Some(value) = value {
            root = root.with_child(
                XmlElement::new(name)
                    .with_attr("xsi:type", "dcterms:W3CDTF")
                    .with_text(value.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_styles_round_trip() {
        let sheet = StyleSheet::builtin();
        let xml = write_styles(&sheet);
        let back = read_styles(&xml);
        assert_eq!(back.styles.len(), sheet.styles.len());
        for (a, b) in back.styles.iter().zip(&sheet.styles) {
            assert_eq!(a.style_id, b.style_id);
            assert_eq!(a.based_on, b.based_on);
            assert_eq!(a.run, b.run);
        }
        assert_eq!(back.defaults, sheet.defaults);
        assert_eq!(write_styles(&back).to_xml_string(), xml.to_xml_string());
    }

    #[test]
    fn test_style_attributes_written_in_order() {
        let mut style = Style::new("Quote", StyleType::Paragraph).named("Quote").based_on("Normal");
        style.custom = true;
        let xml = write_style(&style).to_xml_string();
        assert_eq!(
            xml,
            r#"<w:style w:type="paragraph" w:customStyle="1" w:styleId="Quote"><w:name w:val="Quote"/><w:basedOn w:val="Normal"/></w:style>"#
        );
    }

    #[test]
    fn test_default_theme_parses_and_reads_back() {
        let root = write_theme(&Theme::office()).unwrap();
        let theme = read_theme(&root);
        assert_eq!(theme.color("accent1"), Some("4472C4"));
        assert_eq!(theme.color("dk1"), Some("000000"));
        assert_eq!(theme.major.latin, "Calibri Light");
        assert_eq!(theme.minor.latin, "Calibri");
    }

    #[test]
    fn test_theme_patch_replaces_changed_colors() {
        let mut theme = Theme::office();
        theme.colors.insert("accent2".to_string(), "112233".to_string());
        theme.minor.scripts.insert("Jpan".to_string(), "Yu Mincho".to_string());
        let root = write_theme(&theme).unwrap();
        let back = read_theme(&root);
        assert_eq!(back.color("accent2"), Some("112233"));
        assert_eq!(back.minor.scripts.get("Jpan").map(String::as_str), Some("Yu Mincho"));
        // system colours that did not change keep their element
        assert!(root.to_xml_string().contains("windowText"));
    }

    #[test]
    fn test_numbering_drops_unknown_level_children() {
        let xml = br#"<w:numbering xmlns:w="urn:w"><w:abstractNum w:abstractNumId="0" w15:restartNumberingAfterBreak="0"><w:multiLevelType w:val="hybridMultilevel"/><w:lvl w:ilvl="0" w:tplc="04090001"><w:start w:val="1"/><w:numFmt w:val="bullet"/><w:lvlText w:val=""/><w:legacy w:legacy="1"/><w:lvlJc w:val="left"/></w:lvl></w:abstractNum><w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num></w:numbering>"#;
        let root = XmlElement::parse(xml).unwrap();
        let mut warnings = Vec::new();
        let defs = read_numbering(&root, "word/numbering.xml", &mut warnings);
        assert_eq!(defs.list_kind(1, 0), Some(crate::model::ListKind::Bullet));
        assert_eq!(defs.abstract_nums[&0].extras.len(), 1);
        assert_eq!(defs.abstract_nums[&0].attributes.len(), 1);
        assert_eq!(
            warnings,
            vec![Warning::UnsupportedElement {
                part: "word/numbering.xml".to_string(),
                element: "legacy".to_string(),
                preserved: false,
            }]
        );
        let written = write_numbering(&defs);
        let mut again = Vec::new();
        assert_eq!(read_numbering(&written, "word/numbering.xml", &mut again), defs);
        assert!(again.is_empty());
    }

    #[test]
    fn test_font_table_round_trip() {
        let table = FontTable::builtin();
        let back = read_font_table(&write_font_table(&table));
        assert_eq!(back.fonts, table.fonts);
    }

    #[test]
    fn test_core_properties_round_trip() {
        let props = CoreProperties {
            title: Some("Quarterly report".to_string()),
            creator: Some("Ana".to_string()),
            revision: Some("3".to_string()),
            created: Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()),
            ..Default::default()
        };
        let root = write_core_properties(&props);
        assert!(root.to_xml_string().contains("2024-05-01T08:30:00Z"));
        assert_eq!(read_core_properties(&root), props);
    }

    #[test]
    fn test_bad_timestamp_is_ignored() {
        let root = XmlElement::parse(
            br#"<cp:coreProperties xmlns:cp="urn:cp" xmlns:dcterms="urn:d"><dcterms:created>yesterday</dcterms:created></cp:coreProperties>"#,
        )
        .unwrap();
        assert_eq!(read_core_properties(&root).created, None);
    }
}
