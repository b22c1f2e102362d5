//! Formatting property elements (`w:rPr`, `w:pPr`, `w:tblPr`, `w:trPr`, `w:tcPr`)
//!
//! A child becomes a typed field only when every attribute is understood and it
//! has no child elements; anything else is carried verbatim in `extras`. On write,
//! typed fields and extras are merged and sorted into schema order.

use crate::model::{
    Alignment, CellProperties, ColorRef, Indentation, LineRule, NumberingRef, ParagraphFormatting,
    RowProperties, RunFonts, Spacing, TableProperties, TextFormatting, ThemeColor, ThemeFont, Underline,
    VMerge, VerticalAlign, Width, WidthUnit,
};

use super::xml::{local_part, parse_on_off, XmlElement};

const RUN_ORDER: &[&str] = &[
    "rStyle", "rFonts", "b", "bCs", "i", "iCs", "caps", "smallCaps", "strike", "dstrike", "outline", "shadow",
    "emboss", "imprint", "noProof", "snapToGrid", "vanish", "webHidden", "color", "spacing", "w", "kern",
    "position", "sz", "szCs", "highlight", "u", "effect", "bdr", "shd", "fitText", "vertAlign", "rtl", "cs",
    "em", "lang", "eastAsianLayout", "specVanish", "oMath",
];

const PARAGRAPH_ORDER: &[&str] = &[
    "pStyle", "keepNext", "keepLines", "pageBreakBefore", "framePr", "widowControl", "numPr",
    "suppressLineNumbers", "pBdr", "shd", "tabs", "suppressAutoHyphens", "kinsoku", "wordWrap",
    "overflowPunct", "topLinePunct", "autoSpaceDE", "autoSpaceDN", "bidi", "adjustRightInd", "snapToGrid",
    "spacing", "ind", "contextualSpacing", "mirrorIndents", "suppressOverlap", "jc", "textDirection",
    "textAlignment", "textboxTightWrap", "outlineLvl", "divId", "cnfStyle", "rPr", "sectPr", "pPrChange",
];

const TABLE_ORDER: &[&str] = &[
    "tblStyle", "tblpPr", "tblOverlap", "bidiVisual", "tblStyleRowBandSize", "tblStyleColBandSize", "tblW", "jc",
    "tblCellSpacing", "tblInd", "tblBorders", "shd", "tblLayout", "tblCellMar", "tblLook", "tblCaption",
    "tblDescription",
];

const ROW_ORDER: &[&str] = &[
    "cnfStyle", "divId", "gridBefore", "gridAfter", "wBefore", "wAfter", "cantSplit", "trHeight", "tblHeader",
    "tblCellSpacing", "jc", "hidden", "ins", "del", "trPrChange",
];

const CELL_ORDER: &[&str] = &[
    "cnfStyle", "tcW", "gridSpan", "hMerge", "vMerge", "tcBorders", "shd", "noWrap", "tcMar", "textDirection",
    "tcFitText", "vAlign", "hideMark",
];

/// Sorts children into the order given by `order`; unknown names go last, in place
pub fn sort_by_schema(children: &mut [XmlElement], order: &[&str]) {
    children.sort_by_key(|c| {
        order
            .iter()
            .position(|name| *name == c.local_name())
            .unwrap_or(order.len())
    });
}

/// True when every attribute is one of `allowed` and there are no child elements
pub(crate) fn only_attrs(element: &XmlElement, allowed: &[&str]) -> bool {
    element.elements().next().is_none()
        && element
            .attributes
            .iter()
            .all(|(key, _)| allowed.contains(&local_part(key)))
}

pub(crate) fn val(element: &XmlElement) -> Option<&str> {
    element.attr_local("val")
}

pub(crate) fn read_string(element: &XmlElement, field: &mut Option<String>) -> bool {
    if !only_attrs(element, &["val"]) {
        return false;
    }
    match val(element) {
        Some(v) => {
            *field = Some(v.to_string());
            true
        }
        None => false,
    }
}

pub(crate) fn read_toggle(element: &XmlElement, field: &mut Option<bool>) -> bool {
    if !only_attrs(element, &["val"]) {
        return false;
    }
    *field = Some(parse_on_off(val(element)));
    true
}

pub(crate) fn read_number<T: std::str::FromStr>(element: &XmlElement, field: &mut Option<T>) -> bool {
    if !only_attrs(element, &["val"]) {
        return false;
    }
    match val(element).and_then(|v| v.parse().ok()) {
        Some(n) => {
            *field = Some(n);
            true
        }
        None => false,
    }
}

fn parse_attr<T: std::str::FromStr>(element: &XmlElement, local: &str) -> Result<Option<T>, ()> {
    match element.attr_local(local) {
        None => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|_| ()),
    }
}

pub(crate) fn toggle(name: &str, value: bool) -> XmlElement {
    let element = XmlElement::new(name);
    if value {
        element
    } else {
        element.with_attr("w:val", "0")
    }
}

pub(crate) fn valued(name: &str, value: impl Into<String>) -> XmlElement {
    XmlElement::new(name).with_attr("w:val", value)
}

/// Appends extras not shadowed by a typed child, then sorts into schema order
pub(crate) fn finish(mut children: Vec<XmlElement>, extras: &[XmlElement], order: &[&str], name: &str) -> Option<XmlElement> {
    let typed = children.len();
    for extra in extras {
        if !children[..typed].iter().any(|c| c.name == extra.name) {
            children.push(extra.clone());
        }
    }
    if children.is_empty() {
        return None;
    }
    sort_by_schema(&mut children, order);
    let mut element = XmlElement::new(name);
    for child in children {
        element = element.with_child(child);
    }
    Some(element)
}

// ============================================================================
// Run properties
// ============================================================================

/// Reads `w:rPr`
pub fn read_run_properties(element: &XmlElement) -> TextFormatting {
    let mut formatting = TextFormatting::default();
    for child in element.elements() {
        if !read_run_property(child, &mut formatting) {
            formatting.extras.push(child.clone());
        }
    }
    formatting
}

fn read_run_property(element: &XmlElement, f: &mut TextFormatting) -> bool {
    match element.local_name() {
        "rStyle" => read_string(element, &mut f.style_id),
        "b" => read_toggle(element, &mut f.bold),
        "i" => read_toggle(element, &mut f.italic),
        "strike" => read_toggle(element, &mut f.strike),
        "dstrike" => read_toggle(element, &mut f.double_strike),
        "caps" => read_toggle(element, &mut f.caps),
        "smallCaps" => read_toggle(element, &mut f.small_caps),
        "vanish" => read_toggle(element, &mut f.hidden),
        "sz" => read_number(element, &mut f.size),
        "highlight" => read_string(element, &mut f.highlight),
        "u" => {
            if !only_attrs(element, &["val"]) {
                return false;
            }
            f.underline = Some(Underline::from_attr(val(element).unwrap_or("single")));
            true
        }
        "vertAlign" => match (only_attrs(element, &["val"]), val(element).and_then(VerticalAlign::from_attr)) {
            (true, Some(align)) => {
                f.vertical_align = Some(align);
                true
            }
            _ => false,
        },
        "rFonts" => match read_fonts(element) {
            Some(fonts) => {
                f.fonts = Some(fonts);
                true
            }
            None => false,
        },
        "color" => match read_color(element) {
            Some(color) => {
                f.color = Some(color);
                true
            }
            None => false,
        },
        _ => false,
    }
}

fn read_fonts(element: &XmlElement) -> Option<RunFonts> {
    const ALLOWED: &[&str] = &[
        "ascii",
        "hAnsi",
        "eastAsia",
        "cs",
        "asciiTheme",
        "hAnsiTheme",
        "eastAsiaTheme",
        "cstheme",
        "hint",
    ];
    if !only_attrs(element, ALLOWED) {
        return None;
    }
    let theme = |local: &str| -> Result<Option<ThemeFont>, ()> {
        match element.attr_local(local) {
            None => Ok(None),
            Some(v) => ThemeFont::from_attr(v).map(Some).ok_or(()),
        }
    };
    let text = |local: &str| element.attr_local(local).map(str::to_string);
    Some(RunFonts {
        ascii: text("ascii"),
        h_ansi: text("hAnsi"),
        east_asia: text("eastAsia"),
        cs: text("cs"),
        ascii_theme: theme("asciiTheme").ok()?,
        h_ansi_theme: theme("hAnsiTheme").ok()?,
        east_asia_theme: theme("eastAsiaTheme").ok()?,
        cs_theme: theme("cstheme").ok()?,
        hint: text("hint"),
    })
}

fn read_color(element: &XmlElement) -> Option<ColorRef> {
    if !only_attrs(element, &["val", "themeColor", "themeTint", "themeShade"]) {
        return None;
    }
    let value = val(element);
    match element.attr_local("themeColor") {
        Some(slot) => Some(ColorRef::Theme {
            slot: ThemeColor::from_attr(slot)?,
            tint: element.attr_local("themeTint").map(str::to_string),
            shade: element.attr_local("themeShade").map(str::to_string),
            fallback: value.map(str::to_string),
        }),
        None => {
            if element.attr_local("themeTint").is_some() || element.attr_local("themeShade").is_some() {
                return None;
            }
            match value? {
                "auto" => Some(ColorRef::Auto),
                hex => Some(ColorRef::Literal(hex.to_string())),
            }
        }
    }
}

/// Writes `w:rPr`, or `None` when there is nothing to write
pub fn write_run_properties(f: &TextFormatting) -> Option<XmlElement> {
    let mut children = Vec::new();
    if let Some(id) = &f.style_id {
        children.push(valued("w:rStyle", id.as_str()));
    }
    if let Some(fonts) = &f.fonts {
        if !fonts.is_empty() {
            children.push(write_fonts(fonts));
        }
    }
    let toggles = [
        ("w:b", f.bold),
        ("w:i", f.italic),
        ("w:caps", f.caps),
        ("w:smallCaps", f.small_caps),
        ("w:strike", f.strike),
        ("w:dstrike", f.double_strike),
        ("w:vanish", f.hidden),
    ];
    for (name, value) in toggles {
        if let Some(value) = value {
            children.push(toggle(name, value));
        }
    }
    if let Some(color) = &f.color {
        children.push(write_color(color));
    }
    if let Some(size) = f.size {
        children.push(valued("w:sz", size.to_string()));
    }
    if let Some(highlight) = &f.highlight {
        children.push(valued("w:highlight", highlight.as_str()));
    }
    if let Some(underline) = &f.underline {
        children.push(valued("w:u", underline.as_attr()));
    }
    if let Some(align) = f.vertical_align {
        children.push(valued("w:vertAlign", align.as_attr()));
    }
    finish(children, &f.extras, RUN_ORDER, "w:rPr")
}

fn write_fonts(fonts: &RunFonts) -> XmlElement {
    let mut element = XmlElement::new("w:rFonts");
    let literals = [
        ("w:ascii", &fonts.ascii),
        ("w:hAnsi", &fonts.h_ansi),
        ("w:eastAsia", &fonts.east_asia),
        ("w:cs", &fonts.cs),
    ];
    for (key, value) in literals {
        if let Some(value) = value {
            element.set_attr(key, value.as_str());
        }
    }
    let themes = [
        ("w:asciiTheme", fonts.ascii_theme),
        ("w:hAnsiTheme", fonts.h_ansi_theme),
        ("w:eastAsiaTheme", fonts.east_asia_theme),
        ("w:cstheme", fonts.cs_theme),
    ];
    for (key, value) in themes {
        if let Some(value) = value {
            element.set_attr(key, value.as_attr());
        }
    }
    if let Some(hint) = &fonts.hint {
        element.set_attr("w:hint", hint.as_str());
    }
    element
}

fn write_color(color: &ColorRef) -> XmlElement {
    match color {
        ColorRef::Auto => valued("w:color", "auto"),
        ColorRef::Literal(hex) => valued("w:color", hex.as_str()),
        ColorRef::Theme {
            slot,
            tint,
            shade,
            fallback,
        } => {
            let mut element = valued("w:color", fallback.as_deref().unwrap_or("auto"));
            element.set_attr("w:themeColor", slot.as_attr());
            if let Some(tint) = tint {
                element.set_attr("w:themeTint", tint.as_str());
            }
            if let Some(shade) = shade {
                element.set_attr("w:themeShade", shade.as_str());
            }
            element
        }
    }
}

// ============================================================================
// Paragraph properties
// ============================================================================

/// Reads `w:pPr`
pub fn read_paragraph_properties(element: &XmlElement) -> ParagraphFormatting {
    let mut formatting = ParagraphFormatting::default();
    for child in element.elements() {
        if !read_paragraph_property(child, &mut formatting) {
            formatting.extras.push(child.clone());
        }
    }
    formatting
}

fn read_paragraph_property(element: &XmlElement, f: &mut ParagraphFormatting) -> bool {
    match element.local_name() {
        "pStyle" => read_string(element, &mut f.style_id),
        "keepNext" => read_toggle(element, &mut f.keep_next),
        "keepLines" => read_toggle(element, &mut f.keep_lines),
        "pageBreakBefore" => read_toggle(element, &mut f.page_break_before),
        "outlineLvl" => read_number(element, &mut f.outline_level),
        "jc" => {
            if !only_attrs(element, &["val"]) {
                return false;
            }
            match val(element) {
                Some(v) => {
                    f.alignment = Some(Alignment::from_attr(v));
                    true
                }
                None => false,
            }
        }
        "rPr" => {
            if !element.attributes.is_empty() {
                return false;
            }
            f.mark_formatting = Some(read_run_properties(element));
            true
        }
        "numPr" => match read_numbering(element) {
            Some(numbering) => {
                f.numbering = Some(numbering);
                true
            }
            None => false,
        },
        "spacing" => match read_spacing(element) {
            Some(spacing) => {
                f.spacing = Some(spacing);
                true
            }
            None => false,
        },
        "ind" => match read_indentation(element) {
            Some(ind) => {
                f.indentation = Some(ind);
                true
            }
            None => false,
        },
        _ => false,
    }
}

fn read_numbering(element: &XmlElement) -> Option<NumberingRef> {
    if !element.attributes.is_empty() {
        return None;
    }
    let mut level = None;
    let mut num_id = None;
    for child in element.elements() {
        let ok = match child.local_name() {
            "ilvl" => read_number(child, &mut level),
            "numId" => read_number(child, &mut num_id),
            _ => false,
        };
        if !ok {
            return None;
        }
    }
    Some(NumberingRef {
        num_id: num_id?,
        level: level?,
    })
}

fn read_spacing(element: &XmlElement) -> Option<Spacing> {
    if !only_attrs(element, &["before", "after", "line", "lineRule"]) {
        return None;
    }
    let line_rule = match element.attr_local("lineRule") {
        None => None,
        Some(v) => Some(LineRule::from_attr(v)?),
    };
    Some(Spacing {
        before: parse_attr(element, "before").ok()?,
        after: parse_attr(element, "after").ok()?,
        line: parse_attr(element, "line").ok()?,
        line_rule,
    })
}

fn read_indentation(element: &XmlElement) -> Option<Indentation> {
    if !only_attrs(element, &["left", "right", "firstLine", "hanging"]) {
        return None;
    }
    Some(Indentation {
        left: parse_attr(element, "left").ok()?,
        right: parse_attr(element, "right").ok()?,
        first_line: parse_attr(element, "firstLine").ok()?,
        hanging: parse_attr(element, "hanging").ok()?,
    })
}

/// Writes `w:pPr`, or `None` when there is nothing to write
pub fn write_paragraph_properties(f: &ParagraphFormatting) -> Option<XmlElement> {
    let mut children = Vec::new();
    if let Some(id) = &f.style_id {
        children.push(valued("w:pStyle", id.as_str()));
    }
    let toggles = [
        ("w:keepNext", f.keep_next),
        ("w:keepLines", f.keep_lines),
        ("w:pageBreakBefore", f.page_break_before),
    ];
    for (name, value) in toggles {
        if let Some(value) = value {
            children.push(toggle(name, value));
        }
    }
    if let Some(numbering) = f.numbering {
        children.push(
            XmlElement::new("w:numPr")
                .with_child(valued("w:ilvl", numbering.level.to_string()))
                .with_child(valued("w:numId", numbering.num_id.to_string())),
        );
    }
    if let Some(spacing) = &f.spacing {
        let mut element = XmlElement::new("w:spacing");
        if let Some(v) = spacing.before {
            element.set_attr("w:before", v.to_string());
        }
        if let Some(v) = spacing.after {
            element.set_attr("w:after", v.to_string());
        }
        if let Some(v) = spacing.line {
            element.set_attr("w:line", v.to_string());
        }
        if let Some(rule) = spacing.line_rule {
            element.set_attr("w:lineRule", rule.as_attr());
        }
        children.push(element);
    }
    if let Some(ind) = &f.indentation {
        let mut element = XmlElement::new("w:ind");
        let values = [
            ("w:left", ind.left),
            ("w:right", ind.right),
            ("w:firstLine", ind.first_line),
            ("w:hanging", ind.hanging),
        ];
        for (key, value) in values {
            if let Some(value) = value {
                element.set_attr(key, value.to_string());
            }
        }
        children.push(element);
    }
    if let Some(alignment) = &f.alignment {
        children.push(valued("w:jc", alignment.as_attr()));
    }
    if let Some(level) = f.outline_level {
        children.push(valued("w:outlineLvl", level.to_string()));
    }
    if let Some(mark) = &f.mark_formatting {
        if let Some(rpr) = write_run_properties(mark) {
            children.push(rpr);
        }
    }
    finish(children, &f.extras, PARAGRAPH_ORDER, "w:pPr")
}

// ============================================================================
// Table properties
// ============================================================================

fn read_width(element: &XmlElement) -> Option<Width> {
    if !only_attrs(element, &["w", "type"]) {
        return None;
    }
    Some(Width {
        value: parse_attr(element, "w").ok()?.unwrap_or(0),
        unit: element
            .attr_local("type")
            .map(WidthUnit::from_attr)
            .unwrap_or(WidthUnit::Dxa),
    })
}

fn write_width(name: &str, width: &Width) -> XmlElement {
    XmlElement::new(name)
        .with_attr("w:w", width.value.to_string())
        .with_attr("w:type", width.unit.as_attr())
}

/// Reads `w:tblPr`
pub fn read_table_properties(element: &XmlElement) -> TableProperties {
    let mut props = TableProperties::default();
    for child in element.elements() {
        let typed = match child.local_name() {
            "tblStyle" => read_string(child, &mut props.style_id),
            "tblW" => match read_width(child) {
                Some(width) => {
                    props.width = Some(width);
                    true
                }
                None => false,
            },
            "jc" => {
                let mut value = None;
                let ok = read_string(child, &mut value);
                if let Some(value) = value {
                    props.alignment = Some(Alignment::from_attr(&value));
                }
                ok
            }
            _ => false,
        };
        if !typed {
            props.extras.push(child.clone());
        }
    }
    props
}

/// Writes `w:tblPr`; tables always carry one, so an empty element is returned
/// rather than `None`
pub fn write_table_properties(props: &TableProperties) -> XmlElement {
    let mut children = Vec::new();
    if let Some(id) = &props.style_id {
        children.push(valued("w:tblStyle", id.as_str()));
    }
    if let Some(width) = &props.width {
        children.push(write_width("w:tblW", width));
    }
    if let Some(alignment) = &props.alignment {
        children.push(valued("w:jc", alignment.as_attr()));
    }
    finish(children, &props.extras, TABLE_ORDER, "w:tblPr").unwrap_or_else(|| XmlElement::new("w:tblPr"))
}

/// Reads `w:trPr`
pub fn read_row_properties(element: &XmlElement) -> RowProperties {
    let mut props = RowProperties::default();
    for child in element.elements() {
        let typed = child.local_name() == "tblHeader" && read_toggle(child, &mut props.header);
        if !typed {
            props.extras.push(child.clone());
        }
    }
    props
}

pub fn write_row_properties(props: &RowProperties) -> Option<XmlElement> {
    let mut children = Vec::new();
    if let Some(header) = props.header {
        children.push(toggle("w:tblHeader", header));
    }
    finish(children, &props.extras, ROW_ORDER, "w:trPr")
}

/// Reads `w:tcPr` into properties, grid span and vertical merge
pub fn read_cell_properties(element: &XmlElement) -> (CellProperties, u32, Option<VMerge>) {
    let mut props = CellProperties::default();
    let mut span = 1;
    let mut merge = None;
    for child in element.elements() {
        let typed = match child.local_name() {
            "tcW" => match read_width(child) {
                Some(width) => {
                    props.width = Some(width);
                    true
                }
                None => false,
            },
            "gridSpan" => {
                let mut value: Option<u32> = None;
                let ok = read_number(child, &mut value);
                if let Some(v) = value {
                    span = v.max(1);
                }
                ok
            }
            "vMerge" if only_attrs(child, &["val"]) => match val(child) {
                Some("restart") => {
                    merge = Some(VMerge::Restart);
                    true
                }
                None | Some("continue") => {
                    merge = Some(VMerge::Continue);
                    true
                }
                Some(_) => false,
            },
            _ => false,
        };
        if !typed {
            props.extras.push(child.clone());
        }
    }
    (props, span, merge)
}

pub fn write_cell_properties(props: &CellProperties, span: u32, merge: Option<VMerge>) -> Option<XmlElement> {
    let mut children = Vec::new();
    if let Some(width) = &props.width {
        children.push(write_width("w:tcW", width));
    }
    if span > 1 {
        children.push(valued("w:gridSpan", span.to_string()));
    }
    match merge {
        Some(VMerge::Restart) => children.push(valued("w:vMerge", "restart")),
        Some(VMerge::Continue) => children.push(XmlElement::new("w:vMerge")),
        None => {}
    }
    finish(children, &props.extras, CELL_ORDER, "w:tcPr")
}
