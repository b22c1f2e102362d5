//! Typed document model
//!
//! A [`Document`] wraps an `Arc<DocumentPackage>`; blocks hold their paragraphs and
//! tables behind `Arc` too, so an edit only copies the path it touches.

pub mod content;
pub mod formatting;
pub mod numbering;
pub mod package;
pub mod styles;
pub mod theme;

pub use content::{
    visit_paragraphs, Block, BreakKind, CellProperties, Drawing, FieldCharKind, Hyperlink, Inline, LinkTarget,
    NoteKind, Paragraph, ReferenceKind, RowProperties, Run, RunContent, SimpleField, Table, TableCell,
    TableProperties, TableRow, VMerge, Width, WidthUnit, OBJECT_REPLACEMENT,
};
pub use formatting::{
    Alignment, ColorRef, Indentation, LineRule, NumberingRef, ParagraphFormatting, RunFonts, Spacing,
    TextFormatting, ThemeColor, ThemeFont, Underline, VerticalAlign,
};
pub use numbering::{AbstractNumbering, LevelOverride, ListKind, ListLevel, NumberingDefinitions, NumberingInstance};
pub use package::{
    CoreProperties, Document, DocumentPackage, DocumentStats, HeaderFooter, HeaderFooterKind, MediaFile, Note, Notes,
    RawPart, SectionItem, SectionProperties, MAIN_PART, PACKAGE_ROOT,
};
pub use styles::{DocDefaults, Style, StyleSheet, StyleType};
pub use theme::{Font, FontSet, FontTable, Theme};
