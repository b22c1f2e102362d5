//! Image support for inserted pictures.
//! Detects the format of an image blob, reads its pixel dimensions and builds the
//! inline `w:drawing` element that references it.
//!
//! # OOXML Image Relationships
//!
//! Pictures in OOXML documents are referenced through relationships in document.xml.rels:
//! ```xml
//! <Relationship Id="rId5"
//!     Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image"
//!     Target="media/image1.png"/>
//! ```
//! and the drawing carries the id in `a:blip/@r:embed`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{visit_paragraphs, Block, RunContent};
use crate::ooxml::xml::XmlElement;
use crate::ooxml::NS_DRAWING;

/// EMU (English Metric Unit) conversion constants
/// 1 inch = 914400 EMUs
/// 1 point = 12700 EMUs
pub const EMU_PER_INCH: u64 = 914_400;
pub const EMU_PER_POINT: u64 = 12_700;
/// Assuming 96 DPI
pub const EMU_PER_PIXEL: u64 = 9_525;
pub const EMU_PER_TWIP: u64 = 635;
/// Largest drawing extent (`ST_PositiveCoordinate`)
pub const MAX_EXTENT_EMU: u64 = 27_273_042_316_900;

const NS_PICTURE: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";

/// Errors raised while probing an image blob
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Image data is empty")]
    Empty,
    #[error("Unknown or unsupported image format")]
    UnknownFormat,
    #[error("Failed to decode image: {0}")]
    DecodeError(String),
    #[error("Image dimensions exceed maximum allowed size")]
    DimensionsExceeded,
    #[error("Invalid image dimensions (zero or negative)")]
    InvalidDimensions,
}

// ============================================================================
// Image Format
// ============================================================================

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    /// Portable Network Graphics
    Png,
    /// JPEG (Joint Photographic Experts Group)
    Jpeg,
    /// Graphics Interchange Format
    Gif,
    /// Bitmap image
    Bmp,
    /// WebP image
    WebP,
    /// Unknown format
    Unknown,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Png => write!(f, "PNG"),
            ImageFormat::Jpeg => write!(f, "JPEG"),
            ImageFormat::Gif => write!(f, "GIF"),
            ImageFormat::Bmp => write!(f, "BMP"),
            ImageFormat::WebP => write!(f, "WebP"),
            ImageFormat::Unknown => write!(f, "Unknown"),
        }
    }
}

impl ImageFormat {
    /// Detect format from magic bytes at the start of the data
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return ImageFormat::Png;
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return ImageFormat::Jpeg;
        }

        // GIF87a or GIF89a
        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return ImageFormat::Gif;
        }

        // BMP: 42 4D
        if data.starts_with(b"BM") {
            return ImageFormat::Bmp;
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return ImageFormat::WebP;
        }

        ImageFormat::Unknown
    }

    /// Get MIME type for this format
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Unknown => "application/octet-stream",
        }
    }

    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::WebP => "webp",
            ImageFormat::Unknown => "bin",
        }
    }
}

// ============================================================================
// Probing
// ============================================================================

/// Format and pixel size of an image blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    /// Reads format and dimensions from the image header
    pub fn from_bytes(data: &[u8]) -> Result<Self, ImageError> {
        if data.is_empty() {
            return Err(ImageError::Empty);
        }
        let format = ImageFormat::from_magic_bytes(data);
        let (width, height) = decode_dimensions(data, format)?;
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidDimensions);
        }
        if width > 1_000_000 || height > 1_000_000 {
            return Err(ImageError::DimensionsExceeded);
        }
        Ok(ImageInfo { format, width, height })
    }

    /// Size in EMU at 96 DPI, scaled down to fit `max_width_emu` when given
    pub fn extent_emu(&self, max_width_emu: Option<u64>) -> (u64, u64) {
        let cx = self.width as u64 * EMU_PER_PIXEL;
        let cy = self.height as u64 * EMU_PER_PIXEL;
        match max_width_emu {
            Some(max) if max > 0 && cx > max => (max, (cy as u128 * max as u128 / cx as u128) as u64),
            _ => (cx, cy),
        }
    }

    /// Extent for a requested width in EMU, keeping the aspect ratio
    ///
    /// `None` when the width is zero or either side exceeds [`MAX_EXTENT_EMU`].
    pub fn extent_for_width(&self, cx: u64) -> Option<(u64, u64)> {
        if cx == 0 || cx > MAX_EXTENT_EMU {
            return None;
        }
        let cy = self.height as u128 * cx as u128 / self.width as u128;
        let cy = u64::try_from(cy).ok().filter(|cy| *cy <= MAX_EXTENT_EMU)?;
        Some((cx, cy.max(1)))
    }
}

fn decode_dimensions(data: &[u8], format: ImageFormat) -> Result<(u32, u32), ImageError> {
    match format {
        ImageFormat::Png => decode_png_dimensions(data),
        ImageFormat::Jpeg => decode_jpeg_dimensions(data),
        ImageFormat::Gif => decode_gif_dimensions(data),
        ImageFormat::Bmp => decode_bmp_dimensions(data),
        ImageFormat::WebP => decode_webp_dimensions(data),
        ImageFormat::Unknown => Err(ImageError::UnknownFormat),
    }
}

/// Decode PNG dimensions from IHDR chunk.
fn decode_png_dimensions(data: &[u8]) -> Result<(u32, u32), ImageError> {
    // PNG signature: 8 bytes, IHDR starts at byte 8
    if data.len() < 24 || &data[12..16] != b"IHDR" {
        return Err(ImageError::InvalidDimensions);
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Ok((width, height))
}

/// Decode JPEG dimensions from SOF markers.
fn decode_jpeg_dimensions(data: &[u8]) -> Result<(u32, u32), ImageError> {
    let mut i = 2;
    while i + 3 < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = data[i + 1];
        let length = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        // SOF0-SOF15 except DHT, JPG and DAC carry the frame size
        if matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            if i + 8 >= data.len() {
                break;
            }
            let height = u16::from_be_bytes([data[i + 5], data[i + 6]]);
            let width = u16::from_be_bytes([data[i + 7], data[i + 8]]);
            return Ok((width as u32, height as u32));
        }
        i += 2 + length;
    }
    Err(ImageError::DecodeError("No SOF marker found".to_string()))
}

/// Decode GIF dimensions from Logical Screen Descriptor.
fn decode_gif_dimensions(data: &[u8]) -> Result<(u32, u32), ImageError> {
    if data.len() < 10 {
        return Err(ImageError::InvalidDimensions);
    }
    let width = u16::from_le_bytes([data[6], data[7]]);
    let height = u16::from_le_bytes([data[8], data[9]]);
    Ok((width as u32, height as u32))
}

/// Decode BMP dimensions from BITMAPINFOHEADER.
fn decode_bmp_dimensions(data: &[u8]) -> Result<(u32, u32), ImageError> {
    if data.len() < 26 {
        return Err(ImageError::InvalidDimensions);
    }
    let width = i32::from_le_bytes([data[18], data[19], data[20], data[21]]);
    // negative height means a top-down bitmap
    let height = i32::from_le_bytes([data[22], data[23], data[24], data[25]]);
    if width <= 0 || height == 0 {
        return Err(ImageError::InvalidDimensions);
    }
    Ok((width as u32, height.unsigned_abs()))
}

/// Decode WebP dimensions from RIFF header.
fn decode_webp_dimensions(data: &[u8]) -> Result<(u32, u32), ImageError> {
    if data.len() < 30 {
        return Err(ImageError::InvalidDimensions);
    }
    match &data[12..16] {
        // extended: 24-bit canvas size minus one
        b"VP8X" => {
            let width = u32::from_le_bytes([data[24], data[25], data[26], 0]) + 1;
            let height = u32::from_le_bytes([data[27], data[28], data[29], 0]) + 1;
            Ok((width, height))
        }
        b"VP8 " => {
            let width = u16::from_le_bytes([data[26], data[27]]) & 0x3FFF;
            let height = u16::from_le_bytes([data[28], data[29]]) & 0x3FFF;
            Ok((width as u32, height as u32))
        }
        b"VP8L" => {
            let bits = u32::from_le_bytes([data[21], data[22], data[23], data[24]]);
            Ok(((bits & 0x3FFF) + 1, ((bits >> 14) & 0x3FFF) + 1))
        }
        _ => Err(ImageError::DecodeError("Unknown WebP chunk".to_string())),
    }
}

// ============================================================================
// Drawing markup
// ============================================================================

/// Largest `wp:docPr/@id` used by drawings in `blocks`
pub fn max_drawing_id(blocks: &[Block]) -> u32 {
    fn scan(element: &XmlElement, max: &mut u32) {
        if element.local_name() == "docPr" {
            if let Some(id) = element.attr("id").and_then(|v| v.parse::<u32>().ok()) {
                *max = (*max).max(id);
            }
        }
        for child in element.elements() {
            scan(child, max);
        }
    }
    let mut max = 0;
    visit_paragraphs(blocks, &mut |paragraph| {
        for run in paragraph.runs() {
            for item in &run.content {
                if let RunContent::Drawing(drawing) = item {
                    scan(&drawing.xml, &mut max);
                }
            }
        }
    });
    max
}

/// Parameters of an inline picture
#[derive(Debug, Clone)]
pub struct InlinePicture<'a> {
    /// Relationship id of the image part
    pub embed: &'a str,
    /// Prefix bound to the relationships namespace in the story
    pub rel_prefix: &'a str,
    pub cx: u64,
    pub cy: u64,
    /// Unique drawing object id
    pub id: u32,
    pub description: &'a str,
}

impl InlinePicture<'_> {
    /// Builds the `w:drawing` element of an inline picture
    pub fn to_element(&self) -> XmlElement {
        let cx = self.cx.to_string();
        let cy = self.cy.to_string();
        let name = format!("Picture {}", self.id);

        let blip_fill = XmlElement::new("pic:blipFill")
            .with_child(XmlElement::new("a:blip").with_attr(format!("{}:embed", self.rel_prefix), self.embed))
            .with_child(XmlElement::new("a:stretch").with_child(XmlElement::new("a:fillRect")));
        let shape = XmlElement::new("pic:spPr")
            .with_child(
                XmlElement::new("a:xfrm")
                    .with_child(XmlElement::new("a:off").with_attr("x", "0").with_attr("y", "0"))
                    .with_child(XmlElement::new("a:ext").with_attr("cx", cx.as_str()).with_attr("cy", cy.as_str())),
            )
            .with_child(
                XmlElement::new("a:prstGeom")
                    .with_attr("prst", "rect")
                    .with_child(XmlElement::new("a:avLst")),
            );
        let picture = XmlElement::new("pic:pic")
            .with_attr("xmlns:pic", NS_PICTURE)
            .with_child(
                XmlElement::new("pic:nvPicPr")
                    .with_child(
                        XmlElement::new("pic:cNvPr")
                            .with_attr("id", "0")
                            .with_attr("name", name.as_str())
                            .with_attr("descr", self.description),
                    )
                    .with_child(XmlElement::new("pic:cNvPicPr")),
            )
            .with_child(blip_fill)
            .with_child(shape);
        let graphic = XmlElement::new("a:graphic").with_attr("xmlns:a", NS_DRAWING).with_child(
            XmlElement::new("a:graphicData")
                .with_attr("uri", NS_PICTURE)
                .with_child(picture),
        );
        let inline = XmlElement::new("wp:inline")
            .with_attr("xmlns:wp", NS_WP)
            .with_attr("distT", "0")
            .with_attr("distB", "0")
            .with_attr("distL", "0")
            .with_attr("distR", "0")
            .with_child(XmlElement::new("wp:extent").with_attr("cx", cx.as_str()).with_attr("cy", cy.as_str()))
            .with_child(
                XmlElement::new("wp:effectExtent")
                    .with_attr("l", "0")
                    .with_attr("t", "0")
                    .with_attr("r", "0")
                    .with_attr("b", "0"),
            )
            .with_child(
                XmlElement::new("wp:docPr")
                    .with_attr("id", self.id.to_string())
                    .with_attr("name", name.as_str())
                    .with_attr("descr", self.description),
            )
            .with_child(
                XmlElement::new("wp:cNvGraphicFramePr").with_child(
                    XmlElement::new("a:graphicFrameLocks")
                        .with_attr("xmlns:a", NS_DRAWING)
                        .with_attr("noChangeAspect", "1"),
                ),
            )
            .with_child(graphic);
        XmlElement::new("w:drawing").with_child(inline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Drawing, Paragraph, Run};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x0D]);
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[0x08, 0x02, 0x00, 0x00, 0x00, 0, 0, 0, 0]);
        data
    }

    #[test]
    fn test_image_format_magic_bytes() {
        assert_eq!(ImageFormat::from_magic_bytes(&png(1, 1)), ImageFormat::Png);
        assert_eq!(ImageFormat::from_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_magic_bytes(b"GIF87a"), ImageFormat::Gif);
        assert_eq!(ImageFormat::from_magic_bytes(&[0x42, 0x4D, 0x00, 0x00]), ImageFormat::Bmp);
        assert_eq!(ImageFormat::from_magic_bytes(&[0, 0, 0, 0]), ImageFormat::Unknown);
    }

    #[test]
    fn test_image_format_mime_and_extension() {
        assert_eq!(ImageFormat::Png.mime_type(), "image/png");
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::WebP.mime_type(), "image/webp");
        assert_eq!(ImageFormat::Unknown.extension(), "bin");
    }

    #[test]
    fn test_read_png() {
        let info = ImageInfo::from_bytes(&png(100, 200)).unwrap();
        assert_eq!(info.format, ImageFormat::Png);
        assert_eq!((info.width, info.height), (100, 200));
        assert_eq!(info.extent_emu(None), (952_500, 1_905_000));
    }

    #[test]
    fn test_read_gif_and_jpeg() {
        let gif = b"GIF89a\x40\x01\xF0\x00\x00\x00";
        let info = ImageInfo::from_bytes(gif).unwrap();
        assert_eq!((info.width, info.height), (320, 240));

        // SOI, APP0 (length 4), SOF0 with 8-bit precision 16x8
        let jpeg = [
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, 0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x08, 0x00, 0x10,
        ];
        let info = ImageInfo::from_bytes(&jpeg).unwrap();
        assert_eq!((info.width, info.height), (16, 8));
    }

    #[test]
    fn test_rejects_bad_image_data() {
        assert!(matches!(ImageInfo::from_bytes(&[]), Err(ImageError::Empty)));
        assert!(matches!(ImageInfo::from_bytes(b"plain text data"), Err(ImageError::UnknownFormat)));
        assert!(matches!(ImageInfo::from_bytes(&png(0, 10)), Err(ImageError::InvalidDimensions)));
    }

    #[test]
    fn test_extent_scales_to_max_width() {
        let info = ImageInfo {
            format: ImageFormat::Png,
            width: 2000,
            height: 1000,
        };
        let (cx, cy) = info.extent_emu(Some(5_943_600));
        assert_eq!(cx, 5_943_600);
        assert_eq!(cy, 2_971_800);
    }

    #[test]
    fn test_extent_for_width_keeps_ratio_and_bounds() {
        let tall = ImageInfo {
            format: ImageFormat::Png,
            width: 1,
            height: 10,
        };
        assert_eq!(tall.extent_for_width(914_400), Some((914_400, 9_144_000)));
        assert_eq!(tall.extent_for_width(0), None);
        assert_eq!(tall.extent_for_width(u64::MAX / 2), None);
        // the height would pass the limit even though the width does not
        assert_eq!(tall.extent_for_width(MAX_EXTENT_EMU), None);

        let wide = ImageInfo {
            format: ImageFormat::Png,
            width: 1_000_000,
            height: 1,
        };
        assert_eq!(wide.extent_for_width(1), Some((1, 1)));
        assert_eq!(wide.extent_for_width(MAX_EXTENT_EMU), Some((MAX_EXTENT_EMU, 27_273_042)));
    }

    #[test]
    fn test_inline_picture_element() {
        let drawing = InlinePicture {
            embed: "rId7",
            rel_prefix: "r",
            cx: 100,
            cy: 50,
            id: 3,
            description: "logo",
        }
        .to_element();
        assert_eq!(drawing.name, "w:drawing");
        let inline = drawing.child("inline").unwrap();
        assert_eq!(inline.child("docPr").unwrap().attr("id"), Some("3"));
        let mut ids = Vec::new();
        drawing.collect_relationship_ids(&["r".to_string()], &mut ids);
        assert_eq!(ids, vec!["rId7".to_string()]);
    }

    #[test]
    fn test_max_drawing_id() {
        let drawing = InlinePicture {
            embed: "rId1",
            rel_prefix: "r",
            cx: 1,
            cy: 1,
            id: 12,
            description: "",
        }
        .to_element();
        let mut run = Run::default();
        run.content.push(RunContent::Drawing(Drawing {
            embed: Some("rId1".to_string()),
            xml: drawing,
        }));
        let paragraph = Paragraph {
            content: vec![crate::model::Inline::Run(run)],
            ..Default::default()
        };
        assert_eq!(max_drawing_id(&[Block::paragraph(paragraph)]), 12);
        assert_eq!(max_drawing_id(&[]), 0);
    }
}
