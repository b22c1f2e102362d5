//! OPC (Open Packaging Conventions) package reader and writer
//! Reads ZIP-based Office Open XML packages into named parts and writes them back

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Write};

use log::{debug, trace, warn};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use super::error::{DecodeError, EncodeError};
use super::types::{
    normalize_part_name, relationships_part_name, relative_target, resolve_target, ContentType, Relationship,
    RelationshipTable, RelationshipType, TargetMode,
};
use super::xml::{escape_attr, XmlElement, XmlError, XML_DECLARATION};
use crate::config::{Compression, EncodeOptions};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const ROOT_RELATIONSHIPS_PART: &str = "_rels/.rels";

const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const NS_PACKAGE_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// OPC Package Reader
#[derive(Debug, Clone, Default)]
pub struct OpcPackage {
    /// Part data indexed by normalized part name
    parts: BTreeMap<String, Vec<u8>>,
    /// Default content types by lower-case extension
    defaults: BTreeMap<String, String>,
    /// Content type overrides by part name
    overrides: BTreeMap<String, String>,
    /// Parts skipped because they exceed the size limit
    oversized: BTreeSet<String>,
}

impl OpcPackage {
    /// Opens a package from ZIP data
    ///
    /// Fails when the data is not an archive or when either manifest is absent.
    pub fn open(file_data: &[u8], max_part_size: u64) -> Result<Self, DecodeError> {
        let mut archive = ZipArchive::new(Cursor::new(file_data))?;
        let mut package = OpcPackage::default();

        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let name = normalize_part_name(file.name());
            if file.size() > max_part_size {
                warn!("Skipping part {} ({} bytes exceeds limit)", name, file.size());
                package.oversized.insert(name);
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            trace!("Read part {} ({} bytes)", name, data.len());
            package.parts.insert(name, data);
        }

        let manifest = package
            .parts
            .get(CONTENT_TYPES_PART)
            .ok_or_else(|| DecodeError::MissingManifest(CONTENT_TYPES_PART.to_string()))?;
        let types = XmlElement::parse(manifest).map_err(|e| DecodeError::MalformedPart {
            part: CONTENT_TYPES_PART.to_string(),
            message: e.to_string(),
        })?;
        for entry in types.elements() {
            match entry.local_name() {
                "Default" => {
                    if let (Some(ext), Some(ct)) = (entry.attr("Extension"), entry.attr("ContentType")) {
                        package.defaults.insert(ext.to_ascii_lowercase(), ct.to_string());
                    }
                }
                "Override" => {
                    if let (Some(name), Some(ct)) = (entry.attr("PartName"), entry.attr("ContentType")) {
                        package.overrides.insert(normalize_part_name(name), ct.to_string());
                    }
                }
                _ => {}
            }
        }

        if !package.parts.contains_key(ROOT_RELATIONSHIPS_PART) {
            return Err(DecodeError::MissingManifest(ROOT_RELATIONSHIPS_PART.to_string()));
        }

        debug!(
            "Opened package: {} parts, {} overrides, {} defaults",
            package.parts.len(),
            package.overrides.len(),
            package.defaults.len()
        );
        Ok(package)
    }

    /// Raw data of a part
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    /// Whether a part was skipped for exceeding the size limit
    pub fn is_oversized(&self, name: &str) -> bool {
        self.oversized.contains(name)
    }

    /// Names of the parts skipped for exceeding the size limit
    pub fn oversized_parts(&self) -> impl Iterator<Item = &str> {
        self.oversized.iter().map(String::as_str)
    }

    /// Names of every part, sorted
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// Content type string of a part: its override, else the default for its extension
    pub fn content_type_str(&self, name: &str) -> Option<&str> {
        if let Some(ct) = self.overrides.get(name) {
            return Some(ct);
        }
        let ext = name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase())?;
        self.defaults.get(&ext).map(String::as_str)
    }

    pub fn content_type(&self, name: &str) -> Option<ContentType> {
        self.content_type_str(name).map(ContentType::from_string)
    }

    /// Relationships of a source part (`""` for the package itself)
    ///
    /// Returns an empty table when the part has no relationship manifest.
    pub fn relationships(&self, source_part: &str) -> Result<RelationshipTable, XmlError> {
        match self.parts.get(&relationships_part_name(source_part)) {
            Some(data) => parse_relationships(source_part, data),
            None => Ok(RelationshipTable::new()),
        }
    }
}

/// Parses a relationship manifest; internal targets are made absolute
pub fn parse_relationships(source_part: &str, data: &[u8]) -> Result<RelationshipTable, XmlError> {
    let root = XmlElement::parse(data)?;
    let mut table = RelationshipTable::new();
    for entry in root.elements().filter(|e| e.local_name() == "Relationship") {
        let (Some(id), Some(rel_type), Some(target)) = (entry.attr("Id"), entry.attr("Type"), entry.attr("Target"))
        else {
            continue;
        };
        let mode = match entry.attr("TargetMode") {
            Some("External") => TargetMode::External,
            _ => TargetMode::Internal,
        };
        let target = match mode {
            TargetMode::Internal => resolve_target(source_part, target),
            TargetMode::External => target.to_string(),
        };
        table.insert(Relationship {
            id: id.to_string(),
            rel_type: RelationshipType::from_string(rel_type),
            target,
            mode,
        });
    }
    Ok(table)
}

/// Writes a relationship manifest; internal targets are made relative to the source
pub fn relationships_xml<'a>(source_part: &str, relationships: impl IntoIterator<Item = &'a Relationship>) -> Vec<u8> {
    let mut xml = String::with_capacity(1024);
    xml.push_str(XML_DECLARATION);
    xml.push_str("\r\n");
    xml.push_str(&format!(r#"<Relationships xmlns="{}">"#, NS_PACKAGE_RELATIONSHIPS));
    for rel in relationships {
        let target = match rel.mode {
            TargetMode::Internal => relative_target(source_part, &rel.target),
            TargetMode::External => rel.target.clone(),
        };
        xml.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}""#,
            escape_attr(&rel.id),
            escape_attr(&rel.rel_type.uri()),
            escape_attr(&target)
        ));
        if rel.mode == TargetMode::External {
            xml.push_str(r#" TargetMode="External""#);
        }
        xml.push_str("/>");
    }
    xml.push_str("</Relationships>");
    xml.into_bytes()
}

/// Collects parts and writes them as a deterministic ZIP archive
///
/// `[Content_Types].xml` comes first, `_rels/.rels` second, then every other
/// part sorted by name. Timestamps are fixed.
#[derive(Debug, Default)]
pub struct PackageWriter {
    parts: BTreeMap<String, Vec<u8>>,
    defaults: BTreeMap<String, String>,
    overrides: BTreeMap<String, String>,
}

impl PackageWriter {
    pub fn new() -> Self {
        let mut writer = PackageWriter::default();
        writer.add_default("rels", ContentType::Relationships.as_str());
        writer.add_default("xml", ContentType::Xml.as_str());
        writer
    }

    /// Registers a default content type for an extension
    pub fn add_default(&mut self, extension: &str, content_type: &str) {
        self.defaults
            .insert(extension.to_ascii_lowercase(), content_type.to_string());
    }

    /// Adds a part with an override content type
    pub fn add_part(&mut self, name: &str, content_type: &str, data: Vec<u8>) {
        self.overrides.insert(name.to_string(), content_type.to_string());
        self.parts.insert(name.to_string(), data);
    }

    /// Adds a binary part whose content type is registered by extension
    ///
    /// Falls back to an override when the extension already maps to another type.
    pub fn add_media(&mut self, name: &str, content_type: &str, data: Vec<u8>) {
        let ext = name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
        match ext {
            Some(ext) if self.defaults.get(&ext).map_or(true, |ct| ct == content_type) => {
                self.defaults.insert(ext, content_type.to_string());
                self.parts.insert(name.to_string(), data);
            }
            _ => self.add_part(name, content_type, data),
        }
    }

    /// Adds a relationship manifest part
    pub fn add_relationships(&mut self, name: &str, data: Vec<u8>) {
        self.parts.insert(name.to_string(), data);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    fn content_types_xml(&self) -> Vec<u8> {
        let mut xml = String::with_capacity(2048);
        xml.push_str(XML_DECLARATION);
        xml.push_str("\r\n");
        xml.push_str(&format!(r#"<Types xmlns="{}">"#, NS_CONTENT_TYPES));
        for (ext, ct) in &self.defaults {
            xml.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                escape_attr(ext),
                escape_attr(ct)
            ));
        }
        for (name, ct) in &self.overrides {
            xml.push_str(&format!(
                r#"<Override PartName="/{}" ContentType="{}"/>"#,
                escape_attr(name),
                escape_attr(ct)
            ));
        }
        xml.push_str("</Types>");
        xml.into_bytes()
    }

    /// Writes the archive
    pub fn finish(self, options: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
        let method = match options.compression {
            Compression::Stored => zip::CompressionMethod::Stored,
            Compression::Deflated => zip::CompressionMethod::Deflated,
        };
        let mut zip_options = FileOptions::default()
            .compression_method(method)
            .last_modified_time(zip::DateTime::default());
        if options.compression == Compression::Deflated {
            zip_options = zip_options.compression_level(options.compression_level);
        }

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        zip.start_file(CONTENT_TYPES_PART, zip_options)?;
        zip.write_all(&self.content_types_xml())?;

        if let Some(root_rels) = self.parts.get(ROOT_RELATIONSHIPS_PART) {
            zip.start_file(ROOT_RELATIONSHIPS_PART, zip_options)?;
            zip.write_all(root_rels)?;
        }

        for (name, data) in &self.parts {
            if name == ROOT_RELATIONSHIPS_PART || name == CONTENT_TYPES_PART {
                continue;
            }
            zip.start_file(name.as_str(), zip_options)?;
            zip.write_all(data)?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}
