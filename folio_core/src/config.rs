//! Configuration for decoding, encoding, templating and editing sessions

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::find::SearchOptions;
use crate::history::DEFAULT_MAX_HISTORY_SIZE;

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_true() -> bool {
    true
}

fn default_max_part_size() -> u64 {
    // 256 MiB
    256 * 1024 * 1024
}

/// Options for [`crate::ooxml::decode_with`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Keep unknown elements as opaque nodes (default: true)
    #[serde(default = "default_true")]
    pub preserve_unknown: bool,
    /// Parts larger than this many bytes are treated as malformed
    #[serde(default = "default_max_part_size")]
    pub max_part_size: u64,
    /// Check table span and merge invariants (default: true)
    #[serde(default = "default_true")]
    pub check_tables: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            preserve_unknown: true,
            max_part_size: default_max_part_size(),
            check_tables: true,
        }
    }
}

/// ZIP compression of written parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Stored,
    Deflated,
}

/// Options for [`crate::ooxml::encode_with`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeOptions {
    #[serde(default = "default_compression")]
    pub compression: Compression,
    /// Deflate level 0-9; `None` uses the library default
    #[serde(default = "default_compression_level")]
    pub compression_level: Option<i32>,
}

fn default_compression() -> Compression {
    Compression::Deflated
}

fn default_compression_level() -> Option<i32> {
    Some(9)
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            compression: default_compression(),
            compression_level: default_compression_level(),
        }
    }
}

/// Options for template substitution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateOptions {
    /// Convert `\n` in values to line breaks (default: true)
    #[serde(default = "default_true")]
    pub linebreaks: bool,
    /// Allow `{@name}` to insert WordprocessingML fragments (default: true)
    #[serde(default = "default_true")]
    pub raw_xml: bool,
    /// Warn about names with no value (default: true)
    #[serde(default = "default_true")]
    pub warn_unresolved: bool,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        TemplateOptions {
            linebreaks: true,
            raw_xml: true,
            warn_unresolved: true,
        }
    }
}

fn default_history_size() -> usize {
    DEFAULT_MAX_HISTORY_SIZE
}

/// All options of an editing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolioConfig {
    #[serde(default)]
    pub decode: DecodeOptions,
    #[serde(default)]
    pub encode: EncodeOptions,
    #[serde(default)]
    pub template: TemplateOptions,
    /// Default flags for find and replace; `query` is ignored
    #[serde(default)]
    pub search: SearchOptions,
    /// Number of undo snapshots kept
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl Default for FolioConfig {
    fn default() -> Self {
        FolioConfig {
            decode: DecodeOptions::default(),
            encode: EncodeOptions::default(),
            template: TemplateOptions::default(),
            search: SearchOptions::default(),
            history_size: DEFAULT_MAX_HISTORY_SIZE,
        }
    }
}

impl FolioConfig {
    /// Parses configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
