//! OOXML (Office Open XML) package codec for Word documents (.docx)
//!
//! This module implements the OPC (Open Packaging Conventions) container and the
//! WordprocessingML parts needed to turn a `.docx` archive into a typed
//! [`Document`](crate::model::Document) and back.
//!
//! # Example
//!
//! ```no_run
//! use folio_core::ooxml::{decode, encode};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file_data = std::fs::read("document.docx")?;
//!     let decoded = decode(&file_data)?;
//!     for warning in &decoded.warnings {
//!         eprintln!("{}", warning);
//!     }
//!     println!("Extracted text: {}", decoded.document.text());
//!     std::fs::write("copy.docx", encode(&decoded.document)?)?;
//!     Ok(())
//! }
//! ```

mod body;
mod body_writer;
mod document;
mod error;
pub mod opc;
mod parts;
pub mod properties;
mod relmap;
mod serializer;
pub mod types;
pub mod xml;

pub use body::read_fragment;
pub use body_writer::{story_attributes, StoryWriter};
pub use document::{decode, decode_with, Decoded};
pub use error::{DecodeError, EncodeError};
pub use parts::{NS_DRAWING, NS_WORDPROCESSING};
pub use serializer::{encode, encode_with};
pub use types::{ContentType, Relationship, RelationshipTable, RelationshipType, TargetMode};
pub use xml::{XmlElement, XmlError, XmlNode};
