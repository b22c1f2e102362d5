//! Minimal XML element tree
//!
//! Parts are read into an owned element tree with `quick-xml` so that elements the
//! decoder does not understand can be carried through unchanged and written back at
//! the same position. Names are kept qualified (`w:p`), attributes keep their order.

use std::fmt::Write as _;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// Namespace of relationship-id attributes (`r:id`, `r:embed`, ...)
pub const NS_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// XML declaration written at the top of every generated part
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Error raised while reading XML
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XmlError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },
    #[error("XML document has no root element")]
    NoRoot,
    #[error("XML document ended inside <{0}>")]
    Unclosed(String),
}

/// A node inside an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An XML element with qualified name, ordered attributes and children
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Creates an empty element
    pub fn new(name: impl Into<String>) -> Self {
        XmlElement {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder-style child element
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Builder-style text child
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Parses a complete XML document and returns its root element
    pub fn parse(data: &[u8]) -> Result<XmlElement, XmlError> {
        let mut reader = Reader::from_reader(data);
        reader.config_mut().trim_text(false);

        let mut buf = Vec::with_capacity(1024);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| XmlError::Syntax {
                position: reader.buffer_position() as u64,
                message: e.to_string(),
            })?;
            match event {
                Event::Start(start) => {
                    stack.push(element_from_start(&start, reader.buffer_position() as u64)?);
                }
                Event::Empty(start) => {
                    let element = element_from_start(&start, reader.buffer_position() as u64)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or(XmlError::Syntax {
                        position: reader.buffer_position() as u64,
                        message: "unexpected closing tag".to_string(),
                    })?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        let value = text.unescape().map_err(|e| XmlError::Syntax {
                            position: reader.buffer_position() as u64,
                            message: e.to_string(),
                        })?;
                        if !value.is_empty() {
                            parent.children.push(XmlNode::Text(value.into_owned()));
                        }
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        parent.children.push(XmlNode::Text(value));
                    }
                }
                Event::Eof => break,
                // declarations, comments, processing instructions
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.pop() {
            return Err(XmlError::Unclosed(open.name));
        }
        root.ok_or(XmlError::NoRoot)
    }

    /// Parses a fragment that may hold several sibling elements
    pub fn parse_fragment(data: &str, namespaces: &[(String, String)]) -> Result<Vec<XmlElement>, XmlError> {
        let mut wrapper = String::with_capacity(data.len() + 256);
        wrapper.push_str("<fragment");
        for (key, value) in namespaces {
            if key.starts_with("xmlns") {
                let _ = write!(wrapper, " {}=\"{}\"", key, escape_attr(value));
            }
        }
        wrapper.push('>');
        wrapper.push_str(data);
        wrapper.push_str("</fragment>");
        let root = XmlElement::parse(wrapper.as_bytes())?;
        Ok(root.into_child_elements())
    }

    /// Local part of the element name (`p` for `w:p`)
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Namespace prefix of the element name, if any
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Looks up an attribute by qualified name
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Looks up an attribute by local name, ignoring the prefix
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| local_part(k) == local)
            .map(|(_, v)| v.as_str())
    }

    /// Sets or replaces an attribute, keeping its original position
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Iterates over child elements
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// Iterates mutably over child elements
    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given local name
    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.local_name() == local)
    }

    /// Consumes the element and returns its child elements
    pub fn into_child_elements(self) -> Vec<XmlElement> {
        self.children
            .into_iter()
            .filter_map(|node| match node {
                XmlNode::Element(e) => Some(e),
                XmlNode::Text(_) => None,
            })
            .collect()
    }

    /// Concatenated text of direct text children
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let XmlNode::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    /// Rewrites every relationship-id attribute in this subtree
    ///
    /// `prefixes` are the prefixes bound to the relationships namespace. The callback
    /// returns the replacement id, or `None` to keep the value.
    pub fn rewrite_relationship_ids<F>(&mut self, prefixes: &[String], remap: &mut F)
    where
        F: FnMut(&str) -> Option<String>,
    {
        for (key, value) in self.attributes.iter_mut() {
            if let Some((prefix, _)) = key.split_once(':') {
                if prefixes.iter().any(|p| p == prefix) {
                    if let Some(new_id) = remap(value) {
                        *value = new_id;
                    }
                }
            }
        }
        for child in self.elements_mut() {
            child.rewrite_relationship_ids(prefixes, remap);
        }
    }

    /// Collects every relationship-id attribute value in this subtree
    pub fn collect_relationship_ids(&self, prefixes: &[String], out: &mut Vec<String>) {
        for (key, value) in &self.attributes {
            if let Some((prefix, _)) = key.split_once(':') {
                if prefixes.iter().any(|p| p == prefix) {
                    out.push(value.clone());
                }
            }
        }
        for child in self.elements() {
            child.collect_relationship_ids(prefixes, out);
        }
    }

    /// Serializes this element (without declaration)
    pub fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlNode::Element(e) => e.write_to(out),
                XmlNode::Text(t) => out.push_str(&escape_text(t)),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Serializes as a standalone part with the standard declaration
    pub fn to_document_bytes(&self) -> Vec<u8> {
        let mut out = String::with_capacity(4096);
        out.push_str(XML_DECLARATION);
        out.push_str("\r\n");
        self.write_to(&mut out);
        out.into_bytes()
    }

    /// Serializes this element to a string
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }
}

/// Prefixes bound to the relationships namespace by `xmlns:*` attributes
pub fn relationship_prefixes(attributes: &[(String, String)]) -> Vec<String> {
    let mut prefixes: Vec<String> = attributes
        .iter()
        .filter(|(_, v)| v == NS_RELATIONSHIPS)
        .filter_map(|(k, _)| k.strip_prefix("xmlns:").map(str::to_string))
        .collect();
    if prefixes.is_empty() {
        prefixes.push("r".to_string());
    }
    prefixes
}

/// Local part of a qualified name
pub fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Escapes character data
pub fn escape_text(text: &str) -> std::borrow::Cow<'_, str> {
    quick_xml::escape::partial_escape(text)
}

/// Escapes attribute values
pub fn escape_attr(text: &str) -> std::borrow::Cow<'_, str> {
    quick_xml::escape::escape(text)
}

fn element_from_start(start: &BytesStart<'_>, position: u64) -> Result<XmlElement, XmlError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| XmlError::Syntax {
            position,
            message: e.to_string(),
        })?
        .to_string();
    let mut element = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Syntax {
            position,
            message: e.to_string(),
        })?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| XmlError::Syntax {
                position,
                message: e.to_string(),
            })?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Syntax {
                position,
                message: e.to_string(),
            })?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Parses an OOXML on/off value (`w:val` of toggle properties)
pub fn parse_on_off(value: Option<&str>) -> bool {
    !matches!(value, Some("0") | Some("false") | Some("off") | Some("none"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_elements() {
        let xml = br#"<?xml version="1.0"?><w:p xmlns:w="urn:w"><w:r><w:t xml:space="preserve"> a &amp; b </w:t></w:r><w:bookmarkEnd w:id="1"/></w:p>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.name, "w:p");
        assert_eq!(root.local_name(), "p");
        let run = root.child("r").unwrap();
        let text = run.child("t").unwrap();
        assert_eq!(text.text(), " a & b ");
        assert_eq!(text.attr("xml:space"), Some("preserve"));
        assert_eq!(root.child("bookmarkEnd").unwrap().attr_local("id"), Some("1"));
    }

    #[test]
    fn test_write_round_trip() {
        let xml = r#"<w:p a="1 &quot;q&quot;"><w:t>x &lt; y</w:t><w:br/></w:p>"#;
        let root = XmlElement::parse(xml.as_bytes()).unwrap();
        assert_eq!(root.to_xml_string(), xml);
    }

    #[test]
    fn test_unclosed_document_is_error() {
        let result = XmlElement::parse(b"<a><b></b>");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_document_has_no_root() {
        assert_eq!(XmlElement::parse(b"").unwrap_err(), XmlError::NoRoot);
    }

    #[test]
    fn test_rewrite_relationship_ids() {
        let mut el = XmlElement::new("w:drawing")
            .with_child(XmlElement::new("a:blip").with_attr("r:embed", "rId7"));
        el.rewrite_relationship_ids(&["r".to_string()], &mut |id| {
            (id == "rId7").then(|| "rId1".to_string())
        });
        let mut ids = Vec::new();
        el.collect_relationship_ids(&["r".to_string()], &mut ids);
        assert_eq!(ids, vec!["rId1".to_string()]);
    }

    #[test]
    fn test_parse_fragment() {
        let ns = vec![("xmlns:w".to_string(), "urn:w".to_string())];
        let elements = XmlElement::parse_fragment("<w:p/><w:p><w:r/></w:p>", &ns).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].elements().count(), 1);
    }

    #[test]
    fn test_on_off_values() {
        assert!(parse_on_off(None));
        assert!(parse_on_off(Some("1")));
        assert!(parse_on_off(Some("true")));
        assert!(!parse_on_off(Some("0")));
        assert!(!parse_on_off(Some("false")));
    }
}
