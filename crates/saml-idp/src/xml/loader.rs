//! Hardened loader for untrusted XML.
//!
//! DOCTYPE declarations (and with them every internal or external entity) are
//! rejected outright, unknown entity references fail, input size and nesting depth are
//! bounded, comments and processing instructions are dropped.
//!
//! Whitespace is otherwise kept, with the normalization XML 1.0 requires of every
//! parser applied: line breaks become `\n` (section 2.11) and literal whitespace in
//! attribute values becomes a space (section 3.3.3). Signatures computed by other
//! XML-DSig stacks are taken over exactly those values.

use super::tree::{XmlAttribute, XmlElement, XmlNode};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use thiserror::Error;

/// Maximum accepted document size (1 MiB)
pub const MAX_DOCUMENT_SIZE: usize = 1024 * 1024;

/// Maximum element nesting depth
const MAX_DEPTH: usize = 64;

/// Reasons a document was refused.
///
/// `Display` carries diagnostic detail for server-side logs. Callers facing the
/// network must use [`XmlLoadError::external_message`] instead.
#[derive(Debug, Error)]
pub enum XmlLoadError {
    #[error("document is empty")]
    Empty,

    #[error("document is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("prohibited construct: {0}")]
    Prohibited(String),

    #[error("malformed document: {0}")]
    Malformed(String),
}

impl XmlLoadError {
    /// Message safe to return to a remote party
    pub fn external_message(&self) -> &'static str {
        match self {
            XmlLoadError::TooLarge { .. } => "exceeds maximum allowed size",
            XmlLoadError::Prohibited(_) => "document contained prohibited constructs",
            XmlLoadError::Empty | XmlLoadError::Malformed(_) => "document could not be parsed",
        }
    }
}

/// Loader for inbound SAML documents
#[derive(Debug, Clone)]
pub struct SecureXmlLoader {
    max_size: usize,
    max_depth: usize,
}

impl Default for SecureXmlLoader {
    fn default() -> Self {
        Self {
            max_size: MAX_DOCUMENT_SIZE,
            max_depth: MAX_DEPTH,
        }
    }
}

impl SecureXmlLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Load `xml` into an element tree, returning the root element
    pub fn load(&self, xml: &str) -> Result<XmlElement, XmlLoadError> {
        let result = self.parse(xml);
        if let Err(err) = &result {
            tracing::warn!(error = %err, "Rejected inbound XML document");
        }
        result
    }

    fn parse(&self, xml: &str) -> Result<XmlElement, XmlLoadError> {
        if xml.trim().is_empty() {
            return Err(XmlLoadError::Empty);
        }
        if xml.len() > self.max_size {
            return Err(XmlLoadError::TooLarge {
                size: xml.len(),
                limit: self.max_size,
            });
        }

        let xml = normalize_line_endings(xml);
        let mut reader = Reader::from_str(&xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if root.is_some() {
                        return Err(XmlLoadError::Malformed(
                            "content after root element".to_string(),
                        ));
                    }
                    if stack.len() >= self.max_depth {
                        return Err(XmlLoadError::Prohibited(format!(
                            "element nesting deeper than {}",
                            self.max_depth
                        )));
                    }
                    stack.push(element_from(&e)?);
                }
                Ok(Event::Empty(e)) => {
                    let element = element_from(&e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack.pop().ok_or_else(|| {
                        XmlLoadError::Malformed("unexpected closing tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| XmlLoadError::Prohibited(format!("entity reference: {e}")))?;
                    push_text(&mut stack, text.into_owned())?;
                }
                Ok(Event::CData(c)) => {
                    let text = String::from_utf8(c.into_inner().into_owned())
                        .map_err(|e| XmlLoadError::Malformed(format!("invalid UTF-8: {e}")))?;
                    push_text(&mut stack, text)?;
                }
                Ok(Event::DocType(_)) => {
                    return Err(XmlLoadError::Prohibited("DOCTYPE declaration".to_string()));
                }
                Ok(Event::Decl(_) | Event::Comment(_) | Event::PI(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => return Err(XmlLoadError::Malformed(e.to_string())),
            }
        }

        if !stack.is_empty() {
            return Err(XmlLoadError::Malformed("unclosed element".to_string()));
        }
        root.ok_or_else(|| XmlLoadError::Malformed("no root element".to_string()))
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement, XmlLoadError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| XmlLoadError::Malformed(format!("invalid element name: {e}")))?
        .to_string();
    let mut element = XmlElement::new(name);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlLoadError::Malformed(format!("attribute: {e}")))?;
        let name = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| XmlLoadError::Malformed(format!("invalid attribute name: {e}")))?
            .to_string();
        let raw = std::str::from_utf8(&attr.value)
            .map_err(|e| XmlLoadError::Malformed(format!("invalid attribute value: {e}")))?;
        // Only literal whitespace is normalized; character references keep theirs
        let raw = raw.replace(['\t', '\n', '\r'], " ");
        let value = unescape(&raw)
            .map_err(|e| XmlLoadError::Prohibited(format!("entity reference: {e}")))?
            .into_owned();
        element.attributes.push(XmlAttribute { name, value });
    }
    Ok(element)
}

/// `\r\n` and lone `\r` become `\n`
fn normalize_line_endings(xml: &str) -> Cow<'_, str> {
    if xml.contains('\r') {
        Cow::Owned(xml.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(xml)
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), XmlLoadError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Element(element));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XmlLoadError::Malformed(
            "multiple root elements".to_string(),
        )),
    }
}

fn push_text(stack: &mut [XmlElement], text: String) -> Result<(), XmlLoadError> {
    match stack.last_mut() {
        Some(parent) => {
            if let Some(XmlNode::Text(existing)) = parent.children.last_mut() {
                existing.push_str(&text);
            } else {
                parent.children.push(XmlNode::Text(text));
            }
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlLoadError::Malformed(
            "text outside root element".to_string(),
        )),
    }
}
