//! Owned XML element tree.
//!
//! Inbound documents are loaded into this tree by [`super::SecureXmlLoader`]; outbound
//! messages are assembled with the builder-style methods and serialized with
//! [`XmlElement::to_document`]. Element and attribute names are kept exactly as written
//! (`prefix:local`), so namespace resolution is done by walking declarations.

use quick_xml::escape::escape;
use std::borrow::Cow;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

/// A single attribute, name as written (including any prefix)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub name: String,
    pub value: String,
}

/// Child node of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// XML element with attributes in document order and mixed children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Namespace prefix of the element name, if any
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    /// Attribute value by exact name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(XmlAttribute { name, value }),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    #[must_use]
    pub fn with_optional_attr(self, name: impl Into<String>, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.with_attr(name, value),
            None => self,
        }
    }

    #[must_use]
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        })
    }

    /// First direct child element with the given local name
    pub fn child(&self, local_name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|el| el.local_name() == local_name)
    }

    pub fn child_mut(&mut self, local_name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(el) if el.local_name() == local_name => Some(el),
            _ => None,
        })
    }

    pub fn children_named<'a>(
        &'a self,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.child_elements()
            .filter(move |el| el.local_name() == local_name)
    }

    /// Concatenated direct text content
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Namespace declarations on this element as `(prefix, uri)`; the default
    /// namespace has an empty prefix.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|a| {
            if a.name == "xmlns" {
                Some(("", a.value.as_str()))
            } else {
                a.name
                    .strip_prefix("xmlns:")
                    .map(|prefix| (prefix, a.value.as_str()))
            }
        })
    }

    /// This element and every descendant element, in document order
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        self.collect_descendants(&mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, out: &mut Vec<&'a XmlElement>) {
        out.push(self);
        for child in self.child_elements() {
            child.collect_descendants(out);
        }
    }

    /// Element carrying `ID="<id>"` (this element or a descendant)
    pub fn find_by_id(&self, id: &str) -> Option<&XmlElement> {
        if self.attr("ID") == Some(id) {
            return Some(self);
        }
        self.child_elements().find_map(|child| child.find_by_id(id))
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut XmlElement> {
        if self.attr("ID") == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(el) => el.find_by_id_mut(id),
            XmlNode::Text(_) => None,
        })
    }

    /// Insert `new_child` directly after the first child element named `local_name`.
    /// Returns false when no such child exists.
    pub fn insert_after(&mut self, local_name: &str, new_child: XmlElement) -> bool {
        let position = self.children.iter().position(
            |node| matches!(node, XmlNode::Element(el) if el.local_name() == local_name),
        );
        match position {
            Some(pos) => {
                self.children.insert(pos + 1, XmlNode::Element(new_child));
                true
            }
            None => false,
        }
    }

    /// Replace the first child element named `local_name`, returning the old element
    pub fn replace_child(&mut self, local_name: &str, new_child: XmlElement) -> Option<XmlElement> {
        let slot = self.children.iter_mut().find(
            |node| matches!(node, XmlNode::Element(el) if el.local_name() == local_name),
        )?;
        match std::mem::replace(slot, XmlNode::Element(new_child)) {
            XmlNode::Element(old) => Some(old),
            XmlNode::Text(_) => None,
        }
    }

    /// Serialize without an XML declaration
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    /// Serialize as a standalone document with an XML declaration
    pub fn to_document(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attributes {
            out.push(' ');
            out.push_str(&attr.name);
            out.push_str("=\"");
            out.push_str(&escape_attribute(&attr.value));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlNode::Element(el) => el.write_to(out),
                XmlNode::Text(text) => out.push_str(&escape_text(text)),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

// Whitespace a parser would normalize away is written as character references,
// keeping serialized values identical to the ones that were signed

fn escape_attribute(value: &str) -> Cow<'_, str> {
    let escaped = escape(value);
    if escaped.contains(['\t', '\n', '\r']) {
        Cow::Owned(
            escaped
                .replace('\t', "&#x9;")
                .replace('\n', "&#xA;")
                .replace('\r', "&#xD;"),
        )
    } else {
        escaped
    }
}

fn escape_text(text: &str) -> Cow<'_, str> {
    let escaped = escape(text);
    if escaped.contains('\r') {
        Cow::Owned(escaped.replace('\r', "&#xD;"))
    } else {
        escaped
    }
}
