//! Exclusive XML canonicalization (`http://www.w3.org/2001/10/xml-exc-c14n#`,
//! without comments) over [`XmlElement`] trees.
//!
//! A subtree is canonicalized in the context of the document that contains it.
//! It is first projected into a standalone document in which every element
//! declares exactly the namespaces exclusive c14n renders for it, and from which
//! the excluded element (the enveloped `Signature`) is left out. The projection is
//! then run through `xml_canonicalization`, which owns the canonical form itself:
//! attribute order, character escaping and empty-element expansion.
//!
//! Line-ending and attribute-value normalization happen when a document is loaded
//! (see [`super::SecureXmlLoader`]), so the tree already holds what a conforming
//! parser would report.

use super::tree::{XmlElement, XmlNode};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use xml_canonicalization::Canonicalizer;

/// Algorithm URI for exclusive canonicalization without comments
pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

type NamespaceMap = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum C14nError {
    #[error("element is not part of the document")]
    NotInDocument,

    #[error("canonicalization failed: {0}")]
    Failed(String),
}

/// Canonicalization parameters
#[derive(Debug, Default, Clone, Copy)]
pub struct C14nOptions<'a> {
    /// Element omitted from the output, typically the enveloped `Signature`
    pub exclude: Option<&'a XmlElement>,
    /// `InclusiveNamespaces PrefixList`; `#default` names the default namespace
    pub inclusive_prefixes: &'a [String],
}

/// Canonicalize `target`, which must be `document` itself or one of its descendants
pub fn canonicalize(
    document: &XmlElement,
    target: &XmlElement,
    options: &C14nOptions<'_>,
) -> Result<String, C14nError> {
    let inherited =
        inherited_scope(document, target, &NamespaceMap::new()).ok_or(C14nError::NotInDocument)?;
    let mut projected = String::new();
    project(target, &inherited, &NamespaceMap::new(), options, &mut projected);
    canonical_form(&projected)
}

fn canonical_form(xml: &str) -> Result<String, C14nError> {
    let mut output = Vec::new();
    Canonicalizer::read_from_str(xml)
        .write_to_writer(&mut output)
        .canonicalize(false)
        .map_err(|e| C14nError::Failed(e.to_string()))?;

    String::from_utf8(output).map_err(|e| C14nError::Failed(format!("invalid UTF-8: {e}")))
}

/// Namespace bindings in scope at the parent of `target`
fn inherited_scope(
    node: &XmlElement,
    target: &XmlElement,
    inherited: &NamespaceMap,
) -> Option<NamespaceMap> {
    if std::ptr::eq(node, target) {
        return Some(inherited.clone());
    }
    let mut scope = inherited.clone();
    declare(node, &mut scope);
    node.child_elements()
        .find_map(|child| inherited_scope(child, target, &scope))
}

fn declare(element: &XmlElement, scope: &mut NamespaceMap) {
    for (prefix, uri) in element.namespace_declarations() {
        scope.insert(prefix.to_string(), uri.to_string());
    }
}

fn is_namespace_declaration(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

/// Prefixes exclusive c14n renders on `element`: its own, those of its qualified
/// attributes, and the inclusive prefix list
fn visibly_used<'a>(
    element: &'a XmlElement,
    scope: &NamespaceMap,
    inclusive_prefixes: &'a [String],
) -> BTreeSet<&'a str> {
    let mut used = BTreeSet::new();
    used.insert(element.prefix().unwrap_or(""));
    for attr in &element.attributes {
        if is_namespace_declaration(&attr.name) {
            continue;
        }
        if let Some((prefix, _)) = attr.name.split_once(':') {
            if prefix != "xml" {
                used.insert(prefix);
            }
        }
    }
    for prefix in inclusive_prefixes {
        let prefix = if prefix == "#default" { "" } else { prefix.as_str() };
        if scope.contains_key(prefix) {
            used.insert(prefix);
        }
    }
    used
}

fn project(
    element: &XmlElement,
    inherited: &NamespaceMap,
    rendered: &NamespaceMap,
    options: &C14nOptions<'_>,
    out: &mut String,
) {
    if options
        .exclude
        .is_some_and(|excluded| std::ptr::eq(excluded, element))
    {
        return;
    }

    let mut scope = inherited.clone();
    declare(element, &mut scope);

    let mut now_rendered = rendered.clone();
    out.push('<');
    out.push_str(&element.name);
    for prefix in visibly_used(element, &scope, options.inclusive_prefixes) {
        let uri = scope.get(prefix).map(String::as_str).unwrap_or("");
        let previous = rendered.get(prefix).map(String::as_str);
        if prefix.is_empty() {
            if uri == previous.unwrap_or("") {
                continue;
            }
            out.push_str(" xmlns=\"");
        } else {
            if uri.is_empty() || previous == Some(uri) {
                continue;
            }
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        escape_attribute(uri, out);
        out.push('"');
        now_rendered.insert(prefix.to_string(), uri.to_string());
    }
    for attr in element
        .attributes
        .iter()
        .filter(|a| !is_namespace_declaration(&a.name))
    {
        out.push(' ');
        out.push_str(&attr.name);
        out.push_str("=\"");
        escape_attribute(&attr.value, out);
        out.push('"');
    }
    out.push('>');

    for child in &element.children {
        match child {
            XmlNode::Element(el) => project(el, &scope, &now_rendered, options, out),
            XmlNode::Text(text) => escape_text(text, out),
        }
    }

    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

// Whitespace that a parser would otherwise normalize travels as character
// references so the projection re-parses to the same values.

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}
