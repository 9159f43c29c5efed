//! Namespace Resolution
//!
//! Resolves prefixes against the `xmlns` declarations on an element and its
//! ancestors, and validates a subtree against Namespaces in XML 1.0.

use super::document::XmlDocument;
use super::node::{split_qname, NodeId};
use crate::core::tokenizer::MarkupError;
use std::collections::HashSet;

/// Well-known namespace URIs
pub mod ns {
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";
}

/// Namespace binding (prefix -> URI); `prefix` is None for the default namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceBinding {
    pub prefix: Option<String>,
    pub uri: String,
}

/// Resolve a prefix (None for the default namespace) in scope at `element`
///
/// An empty default declaration (`xmlns=""`) resolves to no namespace.
pub fn lookup_namespace<'d>(doc: &'d XmlDocument, element: NodeId, prefix: Option<&str>) -> Option<&'d str> {
    for id in doc.ancestors_or_self(element) {
        let Some(data) = doc.element(id) else { continue };
        for attr in &data.attributes {
            if attr.namespace_declaration() == Some(prefix) {
                return (!attr.value.is_empty()).then_some(attr.value.as_str());
            }
        }
    }
    if prefix == Some("xml") {
        return Some(ns::XML);
    }
    None
}

/// Namespace URI of an element's own name
pub fn element_namespace(doc: &XmlDocument, element: NodeId) -> Option<&str> {
    let prefix = doc.element(element).and_then(|e| e.prefix());
    lookup_namespace(doc, element, prefix)
}

/// All bindings in scope at `element`
///
/// Declarations on the element come first, then each ancestor's in turn;
/// within an element they keep document order. Shadowed prefixes and
/// `xmlns=""` are left out, as is the implicit `xml` binding.
pub fn in_scope_namespaces(doc: &XmlDocument, element: NodeId) -> Vec<NamespaceBinding> {
    let mut seen: HashSet<Option<&str>> = HashSet::new();
    let mut bindings = Vec::new();
    for id in doc.ancestors_or_self(element) {
        let Some(data) = doc.element(id) else { continue };
        for attr in &data.attributes {
            let Some(prefix) = attr.namespace_declaration() else { continue };
            if !seen.insert(prefix) || attr.value.is_empty() {
                continue;
            }
            bindings.push(NamespaceBinding {
                prefix: prefix.map(str::to_string),
                uri: attr.value.clone(),
            });
        }
    }
    bindings
}

/// Check namespace well-formedness of the subtree at `root`
///
/// Prefixes may be bound anywhere above `root`, so a subtree linked into a
/// document is checked in its final position.
pub fn check_namespaces(doc: &XmlDocument, root: NodeId) -> Result<(), MarkupError> {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(data) = doc.element(id) else { continue };

        for attr in &data.attributes {
            if let Some(prefix) = attr.namespace_declaration() {
                check_declaration(prefix, &attr.value)?;
            }
        }

        if data.prefix() == Some("xmlns") {
            return Err(MarkupError::new(format!("Element <{}> uses the reserved xmlns prefix", data.name), 0));
        }
        if let Some(prefix) = data.prefix() {
            if lookup_namespace(doc, id, Some(prefix)).is_none() {
                return Err(MarkupError::new(format!("Unbound prefix '{}' on element <{}>", prefix, data.name), 0));
            }
        }

        let mut expanded: HashSet<(Option<&str>, &str)> = HashSet::new();
        for attr in &data.attributes {
            if attr.namespace_declaration().is_some() {
                continue;
            }
            let (prefix, local) = split_qname(&attr.name);
            let uri = match prefix {
                Some(p) => Some(lookup_namespace(doc, id, Some(p)).ok_or_else(|| {
                    MarkupError::new(format!("Unbound prefix '{}' on attribute {}", p, attr.name), 0)
                })?),
                None => None,
            };
            if !expanded.insert((uri, local)) {
                return Err(MarkupError::new(format!("Duplicate attribute {} on <{}>", attr.name, data.name), 0));
            }
        }

        stack.extend(doc.element_children(id));
    }
    Ok(())
}

fn check_declaration(prefix: Option<&str>, uri: &str) -> Result<(), MarkupError> {
    let invalid = match prefix {
        Some("xmlns") => true,
        Some("xml") => uri != ns::XML,
        Some(_) => uri.is_empty() || uri == ns::XML || uri == ns::XMLNS,
        None => uri == ns::XML || uri == ns::XMLNS,
    };
    if invalid {
        let name = prefix.map(|p| format!("xmlns:{}", p)).unwrap_or_else(|| "xmlns".to_string());
        return Err(MarkupError::new(format!("Invalid namespace declaration {}=\"{}\"", name, uri), 0));
    }
    Ok(())
}
