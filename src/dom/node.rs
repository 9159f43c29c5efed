//! XML Node representation
//!
//! Uses NodeId (u32) for compact node references into the document arena.
//! Leaf nodes keep their exact source text; elements keep the source of
//! their start and end tags until an edit invalidates them.

use crate::core::entities::escape_attribute;

/// Compact node identifier (index into arena)
pub type NodeId = u32;

/// Type of XML node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Document root
    Document,
    /// Element node
    Element,
    /// Text content
    Text,
    /// CDATA section
    CData,
    /// Comment
    Comment,
    /// Processing instruction
    ProcessingInstruction,
    /// `<?xml ...?>`
    XmlDeclaration,
    /// `<!DOCTYPE ...>`
    DocType,
}

/// An XML node in the arena
#[derive(Debug, Clone)]
pub struct XmlNode {
    /// Type of this node
    pub kind: NodeKind,
    /// Parent node (None for document root and detached nodes)
    pub parent: Option<NodeId>,
    /// First child node
    pub first_child: Option<NodeId>,
    /// Last child node
    pub last_child: Option<NodeId>,
    /// Previous sibling
    pub prev_sibling: Option<NodeId>,
    /// Next sibling
    pub next_sibling: Option<NodeId>,
    /// Source text for every non-element node, entities left encoded
    pub text: String,
    /// Element payload, present only for `NodeKind::Element`
    pub element: Option<Box<ElementData>>,
}

impl XmlNode {
    /// Create a new document root node
    pub fn document() -> Self {
        XmlNode::leaf(NodeKind::Document, String::new())
    }

    /// Create a leaf node holding raw source text
    pub fn leaf(kind: NodeKind, text: String) -> Self {
        XmlNode {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            text,
            element: None,
        }
    }

    /// Create a new element node
    pub fn element(data: ElementData) -> Self {
        XmlNode {
            element: Some(Box::new(data)),
            ..XmlNode::leaf(NodeKind::Element, String::new())
        }
    }

    #[inline]
    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }
}

/// Element name, attributes and the source of its tags
#[derive(Debug, Clone)]
pub struct ElementData {
    /// Qualified name as written
    pub name: String,
    pub attributes: Vec<XmlAttribute>,
    /// Whitespace between the last attribute and the tag close
    pub tag_tail: String,
    /// Written as `<name/>` in the source
    pub self_closing: bool,
    /// Exact start tag; cleared when the element's attributes change
    pub raw_open: Option<String>,
    /// Exact end tag, kept for `</name >` spellings
    pub raw_close: Option<String>,
}

impl ElementData {
    /// Element parsed from source
    pub fn parsed(name: &str, attributes: Vec<XmlAttribute>, tag_tail: &str, self_closing: bool, raw_open: &str) -> Self {
        ElementData {
            name: name.to_string(),
            attributes,
            tag_tail: tag_tail.to_string(),
            self_closing,
            raw_open: Some(raw_open.to_string()),
            raw_close: None,
        }
    }

    /// Prefix of the element name, if any
    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// Attribute by qualified name as written
    pub fn attribute(&self, name: &str) -> Option<&XmlAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Render the start tag. `empty` selects the `/>` form.
    pub fn render_open(&self, empty: bool, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attributes {
            attr.render(out);
        }
        out.push_str(&self.tag_tail);
        out.push_str(if empty { "/>" } else { ">" });
    }

    /// Drop the cached start tag so it is rendered from the attribute list
    pub fn invalidate_open(&mut self) {
        self.raw_open = None;
    }
}

/// An attribute on an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Qualified name as written
    pub name: String,
    /// Decoded, normalized value
    pub value: String,
    /// Source text including leading whitespace; None for new attributes
    pub raw: Option<String>,
}

impl XmlAttribute {
    /// Attribute read from source
    pub fn parsed(name: &str, value: String, raw: &str) -> Self {
        XmlAttribute {
            name: name.to_string(),
            value,
            raw: Some(raw.to_string()),
        }
    }

    /// Attribute created by an edit
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        XmlAttribute {
            name: name.into(),
            value: value.into(),
            raw: None,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// `Some(None)` for `xmlns`, `Some(Some(p))` for `xmlns:p`, None otherwise
    pub fn namespace_declaration(&self) -> Option<Option<&str>> {
        if self.name == "xmlns" {
            Some(None)
        } else {
            self.name.strip_prefix("xmlns:").map(Some)
        }
    }

    pub fn render(&self, out: &mut String) {
        match &self.raw {
            Some(raw) => out.push_str(raw),
            None => {
                out.push(' ');
                out.push_str(&self.name);
                out.push_str("=\"");
                out.push_str(&escape_attribute(&self.value));
                out.push('"');
            }
        }
    }
}

/// Split `prefix:local` into its parts
#[inline]
pub fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_declaration() {
        assert_eq!(XmlAttribute::new("xmlns", "urn:a").namespace_declaration(), Some(None));
        assert_eq!(XmlAttribute::new("xmlns:cp", "urn:b").namespace_declaration(), Some(Some("cp")));
        assert_eq!(XmlAttribute::new("uri", "sip:a@b").namespace_declaration(), None);
    }

    #[test]
    fn test_render_new_attribute() {
        let mut out = String::new();
        XmlAttribute::new("name", "a\"b").render(&mut out);
        assert_eq!(out, " name=\"a&quot;b\"");
    }

    #[test]
    fn test_render_open() {
        let data = ElementData {
            name: "rl:entry".into(),
            attributes: vec![XmlAttribute::new("uri", "sip:bob@example.com")],
            tag_tail: String::new(),
            self_closing: true,
            raw_open: None,
            raw_close: None,
        };
        let mut out = String::new();
        data.render_open(true, &mut out);
        assert_eq!(out, "<rl:entry uri=\"sip:bob@example.com\"/>");
        assert_eq!(data.prefix(), Some("rl"));
        assert_eq!(data.local_name(), "entry");
    }
}
