//! XML Document - arena-based lossless DOM
//!
//! Nodes live in a flat arena addressed by NodeId. Every node keeps enough
//! source text that serializing an unedited document reproduces its input
//! byte for byte. Structural edits only relink nodes, so untouched regions
//! keep their formatting.

use super::namespace::check_namespaces;
use super::node::{ElementData, NodeId, NodeKind, XmlNode};
use crate::core::attributes::parse_start_tag;
use crate::core::scanner::is_whitespace;
use crate::core::tokenizer::{MarkupError, TokenKind, Tokenizer};
use thiserror::Error;

/// Id of the document node
pub const DOCUMENT_NODE: NodeId = 0;

const BOM: char = '\u{FEFF}';

/// Failure to read a request body as a single XML element
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentError {
    #[error("body is not well-formed: {0}")]
    NotWellFormed(#[from] MarkupError),
    #[error("body is not a single XML element")]
    NotFragment,
}

impl FragmentError {
    fn into_markup(self) -> MarkupError {
        match self {
            FragmentError::NotWellFormed(err) => err,
            FragmentError::NotFragment => MarkupError::new("Not a single element", 0),
        }
    }
}

/// Mutable XML document
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<XmlNode>,
    bom: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Document,
    Fragment,
}

impl XmlDocument {
    /// Parse a complete document, enforcing well-formedness and namespace rules
    pub fn parse(input: &str) -> Result<Self, MarkupError> {
        let doc = Self::build(input, Mode::Document).map_err(FragmentError::into_markup)?;
        let root = doc.root_element().ok_or_else(|| MarkupError::new("No root element", input.len()))?;
        check_namespaces(&doc, root)?;
        Ok(doc)
    }

    /// Parse a request body holding exactly one element
    ///
    /// Surrounding whitespace is dropped. Namespace prefixes are not checked
    /// here since the body may rely on bindings from the target document.
    pub fn parse_fragment(input: &str) -> Result<Self, FragmentError> {
        let doc = Self::build(input, Mode::Fragment)?;
        if doc.root_element().is_none() {
            return Err(FragmentError::NotFragment);
        }
        Ok(doc)
    }

    fn build(input: &str, mode: Mode) -> Result<Self, FragmentError> {
        let (bom, body) = match input.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, input),
        };
        let mut doc = XmlDocument {
            nodes: vec![XmlNode::document()],
            bom: bom && mode == Mode::Document,
        };

        let structural = |message: &str, position: usize| match mode {
            Mode::Document => FragmentError::NotWellFormed(MarkupError::new(message, position)),
            Mode::Fragment => FragmentError::NotFragment,
        };

        let mut tokenizer = Tokenizer::new(body);
        let mut stack: Vec<NodeId> = vec![DOCUMENT_NODE];
        let mut seen_root = false;

        while let Some(token) = tokenizer.next_token()? {
            let position = token.span.0;
            let parent = stack.last().copied().unwrap_or(DOCUMENT_NODE);
            let top_level = parent == DOCUMENT_NODE;

            match token.kind {
                TokenKind::StartTag | TokenKind::EmptyTag => {
                    if top_level && seen_root {
                        return Err(structural("Content after the root element", position));
                    }
                    let tag = parse_start_tag(token.raw).map_err(|msg| MarkupError::new(msg, position))?;
                    let data = ElementData::parsed(tag.name, tag.attributes, tag.tail, tag.self_closing, token.raw);
                    let id = doc.push(XmlNode::element(data));
                    doc.link_last(parent, id);
                    if top_level {
                        seen_root = true;
                    }
                    if token.kind == TokenKind::StartTag {
                        stack.push(id);
                    }
                }
                TokenKind::EndTag => {
                    if top_level {
                        return Err(MarkupError::new(format!("Unexpected end tag </{}>", token.name), position).into());
                    }
                    let open = doc.element(parent).map(|e| e.name.as_str()).unwrap_or_default();
                    if open != token.name {
                        return Err(MarkupError::new(
                            format!("End tag </{}> does not match <{}>", token.name, open),
                            position,
                        )
                        .into());
                    }
                    if let Some(data) = doc.element_mut(parent) {
                        data.raw_close = Some(token.raw.to_string());
                    }
                    stack.pop();
                }
                TokenKind::Text => {
                    if top_level {
                        if !token.raw.bytes().all(is_whitespace) {
                            return Err(structural("Text outside the root element", position));
                        }
                        if mode == Mode::Fragment {
                            continue;
                        }
                    }
                    let id = doc.push(XmlNode::leaf(NodeKind::Text, token.raw.to_string()));
                    doc.link_last(parent, id);
                }
                TokenKind::CData => {
                    if top_level {
                        return Err(structural("CDATA outside the root element", position));
                    }
                    let id = doc.push(XmlNode::leaf(NodeKind::CData, token.raw.to_string()));
                    doc.link_last(parent, id);
                }
                TokenKind::Comment | TokenKind::ProcessingInstruction => {
                    if top_level && mode == Mode::Fragment {
                        return Err(FragmentError::NotFragment);
                    }
                    let kind = if token.kind == TokenKind::Comment {
                        NodeKind::Comment
                    } else {
                        NodeKind::ProcessingInstruction
                    };
                    let id = doc.push(XmlNode::leaf(kind, token.raw.to_string()));
                    doc.link_last(parent, id);
                }
                TokenKind::XmlDeclaration => {
                    if mode == Mode::Fragment {
                        return Err(FragmentError::NotFragment);
                    }
                    let id = doc.push(XmlNode::leaf(NodeKind::XmlDeclaration, token.raw.to_string()));
                    doc.link_last(DOCUMENT_NODE, id);
                }
                TokenKind::DocType => {
                    if !top_level || seen_root || doc.children(DOCUMENT_NODE).any(|c| doc.node(c).kind == NodeKind::DocType) {
                        return Err(structural("Misplaced DOCTYPE declaration", position));
                    }
                    let id = doc.push(XmlNode::leaf(NodeKind::DocType, token.raw.to_string()));
                    doc.link_last(DOCUMENT_NODE, id);
                }
            }
        }

        if stack.len() > 1 {
            let name = stack
                .last()
                .and_then(|&id| doc.element(id))
                .map(|e| e.name.clone())
                .unwrap_or_default();
            return Err(MarkupError::new(format!("Unclosed element <{}>", name), body.len()).into());
        }
        if !seen_root {
            return Err(structural("No root element", body.len()));
        }
        Ok(doc)
    }

    fn push(&mut self, node: XmlNode) -> NodeId {
        self.nodes.push(node);
        (self.nodes.len() - 1) as NodeId
    }

    /// Get a node by ID
    #[inline]
    pub fn node(&self, id: NodeId) -> &XmlNode {
        &self.nodes[id as usize]
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut XmlNode {
        &mut self.nodes[id as usize]
    }

    /// Element payload, None for non-element nodes
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.nodes.get(id as usize).and_then(|n| n.element.as_deref())
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        self.nodes.get_mut(id as usize).and_then(|n| n.element.as_deref_mut())
    }

    /// Document element, if the document still has one
    pub fn root_element(&self) -> Option<NodeId> {
        self.element_children(DOCUMENT_NODE).next()
    }

    /// Starts with a byte-order mark
    pub fn has_bom(&self) -> bool {
        self.bom
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Iterate over children
    pub fn children(&self, id: NodeId) -> ChildIter<'_> {
        ChildIter {
            doc: self,
            current: self.node(id).first_child,
        }
    }

    /// Iterate over element children only
    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).filter(move |&c| self.node(c).is_element())
    }

    /// Ancestors from the node itself up to (excluding) the document node
    pub fn ancestors_or_self(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |&n| self.node(n).parent).filter(|&n| n != DOCUMENT_NODE)
    }

    /// Append `child` as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.open_for_content(parent);
        self.link_last(parent, child);
    }

    /// Insert `child` immediately before `reference`
    pub fn insert_before(&mut self, reference: NodeId, child: NodeId) {
        self.detach(child);
        let parent = self.node(reference).parent;
        let prev = self.node(reference).prev_sibling;
        {
            let node = self.node_mut(child);
            node.parent = parent;
            node.prev_sibling = prev;
            node.next_sibling = Some(reference);
        }
        self.node_mut(reference).prev_sibling = Some(child);
        match prev {
            Some(p) => self.node_mut(p).next_sibling = Some(child),
            None => {
                if let Some(p) = parent {
                    self.node_mut(p).first_child = Some(child);
                }
            }
        }
    }

    /// Insert `child` immediately after `reference`
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) {
        match self.node(reference).next_sibling {
            Some(next) => self.insert_before(next, child),
            None => {
                if let Some(parent) = self.node(reference).parent {
                    self.append_child(parent, child);
                }
            }
        }
    }

    /// Put `new` where `old` is and detach `old`
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        self.insert_before(old, new);
        self.detach(old);
    }

    /// Unlink a node from its parent; its subtree stays intact
    pub fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let node = self.node(id);
            (node.parent, node.prev_sibling, node.next_sibling)
        };
        match prev {
            Some(p) => self.node_mut(p).next_sibling = next,
            None => {
                if let Some(p) = parent {
                    self.node_mut(p).first_child = next;
                }
            }
        }
        match next {
            Some(n) => self.node_mut(n).prev_sibling = prev,
            None => {
                if let Some(p) = parent {
                    self.node_mut(p).last_child = prev;
                }
            }
        }
        let node = self.node_mut(id);
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    /// Deep-copy a subtree from another document; the copy is detached
    pub fn import_subtree(&mut self, source: &XmlDocument, source_id: NodeId) -> NodeId {
        let src = source.node(source_id);
        let copy = XmlNode {
            kind: src.kind,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            text: src.text.clone(),
            element: src.element.clone(),
        };
        let id = self.push(copy);
        for child in source.children(source_id) {
            let child_copy = self.import_subtree(source, child);
            self.link_last(id, child_copy);
        }
        id
    }

    /// Set or add an attribute; returns the previous value
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Option<String> {
        let data = self.element_mut(id)?;
        data.invalidate_open();
        match data.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => {
                attr.raw = None;
                Some(std::mem::replace(&mut attr.value, value.to_string()))
            }
            None => {
                data.attributes.push(super::node::XmlAttribute::new(name, value));
                None
            }
        }
    }

    /// Remove an attribute; returns its value if it was present
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        let data = self.element_mut(id)?;
        let index = data.attributes.iter().position(|a| a.name == name)?;
        data.invalidate_open();
        Some(data.attributes.remove(index).value)
    }

    /// A self-closing element that gains content is rendered with an end tag
    fn open_for_content(&mut self, parent: NodeId) {
        if let Some(data) = self.element_mut(parent) {
            if data.self_closing {
                data.self_closing = false;
                data.invalidate_open();
            }
        }
    }

    fn link_last(&mut self, parent: NodeId, child: NodeId) {
        let last = self.node(parent).last_child;
        {
            let node = self.node_mut(child);
            node.parent = Some(parent);
            node.prev_sibling = last;
            node.next_sibling = None;
        }
        match last {
            Some(l) => self.node_mut(l).next_sibling = Some(child),
            None => self.node_mut(parent).first_child = Some(child),
        }
        self.node_mut(parent).last_child = Some(child);
    }
}

/// Iterator over children
pub struct ChildIter<'d> {
    doc: &'d XmlDocument,
    current: Option<NodeId>,
}

impl<'d> Iterator for ChildIter<'d> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = self.doc.node(current).next_sibling;
        Some(current)
    }
}
