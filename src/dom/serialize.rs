//! Lossless serialization
//!
//! Nodes are written from their kept source text; only elements whose start
//! tag was invalidated by an edit are rendered from their attribute list.

use super::document::{XmlDocument, DOCUMENT_NODE};
use super::node::{NodeId, NodeKind};

/// Serialize the whole document
pub fn serialize(doc: &XmlDocument) -> String {
    let mut out = String::new();
    if doc.has_bom() {
        out.push('\u{FEFF}');
    }
    for child in doc.children(DOCUMENT_NODE) {
        write_node(doc, child, &mut out);
    }
    out
}

/// Serialize one node and its subtree
pub fn serialize_node(doc: &XmlDocument, id: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, id, &mut out);
    out
}

fn write_node(doc: &XmlDocument, id: NodeId, out: &mut String) {
    let node = doc.node(id);
    match node.kind {
        NodeKind::Document => {
            for child in doc.children(id) {
                write_node(doc, child, out);
            }
        }
        NodeKind::Element => {
            let Some(data) = node.element.as_deref() else { return };
            let has_children = node.first_child.is_some();
            let closed = match &data.raw_open {
                Some(raw) => {
                    out.push_str(raw);
                    data.self_closing
                }
                None => {
                    let empty = data.self_closing && !has_children;
                    data.render_open(empty, out);
                    empty
                }
            };
            if closed {
                return;
            }
            for child in doc.children(id) {
                write_node(doc, child, out);
            }
            match &data.raw_close {
                Some(raw) => out.push_str(raw),
                None => {
                    out.push_str("</");
                    out.push_str(&data.name);
                    out.push('>');
                }
            }
        }
        _ => out.push_str(&node.text),
    }
}
