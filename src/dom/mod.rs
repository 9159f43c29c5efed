//! DOM Module - Arena-based lossless XML Document
//!
//! Implements a mutable document representation using:
//! - Arena allocation for nodes
//! - NodeId (u32) indices for parent/child/sibling links
//! - Kept source text so unedited regions serialize byte for byte
//! - Namespace lookup over ancestor declarations

pub mod document;
pub mod namespace;
pub mod node;
pub mod serialize;

pub use document::{FragmentError, XmlDocument, DOCUMENT_NODE};
pub use namespace::{element_namespace, in_scope_namespaces, lookup_namespace, NamespaceBinding};
pub use node::{split_qname, ElementData, NodeId, NodeKind, XmlAttribute, XmlNode};
pub use serialize::{serialize, serialize_node};
