//! Selector name resolution
//!
//! Turns a selector QName into an expanded name. Unprefixed element names
//! take the application usage's default namespace, never the document's.
//! Prefixes resolve against the URI's `xmlns()` bindings first, then against
//! declarations in scope at the given element.

use crate::dom::namespace::{lookup_namespace, ns};
use crate::dom::{NodeId, XmlDocument};
use crate::selector::QName;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    #[error("namespace prefix '{0}' is not bound")]
    UnboundPrefix(String),
}

/// Whether a name appears as an element or attribute test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Element,
    Attribute,
}

/// Namespace URI plus local name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQName {
    pub namespace: Option<String>,
    pub local_name: String,
}

impl ResolvedQName {
    pub fn matches(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == namespace
    }
}

/// Per-request resolution context
#[derive(Debug, Clone, Default)]
pub struct NamespaceContext {
    /// Application usage default namespace
    pub default_namespace: Option<String>,
    /// Bindings from the URI query component
    pub explicit: Vec<(String, String)>,
}

impl NamespaceContext {
    pub fn new(default_namespace: Option<&str>, explicit: &[(String, String)]) -> Self {
        NamespaceContext {
            default_namespace: default_namespace.map(str::to_string),
            explicit: explicit.to_vec(),
        }
    }

    /// Resolve `name` against explicit bindings, then the document at `scope`
    pub fn resolve(
        &self,
        name: &QName,
        kind: NameKind,
        doc: &XmlDocument,
        scope: Option<NodeId>,
    ) -> Result<ResolvedQName, NamespaceError> {
        let namespace = match &name.prefix {
            None => match kind {
                NameKind::Element => self.default_namespace.clone(),
                NameKind::Attribute => None,
            },
            Some(prefix) => Some(self.prefix_namespace(prefix, doc, scope)?),
        };
        Ok(ResolvedQName {
            namespace,
            local_name: name.local_name.clone(),
        })
    }

    fn prefix_namespace(&self, prefix: &str, doc: &XmlDocument, scope: Option<NodeId>) -> Result<String, NamespaceError> {
        if let Some((_, uri)) = self.explicit.iter().find(|(p, _)| p == prefix) {
            return Ok(uri.clone());
        }
        if let Some(uri) = scope.and_then(|id| lookup_namespace(doc, id, Some(prefix))) {
            return Ok(uri.to_string());
        }
        if prefix == "xml" {
            return Ok(ns::XML.to_string());
        }
        Err(NamespaceError::UnboundPrefix(prefix.to_string()))
    }
}
