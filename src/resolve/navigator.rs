//! Tree Navigator
//!
//! Resolves a node selector against a document. Each element step filters the
//! element children of the current node by expanded name, then applies its
//! predicates in order: a position picks the Nth (1-based) of the current
//! candidates, an attribute test keeps candidates with that exact value.
//!
//! The navigator never mutates; insertion slots for PUT are computed here and
//! applied by the mutation engine.

use super::namespace::{NameKind, NamespaceContext, NamespaceError};
use crate::dom::{element_namespace, NodeId, XmlDocument, DOCUMENT_NODE};
use crate::error::ConflictTag;
use crate::selector::{ElementStep, NameTest, NodeSelector, Predicate, QName, Step};
use thiserror::Error;
use tracing::debug;

/// What a node selector resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    WholeDocument,
    Element(NodeId),
    /// Attribute `name` (qualified, as written in the document) on `element`
    Attribute { element: NodeId, name: String },
    NamespaceBindings(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("selector does not match any node")]
    NotFound,
    #[error("selector matches more than one element")]
    Ambiguous,
    #[error("conflict: {0}")]
    Conflict(ConflictTag),
    #[error(transparent)]
    Namespace(#[from] NamespaceError),
}

/// Where a new element goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionPoint {
    /// Last child of the parent
    AppendTo(NodeId),
    Before(NodeId),
    After(NodeId),
}

/// Selector evaluation over one document
pub struct Navigator<'d> {
    doc: &'d XmlDocument,
    context: &'d NamespaceContext,
}

impl<'d> Navigator<'d> {
    pub fn new(doc: &'d XmlDocument, context: &'d NamespaceContext) -> Self {
        Navigator { doc, context }
    }

    /// Resolve a full selector to a single target
    pub fn navigate(&self, selector: &NodeSelector) -> Result<ResolvedTarget, NavigationError> {
        let Some(last) = selector.last() else {
            return Ok(ResolvedTarget::WholeDocument);
        };
        let parent = self.walk(selector.parent_steps())?;
        let result = match last {
            Step::Element(step) => self.select_one(parent, step).map(ResolvedTarget::Element),
            Step::Attribute(name) => self
                .find_attribute(parent, name)?
                .map(|name| ResolvedTarget::Attribute { element: parent, name })
                .ok_or(NavigationError::NotFound),
            Step::NamespaceBindings if parent != DOCUMENT_NODE => Ok(ResolvedTarget::NamespaceBindings(parent)),
            Step::NamespaceBindings | Step::Extension(_) => Err(NavigationError::NotFound),
        };
        debug!(selector = %selector, result = ?result, "navigated node selector");
        result
    }

    /// Resolve every step but the last; failure means there is no parent
    pub fn resolve_parent(&self, selector: &NodeSelector) -> Result<NodeId, NavigationError> {
        match self.walk(selector.parent_steps()) {
            Ok(parent) => Ok(parent),
            Err(NavigationError::NotFound) | Err(NavigationError::Ambiguous) => {
                Err(NavigationError::Conflict(ConflictTag::NoParent))
            }
            Err(other) => Err(other),
        }
    }

    /// All elements a step selects under `parent`, in document order
    pub fn select(&self, parent: NodeId, step: &ElementStep) -> Result<Vec<NodeId>, NavigationError> {
        let mut candidates = self.name_matches(parent, &step.name)?;
        for predicate in &step.predicates {
            candidates = match predicate {
                Predicate::Position(n) => match n.checked_sub(1).and_then(|i| candidates.get(i)) {
                    Some(&picked) => vec![picked],
                    None => Vec::new(),
                },
                Predicate::AttributeEquals { name, value } => {
                    let mut kept = Vec::with_capacity(candidates.len());
                    for candidate in candidates {
                        if self.attribute_value(candidate, name)? == Some(value.as_str()) {
                            kept.push(candidate);
                        }
                    }
                    kept
                }
            };
        }
        Ok(candidates)
    }

    /// Slot for a new element selected by `step` under `parent`
    ///
    /// Counting uses siblings that pass the name test, every element for `*`.
    /// The slot is the first position predicate, else one past the last
    /// sibling; it must lie in `1..=count + 1`.
    pub fn insertion_point(&self, parent: NodeId, step: &ElementStep) -> Result<InsertionPoint, NavigationError> {
        let siblings = self.name_matches(parent, &step.name)?;
        let count = siblings.len();
        let position = step.position().unwrap_or(count + 1);
        if position < 1 || position > count + 1 {
            return Err(NavigationError::Conflict(ConflictTag::CannotInsert));
        }
        Ok(match siblings.first() {
            None => InsertionPoint::AppendTo(parent),
            Some(&first) if position == 1 => InsertionPoint::Before(first),
            Some(_) => InsertionPoint::After(siblings[position - 2]),
        })
    }

    fn walk(&self, steps: &[Step]) -> Result<NodeId, NavigationError> {
        let mut current = DOCUMENT_NODE;
        for step in steps {
            current = match step {
                Step::Element(step) => self.select_one(current, step)?,
                _ => return Err(NavigationError::NotFound),
            };
        }
        Ok(current)
    }

    fn select_one(&self, parent: NodeId, step: &ElementStep) -> Result<NodeId, NavigationError> {
        match self.select(parent, step)?.as_slice() {
            [] => Err(NavigationError::NotFound),
            [only] => Ok(*only),
            _ => Err(NavigationError::Ambiguous),
        }
    }

    /// Element children passing the name test
    fn name_matches(&self, parent: NodeId, test: &NameTest) -> Result<Vec<NodeId>, NavigationError> {
        let children = self.doc.element_children(parent);
        let name = match test {
            NameTest::Any => return Ok(children.collect()),
            NameTest::Name(name) => name,
        };

        // Prefixes bound by the context element apply to every child
        let at_parent = (parent != DOCUMENT_NODE).then_some(parent);
        if let Ok(resolved) = self.context.resolve(name, NameKind::Element, self.doc, at_parent) {
            return Ok(children
                .filter(|&c| self.element_matches(c, resolved.namespace.as_deref(), &resolved.local_name))
                .collect());
        }

        // Otherwise the prefix may be declared on the children themselves
        let mut bound = false;
        let mut matches = Vec::new();
        for child in children {
            if let Ok(resolved) = self.context.resolve(name, NameKind::Element, self.doc, Some(child)) {
                bound = true;
                if self.element_matches(child, resolved.namespace.as_deref(), &resolved.local_name) {
                    matches.push(child);
                }
            }
        }
        if !bound {
            let prefix = name.prefix.clone().unwrap_or_default();
            return Err(NamespaceError::UnboundPrefix(prefix).into());
        }
        Ok(matches)
    }

    fn element_matches(&self, id: NodeId, namespace: Option<&str>, local_name: &str) -> bool {
        match self.doc.element(id) {
            Some(data) => data.local_name() == local_name && element_namespace(self.doc, id) == namespace,
            None => false,
        }
    }

    /// Qualified name of the attribute on `element` matching `name`
    fn find_attribute(&self, element: NodeId, name: &QName) -> Result<Option<String>, NavigationError> {
        let Some(data) = self.doc.element(element) else {
            return Ok(None);
        };
        let resolved = self.context.resolve(name, NameKind::Attribute, self.doc, Some(element))?;
        for attr in &data.attributes {
            if attr.namespace_declaration().is_some() || attr.local_name() != resolved.local_name {
                continue;
            }
            let namespace = match attr.prefix() {
                Some(prefix) => crate::dom::lookup_namespace(self.doc, element, Some(prefix)),
                None => None,
            };
            if namespace == resolved.namespace.as_deref() {
                return Ok(Some(attr.name.clone()));
            }
        }
        Ok(None)
    }

    fn attribute_value(&self, element: NodeId, name: &QName) -> Result<Option<&'d str>, NavigationError> {
        let Some(qualified) = self.find_attribute(element, name)? else {
            return Ok(None);
        };
        Ok(self
            .doc
            .element(element)
            .and_then(|data| data.attribute(&qualified))
            .map(|attr| attr.value.as_str()))
    }
}
