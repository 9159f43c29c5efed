//! Mutation Engine
//!
//! Applies one request to the bytes of one stored document:
//! - `get`: serialize the selected node
//! - `put`: replace the document, or replace/insert an element, or set an
//!   attribute, then re-navigate to check the selector picks the new node
//! - `delete`: remove an element or attribute, then check the selector
//!   selects nothing
//!
//! Edits are structural on the lossless tree, so bytes outside the edited
//! start tag or the inserted subtree come back unchanged.

use super::{
    check_media_type, Deletion, Fetched, MutationError, PutResult, XCAP_ATTRIBUTE_MIME, XCAP_ELEMENT_MIME,
    XCAP_NAMESPACE_MIME,
};
use crate::appusage::AppUsage;
use crate::core::entities::{escape_attribute, validate_chars};
use crate::dom::namespace::check_namespaces;
use crate::dom::{in_scope_namespaces, serialize, serialize_node, FragmentError, NodeId, XmlDocument, DOCUMENT_NODE};
use crate::error::ConflictTag;
use crate::resolve::{InsertionPoint, NameKind, NamespaceContext, NavigationError, Navigator, ResolvedTarget};
use crate::selector::{ElementStep, NodeSelector, QName, Step};
use tracing::debug;

/// Where a PUT element lands
enum Placement {
    Replace(NodeId),
    Insert(InsertionPoint),
}

/// Request-scoped engine for one application usage
pub struct MutationEngine<'a> {
    usage: &'a dyn AppUsage,
    context: NamespaceContext,
}

impl<'a> MutationEngine<'a> {
    /// `namespaces` are the `xmlns()` bindings from the request URI
    pub fn new(usage: &'a dyn AppUsage, namespaces: &[(String, String)]) -> Self {
        MutationEngine {
            usage,
            context: NamespaceContext::new(Some(usage.default_namespace()), namespaces),
        }
    }

    /// Body of a GET on `selector` within `stored`
    pub fn get(&self, stored: &[u8], selector: &NodeSelector) -> Result<Fetched, MutationError> {
        if selector.is_empty() {
            return Ok(self.whole_document(stored));
        }
        let doc = parse_stored(stored)?;
        let target = Navigator::new(&doc, &self.context).navigate(selector)?;
        Ok(match target {
            ResolvedTarget::WholeDocument => self.whole_document(stored),
            ResolvedTarget::Element(id) => Fetched {
                content_type: XCAP_ELEMENT_MIME.to_string(),
                body: serialize_node(&doc, id).into_bytes(),
            },
            ResolvedTarget::Attribute { element, name } => {
                let value = doc
                    .element(element)
                    .and_then(|data| data.attribute(&name))
                    .map(|attr| attr.value.clone())
                    .ok_or(NavigationError::NotFound)?;
                Fetched {
                    content_type: XCAP_ATTRIBUTE_MIME.to_string(),
                    body: value.into_bytes(),
                }
            }
            ResolvedTarget::NamespaceBindings(id) => Fetched {
                content_type: XCAP_NAMESPACE_MIME.to_string(),
                body: namespace_element(&doc, id).into_bytes(),
            },
        })
    }

    /// New document bytes after a PUT of `body` at `selector`
    pub fn put(
        &self,
        stored: Option<&[u8]>,
        selector: &NodeSelector,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<PutResult, MutationError> {
        match selector.last() {
            None => {
                check_media_type(content_type, self.usage.mime_type())?;
                self.put_document(stored, body)
            }
            Some(Step::Element(step)) => {
                check_media_type(content_type, XCAP_ELEMENT_MIME)?;
                self.put_element(stored, selector, step, body)
            }
            Some(Step::Attribute(name)) => {
                check_media_type(content_type, XCAP_ATTRIBUTE_MIME)?;
                self.put_attribute(stored, selector, name, body)
            }
            Some(Step::NamespaceBindings) => Err(MutationError::NamespaceBindings),
            Some(Step::Extension(_)) => Err(MutationError::Conflict(ConflictTag::CannotInsert)),
        }
    }

    /// Document state after a DELETE at `selector`
    pub fn delete(&self, stored: &[u8], selector: &NodeSelector) -> Result<Deletion, MutationError> {
        match selector.last() {
            None => return Ok(Deletion::DocumentRemoved),
            Some(Step::NamespaceBindings) => return Err(MutationError::NamespaceBindings),
            Some(_) => {}
        }
        let mut doc = parse_stored(stored)?;
        let target = Navigator::new(&doc, &self.context).navigate(selector)?;
        match target {
            ResolvedTarget::Element(id) if doc.root_element() == Some(id) => return Ok(Deletion::DocumentRemoved),
            ResolvedTarget::Element(id) => doc.detach(id),
            ResolvedTarget::Attribute { element, name } => {
                doc.remove_attribute(element, &name);
            }
            ResolvedTarget::WholeDocument => return Ok(Deletion::DocumentRemoved),
            ResolvedTarget::NamespaceBindings(_) => return Err(MutationError::NamespaceBindings),
        }

        match Navigator::new(&doc, &self.context).navigate(selector) {
            Err(NavigationError::NotFound) | Err(NavigationError::Namespace(_)) => {}
            other => {
                debug!(selector = %selector, result = ?other, "selector still matches after delete");
                return Err(MutationError::Conflict(ConflictTag::CannotDelete));
            }
        }
        Ok(Deletion::Updated(serialize(&doc).into_bytes()))
    }

    fn whole_document(&self, stored: &[u8]) -> Fetched {
        Fetched {
            content_type: self.usage.mime_type().to_string(),
            body: stored.to_vec(),
        }
    }

    fn put_document(&self, stored: Option<&[u8]>, body: &[u8]) -> Result<PutResult, MutationError> {
        let text = body_text(body)?;
        XmlDocument::parse(text).map_err(|e| {
            debug!(error = %e, "rejected document body");
            MutationError::Conflict(ConflictTag::NotWellFormed)
        })?;
        Ok(PutResult {
            content: body.to_vec(),
            created: stored.is_none(),
        })
    }

    fn put_element(
        &self,
        stored: Option<&[u8]>,
        selector: &NodeSelector,
        step: &ElementStep,
        body: &[u8],
    ) -> Result<PutResult, MutationError> {
        let fragment = XmlDocument::parse_fragment(body_text(body)?).map_err(|e| {
            debug!(error = %e, "rejected element body");
            match e {
                FragmentError::NotWellFormed(_) => MutationError::Conflict(ConflictTag::NotWellFormed),
                FragmentError::NotFragment => MutationError::Conflict(ConflictTag::NotXmlFrag),
            }
        })?;
        let fragment_root = fragment
            .root_element()
            .ok_or(MutationError::Conflict(ConflictTag::NotXmlFrag))?;
        let stored = stored.ok_or(MutationError::Conflict(ConflictTag::NoParent))?;
        let mut doc = parse_stored(stored)?;

        let placement = {
            let navigator = Navigator::new(&doc, &self.context);
            let parent = navigator.resolve_parent(selector)?;
            match navigator.select(parent, step)?.as_slice() {
                [existing] => Placement::Replace(*existing),
                // A document has exactly one root element
                [] if parent == DOCUMENT_NODE => return Err(MutationError::Conflict(ConflictTag::CannotInsert)),
                [] => Placement::Insert(navigator.insertion_point(parent, step)?),
                _ => return Err(MutationError::Conflict(ConflictTag::CannotInsert)),
            }
        };

        let new = doc.import_subtree(&fragment, fragment_root);
        let created = match placement {
            Placement::Replace(old) => {
                doc.replace(old, new);
                false
            }
            Placement::Insert(InsertionPoint::AppendTo(parent)) => {
                doc.append_child(parent, new);
                true
            }
            Placement::Insert(InsertionPoint::Before(sibling)) => {
                doc.insert_before(sibling, new);
                true
            }
            Placement::Insert(InsertionPoint::After(sibling)) => {
                doc.insert_after(sibling, new);
                true
            }
        };

        check_namespaces(&doc, new).map_err(|e| {
            debug!(error = %e, "element body breaks namespace rules in place");
            MutationError::Conflict(ConflictTag::NotWellFormed)
        })?;

        match Navigator::new(&doc, &self.context).navigate(selector) {
            Ok(ResolvedTarget::Element(id)) if id == new => {}
            other => {
                debug!(selector = %selector, result = ?other, "selector does not pick the new element");
                return Err(MutationError::Conflict(ConflictTag::CannotInsert));
            }
        }
        Ok(PutResult {
            content: serialize(&doc).into_bytes(),
            created,
        })
    }

    fn put_attribute(
        &self,
        stored: Option<&[u8]>,
        selector: &NodeSelector,
        name: &QName,
        body: &[u8],
    ) -> Result<PutResult, MutationError> {
        let value = body_text(body)?;
        validate_chars(value).map_err(|_| MutationError::Conflict(ConflictTag::NotXmlAttValue))?;
        let stored = stored.ok_or(MutationError::Conflict(ConflictTag::NoParent))?;
        let mut doc = parse_stored(stored)?;

        let (element, qualified, created) = {
            let navigator = Navigator::new(&doc, &self.context);
            let element = navigator.resolve_parent(selector)?;
            match navigator.navigate(selector) {
                Ok(ResolvedTarget::Attribute { element, name }) => (element, name, false),
                Err(NavigationError::NotFound) => (element, self.attribute_name(&doc, element, name)?, true),
                Ok(_) => return Err(MutationError::Conflict(ConflictTag::CannotInsert)),
                Err(e) => return Err(e.into()),
            }
        };
        doc.set_attribute(element, &qualified, value);

        match Navigator::new(&doc, &self.context).navigate(selector) {
            Ok(ResolvedTarget::Attribute { element: found, .. }) if found == element => {}
            other => {
                debug!(selector = %selector, result = ?other, "selector does not pick the new attribute");
                return Err(MutationError::Conflict(ConflictTag::CannotInsert));
            }
        }
        Ok(PutResult {
            content: serialize(&doc).into_bytes(),
            created,
        })
    }

    /// Name to write for a new attribute; a prefixed name needs a prefix the
    /// document already binds to the same namespace
    fn attribute_name(&self, doc: &XmlDocument, element: NodeId, name: &QName) -> Result<String, MutationError> {
        if name.prefix.is_none() {
            return Ok(name.local_name.clone());
        }
        let resolved = self
            .context
            .resolve(name, NameKind::Attribute, doc, Some(element))
            .map_err(NavigationError::from)?;
        let namespace = resolved.namespace.unwrap_or_default();
        if namespace == crate::dom::namespace::ns::XML {
            return Ok(format!("xml:{}", resolved.local_name));
        }
        in_scope_namespaces(doc, element)
            .into_iter()
            .find_map(|binding| match binding.prefix {
                Some(prefix) if binding.uri == namespace => Some(format!("{}:{}", prefix, resolved.local_name)),
                _ => None,
            })
            .ok_or(MutationError::Conflict(ConflictTag::CannotInsert))
    }
}

fn body_text(body: &[u8]) -> Result<&str, MutationError> {
    std::str::from_utf8(body).map_err(|_| MutationError::Conflict(ConflictTag::NotUtf8))
}

fn parse_stored(stored: &[u8]) -> Result<XmlDocument, MutationError> {
    let text = std::str::from_utf8(stored).map_err(|e| MutationError::Corrupt(e.to_string()))?;
    XmlDocument::parse(text).map_err(|e| MutationError::Corrupt(e.to_string()))
}

/// Empty element named like `id` carrying every binding in scope there
fn namespace_element(doc: &XmlDocument, id: NodeId) -> String {
    let name = doc.element(id).map(|data| data.name.as_str()).unwrap_or_default();
    let mut out = format!("<{}", name);
    for binding in in_scope_namespaces(doc, id) {
        match &binding.prefix {
            Some(prefix) => out.push_str(&format!(" xmlns:{}=\"", prefix)),
            None => out.push_str(" xmlns=\""),
        }
        out.push_str(&escape_attribute(&binding.uri));
        out.push('"');
    }
    out.push_str("/>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appusage::GenericAppUsage;
    use crate::selector::parse_node_selector;

    const START: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root xmlns="test-app" xmlns:x="urn:x">
  <el1 att="first"/>
  <el1 att="second"/>
  <el2 x:a="1">text</el2>
</root>"#;

    fn usage() -> GenericAppUsage {
        GenericAppUsage::new("test-app", "test-app", "application/test-app+xml")
    }

    fn sel(s: &str) -> NodeSelector {
        parse_node_selector(s, false).unwrap()
    }

    fn put(selector: &str, body: &str) -> Result<PutResult, MutationError> {
        let usage = usage();
        MutationEngine::new(&usage, &[]).put(Some(START.as_bytes()), &sel(selector), body.as_bytes(), None)
    }

    fn text(result: PutResult) -> String {
        String::from_utf8(result.content).unwrap()
    }

    #[test]
    fn test_get_element_is_verbatim() {
        let usage = usage();
        let engine = MutationEngine::new(&usage, &[]);
        let fetched = engine.get(START.as_bytes(), &sel("/root/el1[2]")).unwrap();
        assert_eq!(fetched.content_type, XCAP_ELEMENT_MIME);
        assert_eq!(fetched.body, b"<el1 att=\"second\"/>".to_vec());
    }

    #[test]
    fn test_get_attribute_and_namespaces() {
        let usage = usage();
        let engine = MutationEngine::new(&usage, &[]);
        let fetched = engine.get(START.as_bytes(), &sel("/root/el1[1]/@att")).unwrap();
        assert_eq!(fetched.body, b"first".to_vec());
        assert_eq!(fetched.content_type, XCAP_ATTRIBUTE_MIME);

        let fetched = engine.get(START.as_bytes(), &sel("/root/el2/namespace::*")).unwrap();
        assert_eq!(fetched.content_type, XCAP_NAMESPACE_MIME);
        assert_eq!(
            String::from_utf8(fetched.body).unwrap(),
            "<el2 xmlns=\"test-app\" xmlns:x=\"urn:x\"/>"
        );
    }

    #[test]
    fn test_get_ambiguous_and_whole_document() {
        let usage = usage();
        let engine = MutationEngine::new(&usage, &[]);
        assert_eq!(
            engine.get(START.as_bytes(), &sel("/root/el1")),
            Err(MutationError::Navigation(NavigationError::Ambiguous))
        );
        let whole = engine.get(START.as_bytes(), &NodeSelector::default()).unwrap();
        assert_eq!(whole.content_type, "application/test-app+xml");
        assert_eq!(whole.body, START.as_bytes().to_vec());
    }

    #[test]
    fn test_put_replaces_in_place() {
        let result = put("/root/el1[@att=\"second\"]", "<el1 att=\"second\">new</el1>").unwrap();
        assert!(!result.created);
        assert_eq!(text(result), START.replace("<el1 att=\"second\"/>", "<el1 att=\"second\">new</el1>"));
    }

    #[test]
    fn test_put_inserts_after_last_sibling() {
        let result = put("/root/el1[3]", "<el1 att=\"third\"/>").unwrap();
        assert!(result.created);
        assert_eq!(
            text(result),
            START.replace("<el1 att=\"second\"/>", "<el1 att=\"second\"/><el1 att=\"third\"/>")
        );
    }

    #[test]
    fn test_put_out_of_range_and_ambiguous() {
        assert_eq!(
            put("/root/el1[4]", "<el1/>"),
            Err(MutationError::Conflict(ConflictTag::CannotInsert))
        );
        assert_eq!(put("/root/el1", "<el1/>"), Err(MutationError::Conflict(ConflictTag::CannotInsert)));
        assert_eq!(put("/root/el9", "<el1/>"), Err(MutationError::Conflict(ConflictTag::CannotInsert)));
        assert_eq!(put("/root/missing/el1", "<el1/>"), Err(MutationError::Conflict(ConflictTag::NoParent)));
        assert_eq!(put("/other", "<other/>"), Err(MutationError::Conflict(ConflictTag::CannotInsert)));
    }

    #[test]
    fn test_put_body_errors() {
        assert_eq!(put("/root/el3", "<el3>"), Err(MutationError::Conflict(ConflictTag::NotWellFormed)));
        assert_eq!(put("/root/el3", "<el3/><el3/>"), Err(MutationError::Conflict(ConflictTag::NotXmlFrag)));
        assert_eq!(put("/root/el3", "<y:el3/>"), Err(MutationError::Conflict(ConflictTag::NotWellFormed)));
        let usage = usage();
        let engine = MutationEngine::new(&usage, &[]);
        assert_eq!(
            engine.put(Some(START.as_bytes()), &sel("/root/el3"), b"<el3>\xff</el3>", None),
            Err(MutationError::Conflict(ConflictTag::NotUtf8))
        );
        assert_eq!(
            engine.put(Some(START.as_bytes()), &sel("/root/el3"), b"<el3/>", Some("text/xml")),
            Err(MutationError::UnsupportedMediaType("text/xml".into()))
        );
    }

    #[test]
    fn test_put_body_uses_context_prefix() {
        let result = put("/root/x:el3", "<x:el3/>").unwrap();
        assert!(text(result).ends_with("<el2 x:a=\"1\">text</el2>\n<x:el3/></root>"));
    }

    #[test]
    fn test_put_attribute() {
        let result = put("/root/el2/@b", "v&1").unwrap();
        assert!(result.created);
        assert!(text(result).contains("<el2 x:a=\"1\" b=\"v&amp;1\">text</el2>"));

        let result = put("/root/el2/@x:a", "2").unwrap();
        assert!(!result.created);
        assert!(text(result).contains("<el2 x:a=\"2\">text</el2>"));

        // Changing the value the parent is selected by breaks re-navigation
        assert_eq!(
            put("/root/el1[@att=\"first\"]/@att", "other"),
            Err(MutationError::Conflict(ConflictTag::CannotInsert))
        );
    }

    #[test]
    fn test_namespace_bindings_read_only() {
        assert_eq!(put("/root/namespace::*", "<a/>"), Err(MutationError::NamespaceBindings));
        let usage = usage();
        let engine = MutationEngine::new(&usage, &[]);
        assert_eq!(
            engine.delete(START.as_bytes(), &sel("/root/namespace::*")),
            Err(MutationError::NamespaceBindings)
        );
    }

    #[test]
    fn test_delete() {
        let usage = usage();
        let engine = MutationEngine::new(&usage, &[]);
        let Deletion::Updated(bytes) = engine.delete(START.as_bytes(), &sel("/root/el2")).unwrap() else {
            panic!("document removed");
        };
        assert_eq!(String::from_utf8(bytes).unwrap(), START.replace("<el2 x:a=\"1\">text</el2>", ""));

        // The second el1 moves into position 1
        assert_eq!(
            engine.delete(START.as_bytes(), &sel("/root/el1[1]")),
            Err(MutationError::Conflict(ConflictTag::CannotDelete))
        );
        assert_eq!(
            engine.delete(START.as_bytes(), &sel("/root/el9")),
            Err(MutationError::Navigation(NavigationError::NotFound))
        );
        assert_eq!(engine.delete(START.as_bytes(), &sel("/root")), Ok(Deletion::DocumentRemoved));
    }

    #[test]
    fn test_delete_attribute() {
        let usage = usage();
        let engine = MutationEngine::new(&usage, &[]);
        let Deletion::Updated(bytes) = engine.delete(START.as_bytes(), &sel("/root/el1[2]/@att")).unwrap() else {
            panic!("document removed");
        };
        assert!(String::from_utf8(bytes).unwrap().contains("<el1 att=\"first\"/>\n  <el1/>"));
    }

    #[test]
    fn test_put_whole_document() {
        let usage = usage();
        let engine = MutationEngine::new(&usage, &[]);
        let result = engine.put(None, &NodeSelector::default(), b"<root xmlns=\"test-app\"/>", None).unwrap();
        assert!(result.created);
        assert_eq!(
            engine.put(None, &NodeSelector::default(), b"<!-- only -->", None),
            Err(MutationError::Conflict(ConflictTag::NotWellFormed))
        );
        assert_eq!(
            engine.put(Some(START.as_bytes()), &sel("/root/el3"), b"<el3/>", None).map(|r| r.created),
            Ok(true)
        );
        assert!(matches!(engine.get(b"<root", &sel("/root")), Err(MutationError::Corrupt(_))));
    }
}
