//! Application usages
//!
//! An application usage tells the engine how to treat one kind of document:
//! its default namespace for unprefixed selector steps, its MIME type, who
//! may touch it, and how document paths are normalized. Usages are trait
//! objects looked up by application id in an `AppUsageRegistry`.

use crate::selector::{DocumentSelector, Scope, UserId};
use crate::server::Method;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Authenticated party behind a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requester {
    User(UserId),
    /// Trusted peer (another server) acting for any user
    TrustedPeer,
}

/// Behaviour of one XCAP application
pub trait AppUsage: Send + Sync {
    /// Application id (AUID) as it appears in URIs
    fn id(&self) -> &str;

    /// Id documents are stored under; aliases share their target's
    fn storage_id(&self) -> &str {
        self.id()
    }

    /// Namespace of unprefixed element names in node selectors
    fn default_namespace(&self) -> &str;

    /// MIME type of whole documents
    fn mime_type(&self) -> &str;

    /// Document served on GET when nothing is stored
    fn default_document(&self) -> Option<String> {
        None
    }

    /// Users touch only their own documents; global documents are readable
    /// by anyone and writable by trusted peers
    fn is_authorized(&self, requester: &Requester, document: &DocumentSelector, method: Method) -> bool {
        match (requester, &document.scope) {
            (Requester::TrustedPeer, _) => true,
            (Requester::User(_), Scope::Global) => method == Method::Get,
            (Requester::User(user), Scope::User(owner)) => same_user(user, owner),
        }
    }

    /// Storage path for a requested document path
    fn normalize_document_path(&self, path: &str) -> String {
        path.to_string()
    }
}

fn same_user(a: &UserId, b: &UserId) -> bool {
    a.username == b.username
        && match (&a.domain, &b.domain) {
            (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
            (None, None) => true,
            _ => false,
        }
}

/// Configurable application usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericAppUsage {
    pub id: String,
    pub namespace: String,
    pub mime_type: String,
    /// Store under another application's id
    pub storage_id: Option<String>,
    /// Store every document of this application under one fixed path
    pub fixed_document_path: Option<String>,
}

impl GenericAppUsage {
    pub fn new(id: impl Into<String>, namespace: impl Into<String>, mime_type: impl Into<String>) -> Self {
        GenericAppUsage {
            id: id.into(),
            namespace: namespace.into(),
            mime_type: mime_type.into(),
            storage_id: None,
            fixed_document_path: None,
        }
    }

    pub fn stored_as(mut self, storage_id: impl Into<String>) -> Self {
        self.storage_id = Some(storage_id.into());
        self
    }

    pub fn with_fixed_path(mut self, path: impl Into<String>) -> Self {
        self.fixed_document_path = Some(path.into());
        self
    }
}

impl AppUsage for GenericAppUsage {
    fn id(&self) -> &str {
        &self.id
    }

    fn storage_id(&self) -> &str {
        self.storage_id.as_deref().unwrap_or(&self.id)
    }

    fn default_namespace(&self) -> &str {
        &self.namespace
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn normalize_document_path(&self, path: &str) -> String {
        self.fixed_document_path.clone().unwrap_or_else(|| path.to_string())
    }
}

const XCAP_CAPS_NAMESPACE: &str = "urn:ietf:params:xml:ns:xcap-caps";

/// The server capabilities document, generated from the registry
#[derive(Debug, Clone)]
struct XcapCapsUsage {
    document: String,
}

impl AppUsage for XcapCapsUsage {
    fn id(&self) -> &str {
        "xcap-caps"
    }

    fn default_namespace(&self) -> &str {
        XCAP_CAPS_NAMESPACE
    }

    fn mime_type(&self) -> &str {
        "application/xcap-caps+xml"
    }

    fn default_document(&self) -> Option<String> {
        Some(self.document.clone())
    }

    /// Read-only, global only
    fn is_authorized(&self, _requester: &Requester, document: &DocumentSelector, method: Method) -> bool {
        document.is_global() && method == Method::Get
    }
}

/// Application usages by id
#[derive(Clone, Default)]
pub struct AppUsageRegistry {
    usages: BTreeMap<String, Arc<dyn AppUsage>>,
}

impl AppUsageRegistry {
    /// Empty registry
    pub fn new() -> Self {
        AppUsageRegistry::default()
    }

    /// Registry with the standard usages and `xcap-caps`
    pub fn with_defaults() -> Self {
        let mut registry = AppUsageRegistry::new();
        let pres_rules_ns = "urn:ietf:params:xml:ns:pres-rules";
        for usage in [
            GenericAppUsage::new(
                "resource-lists",
                "urn:ietf:params:xml:ns:resource-lists",
                "application/resource-lists+xml",
            ),
            GenericAppUsage::new(
                "rls-services",
                "urn:ietf:params:xml:ns:rls-services",
                "application/rls-services+xml",
            ),
            GenericAppUsage::new("pres-rules", pres_rules_ns, "application/auth-policy+xml").with_fixed_path("index.xml"),
            GenericAppUsage::new("org.openmobilealliance.pres-rules", pres_rules_ns, "application/auth-policy+xml")
                .stored_as("pres-rules")
                .with_fixed_path("index.xml"),
            GenericAppUsage::new("pidf-manipulation", "urn:ietf:params:xml:ns:pidf", "application/pidf+xml"),
            GenericAppUsage::new("test-app", "test-app", "application/test-app+xml"),
        ] {
            registry.register(Arc::new(usage));
        }
        registry
    }

    /// Add or replace a usage; the capabilities document follows
    pub fn register(&mut self, usage: Arc<dyn AppUsage>) {
        self.usages.insert(usage.id().to_string(), usage);
        let caps = XcapCapsUsage {
            document: self.caps_document(),
        };
        self.usages.insert(caps.id().to_string(), Arc::new(caps));
    }

    pub fn lookup(&self, application_id: &str) -> Option<Arc<dyn AppUsage>> {
        self.usages.get(application_id).cloned()
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.usages.keys().map(String::as_str)
    }

    fn caps_document(&self) -> String {
        let mut auids: Vec<&str> = self.usages.keys().map(String::as_str).collect();
        if !auids.contains(&"xcap-caps") {
            auids.push("xcap-caps");
            auids.sort_unstable();
        }
        let mut namespaces: Vec<&str> = self.usages.values().map(|u| u.default_namespace()).collect();
        namespaces.push(XCAP_CAPS_NAMESPACE);
        namespaces.sort_unstable();
        namespaces.dedup();

        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(&format!("<xcap-caps xmlns=\"{}\">\n  <auids>\n", XCAP_CAPS_NAMESPACE));
        for auid in auids {
            out.push_str(&format!("    <auid>{}</auid>\n", auid));
        }
        out.push_str("  </auids>\n  <namespaces>\n");
        for namespace in namespaces {
            out.push_str(&format!("    <namespace>{}</namespace>\n", namespace));
        }
        out.push_str("  </namespaces>\n</xcap-caps>\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::XmlDocument;

    fn selector(app: &str, scope: Scope) -> DocumentSelector {
        DocumentSelector {
            xcap_root: "http://xcap.example.com".into(),
            application_id: app.into(),
            scope,
            document_path: "index".into(),
        }
    }

    #[test]
    fn test_defaults_registered() {
        let registry = AppUsageRegistry::with_defaults();
        let rl = registry.lookup("resource-lists").unwrap();
        assert_eq!(rl.default_namespace(), "urn:ietf:params:xml:ns:resource-lists");
        assert_eq!(rl.mime_type(), "application/resource-lists+xml");
        assert!(registry.lookup("unknown-app").is_none());
    }

    #[test]
    fn test_pres_rules_alias_and_path() {
        let registry = AppUsageRegistry::with_defaults();
        let oma = registry.lookup("org.openmobilealliance.pres-rules").unwrap();
        assert_eq!(oma.storage_id(), "pres-rules");
        assert_eq!(oma.normalize_document_path("whatever.xml"), "index.xml");
        let rl = registry.lookup("resource-lists").unwrap();
        assert_eq!(rl.normalize_document_path("friends"), "friends");
    }

    #[test]
    fn test_authorization() {
        let registry = AppUsageRegistry::with_defaults();
        let rl = registry.lookup("resource-lists").unwrap();
        let alice = UserId::new("alice", "example.com");
        let bob = Requester::User(UserId::new("bob", "example.com"));
        let own = selector("resource-lists", Scope::User(alice.clone()));

        assert!(rl.is_authorized(&Requester::User(alice.clone()), &own, Method::Put));
        assert!(!rl.is_authorized(&bob, &own, Method::Get));
        assert!(rl.is_authorized(&Requester::TrustedPeer, &own, Method::Delete));
        assert!(rl.is_authorized(&bob, &selector("resource-lists", Scope::Global), Method::Get));
        assert!(!rl.is_authorized(&bob, &selector("resource-lists", Scope::Global), Method::Put));
    }

    #[test]
    fn test_caps_document() {
        let mut registry = AppUsageRegistry::with_defaults();
        registry.register(Arc::new(GenericAppUsage::new("watchers", "urn:watchers", "application/xml")));
        let caps = registry.lookup("xcap-caps").unwrap();
        let document = caps.default_document().unwrap();
        assert!(document.contains("<auid>watchers</auid>"));
        assert!(document.contains("<auid>xcap-caps</auid>"));
        assert!(document.contains("<namespace>urn:watchers</namespace>"));
        assert!(XmlDocument::parse(&document).is_ok());

        let requester = Requester::TrustedPeer;
        assert!(caps.is_authorized(&requester, &selector("xcap-caps", Scope::Global), Method::Get));
        assert!(!caps.is_authorized(&requester, &selector("xcap-caps", Scope::Global), Method::Put));
    }
}
