//! Shared setup for the integration suites

#![allow(dead_code)]

use std::sync::Arc;
use xcapcore::{
    AppUsageRegistry, MemoryStore, RecordingNotifier, Requester, RootConfig, UriParser, UserId, XcapRequest,
    XcapResponse, XcapServer,
};

pub const ROOT: &str = "http://xcap.example.com/xcap-root";

pub struct Harness {
    pub server: XcapServer,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        let notifier = Arc::new(RecordingNotifier::new());
        let server = XcapServer::new(
            UriParser::new(RootConfig::new([ROOT]), 64),
            AppUsageRegistry::with_defaults(),
            Arc::new(MemoryStore::new()),
        )
        .with_notifier(notifier.clone());
        Harness { server, notifier }
    }

    /// Document URI of alice's `index` in `app`
    pub fn document_uri(&self, app: &str) -> String {
        format!("{}/{}/users/sip:alice@example.com/index", ROOT, app)
    }

    /// Node URI; `selector` starts with `/`
    pub fn node_uri(&self, app: &str, selector: &str) -> String {
        format!("{}/~~{}", self.document_uri(app), escape_selector(selector))
    }

    pub fn put_document(&self, app: &str, body: &str) -> XcapResponse {
        self.server.handle(&XcapRequest::put(self.document_uri(app), alice(), body))
    }

    pub fn get_document(&self, app: &str) -> XcapResponse {
        self.server.handle(&XcapRequest::get(self.document_uri(app), alice()))
    }

    pub fn put_element(&self, app: &str, selector: &str, body: &str) -> XcapResponse {
        let request = XcapRequest::put(self.node_uri(app, selector), alice(), body)
            .with_content_type("application/xcap-el+xml");
        self.server.handle(&request)
    }

    pub fn get(&self, app: &str, selector: &str) -> XcapResponse {
        self.server.handle(&XcapRequest::get(self.node_uri(app, selector), alice()))
    }

    pub fn delete(&self, app: &str, selector: &str) -> XcapResponse {
        self.server.handle(&XcapRequest::delete(self.node_uri(app, selector), alice()))
    }
}

pub fn alice() -> Requester {
    Requester::User(UserId::new("alice", "example.com"))
}

/// Percent-encode the characters a URI path cannot carry
fn escape_selector(selector: &str) -> String {
    selector.replace('"', "%22").replace('[', "%5B").replace(']', "%5D")
}
