//! Request handling
//!
//! `XcapServer` runs one XCAP request end to end: URI parsing, application
//! lookup, authorization, then a single `DocumentStore::update` in which the
//! precondition check, the mutation and the new ETag all happen under the
//! document's lock. Committed changes go to the `ChangeNotifier` afterwards.

use crate::appusage::{AppUsage, AppUsageRegistry, Requester};
use crate::config::{ConfigError, ServerConfig};
use crate::error::XcapError;
use crate::etag::{check_precondition, generate_etag, ETag, Preconditions};
use crate::mutation::{Deletion, MutationEngine};
use crate::notify::{ChangeNotifier, TracingNotifier};
use crate::selector::{ParsedUri, Scope, UriParser};
use crate::store::{Commit, DocumentEntry, DocumentKey, DocumentStore, StoredDocument};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Delete,
}

impl Method {
    /// Parse an HTTP method name
    pub fn parse(name: &str) -> Option<Method> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One XCAP request as handed over by a protocol front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XcapRequest {
    pub method: Method,
    pub uri: String,
    pub requester: Requester,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub preconditions: Preconditions,
}

impl XcapRequest {
    fn new(method: Method, uri: impl Into<String>, requester: Requester) -> Self {
        XcapRequest {
            method,
            uri: uri.into(),
            requester,
            content_type: None,
            body: Vec::new(),
            preconditions: Preconditions::none(),
        }
    }

    pub fn get(uri: impl Into<String>, requester: Requester) -> Self {
        XcapRequest::new(Method::Get, uri, requester)
    }

    pub fn put(uri: impl Into<String>, requester: Requester, body: impl Into<Vec<u8>>) -> Self {
        XcapRequest {
            body: body.into(),
            ..XcapRequest::new(Method::Put, uri, requester)
        }
    }

    pub fn delete(uri: impl Into<String>, requester: Requester) -> Self {
        XcapRequest::new(Method::Delete, uri, requester)
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add an `If-Match` header value
    pub fn with_if_match(mut self, header: &str) -> Self {
        self.preconditions.if_match = Preconditions::if_match(header).if_match;
        self
    }

    /// Add an `If-None-Match` header value
    pub fn with_if_none_match(mut self, header: &str) -> Self {
        self.preconditions.if_none_match = Preconditions::if_none_match(header).if_none_match;
        self
    }
}

/// Response to send back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XcapResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub etag: Option<ETag>,
}

impl XcapResponse {
    fn empty(status: u16, etag: Option<ETag>) -> Self {
        XcapResponse {
            status,
            content_type: None,
            body: Vec::new(),
            etag,
        }
    }

    /// Status and body for a failed request
    pub fn from_error(error: &XcapError) -> Self {
        let (content_type, body) = match error.body() {
            Some((mime, body)) => (Some(mime.to_string()), body.into_bytes()),
            None => (None, Vec::new()),
        };
        XcapResponse {
            status: error.status(),
            content_type,
            body,
            etag: None,
        }
    }

    /// Body as text, for logs and tests
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A request resolved to its application and storage key
struct Target {
    parsed: ParsedUri,
    usage: Arc<dyn AppUsage>,
    key: DocumentKey,
}

/// XCAP request processor over a document store
pub struct XcapServer {
    parser: UriParser,
    registry: AppUsageRegistry,
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn ChangeNotifier>,
}

impl XcapServer {
    pub fn new(parser: UriParser, registry: AppUsageRegistry, store: Arc<dyn DocumentStore>) -> Self {
        XcapServer {
            parser,
            registry,
            store,
            notifier: Arc::new(TracingNotifier),
        }
    }

    /// Build from a validated configuration
    pub fn from_config(config: &ServerConfig, store: Arc<dyn DocumentStore>) -> Result<Self, ConfigError> {
        let roots = config.validate()?;
        let parser = UriParser::new(roots, config.server.selector_cache_size);
        Ok(XcapServer::new(parser, config.registry(), store))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn registry(&self) -> &AppUsageRegistry {
        &self.registry
    }

    /// Run a request; failures become error responses
    pub fn handle(&self, request: &XcapRequest) -> XcapResponse {
        let result = match request.method {
            Method::Get => self.get(request),
            Method::Put => self.put(request),
            Method::Delete => self.delete(request),
        };
        match result {
            Ok(response) => {
                debug!(method = %request.method, uri = %request.uri, status = response.status, "request handled");
                response
            }
            Err(e) => {
                debug!(method = %request.method, uri = %request.uri, status = e.status(), error = %e, "request failed");
                XcapResponse::from_error(&e)
            }
        }
    }

    pub fn get(&self, request: &XcapRequest) -> Result<XcapResponse, XcapError> {
        let target = self.resolve(request)?;
        let engine = MutationEngine::new(target.usage.as_ref(), &target.parsed.namespaces);

        let (content, etag) = match self.store.fetch(&target.key)? {
            Some(stored) => {
                check_precondition(Some(&stored.etag), &request.preconditions, true)?;
                (stored.content, Some(stored.etag))
            }
            None => {
                check_precondition(None, &request.preconditions, true)?;
                let default = target
                    .usage
                    .default_document()
                    .ok_or_else(|| XcapError::NotFound(format!("document not found: {}", target.parsed.document)))?;
                (default.into_bytes(), None)
            }
        };

        let fetched = engine.get(&content, &target.parsed.node)?;
        Ok(XcapResponse {
            status: 200,
            content_type: Some(fetched.content_type),
            body: fetched.body,
            etag,
        })
    }

    pub fn put(&self, request: &XcapRequest) -> Result<XcapResponse, XcapError> {
        let target = self.resolve(request)?;
        let engine = MutationEngine::new(target.usage.as_ref(), &target.parsed.namespaces);
        let document_uri = target.parsed.document.to_string();

        let mut created = false;
        let outcome = self.store.update(&target.key, &mut |current| {
            check_precondition(current.map(|d| &d.etag), &request.preconditions, false)?;
            let result = engine.put(
                current.map(|d| d.content.as_slice()),
                &target.parsed.node,
                &request.body,
                request.content_type.as_deref(),
            )?;
            created = result.created;
            Ok(Commit::Write(StoredDocument {
                content: result.content,
                etag: generate_etag(&document_uri),
            }))
        })?;

        self.notifier
            .document_changed(&document_uri, outcome.previous.as_ref(), outcome.current.as_ref());
        Ok(XcapResponse::empty(if created { 201 } else { 200 }, outcome.current))
    }

    pub fn delete(&self, request: &XcapRequest) -> Result<XcapResponse, XcapError> {
        let target = self.resolve(request)?;
        let engine = MutationEngine::new(target.usage.as_ref(), &target.parsed.namespaces);
        let document_uri = target.parsed.document.to_string();

        let outcome = self.store.update(&target.key, &mut |current| {
            check_precondition(current.map(|d| &d.etag), &request.preconditions, false)?;
            let current = current.ok_or_else(|| XcapError::NotFound(format!("document not found: {}", document_uri)))?;
            Ok(match engine.delete(&current.content, &target.parsed.node)? {
                Deletion::DocumentRemoved => Commit::Remove,
                Deletion::Updated(content) => Commit::Write(StoredDocument {
                    content,
                    etag: generate_etag(&document_uri),
                }),
            })
        })?;

        self.notifier
            .document_changed(&document_uri, outcome.previous.as_ref(), outcome.current.as_ref());
        Ok(XcapResponse::empty(200, outcome.current))
    }

    /// Remove every document of `application_id` in `scope`
    pub fn delete_all_documents(&self, scope: &Scope, application_id: &str) -> Result<usize, XcapError> {
        let storage_id = self
            .registry
            .lookup(application_id)
            .map(|usage| usage.storage_id().to_string())
            .unwrap_or_else(|| application_id.to_string());
        let removed = self.store.delete_all(scope, &storage_id)?;
        debug!(application_id, removed, "deleted all documents");
        Ok(removed)
    }

    /// Documents stored for a scope
    pub fn list_documents(&self, scope: &Scope) -> Result<Vec<DocumentEntry>, XcapError> {
        Ok(self.store.list_documents(scope)?)
    }

    fn resolve(&self, request: &XcapRequest) -> Result<Target, XcapError> {
        let parsed = self.parser.parse(&request.uri)?;
        let usage = self
            .registry
            .lookup(&parsed.document.application_id)
            .ok_or_else(|| XcapError::NotFound(format!("unknown application: {}", parsed.document.application_id)))?;
        if !usage.is_authorized(&request.requester, &parsed.document, request.method) {
            return Err(XcapError::Forbidden);
        }
        let key = DocumentKey {
            application_id: usage.storage_id().to_string(),
            scope: parsed.document.scope.clone(),
            document_path: usage.normalize_document_path(&parsed.document.document_path),
        };
        Ok(Target { parsed, usage, key })
    }
}
