//! XCAP URI parsing
//!
//! ```text
//! <xcap-root>/<app-id>/global/<path>[/~~/<node-selector>][?<xmlns-bindings>]
//! <xcap-root>/<app-id>/users/<xui>/<path>[/~~/<node-selector>][?...]
//! <xcap-root>/<app-id>/users/<domain>/<user>/<path>[/~~/<node-selector>][?...]
//! ```
//!
//! The parser is built from an immutable `RootConfig`; parsing itself has no
//! side effects beyond filling the selector cache.

use super::cache::SelectorCache;
use super::parser::NodeSelector;
use super::{ParseError, ParseErrorKind};
use percent_encoding::percent_decode_str;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Body of the 404 returned for requests on the bare XCAP root
pub const WELCOME: &str = concat!(
    "<html><head><title>Not Found</title></head>",
    "<body><h1>Not Found</h1>XCAP server does not serve anything ",
    "directly under XCAP Root URL. You have to be more specific.",
    "<br><br>",
    "<address>xcapcore/",
    env!("CARGO_PKG_VERSION"),
    "</address>",
    "</body></html>"
);

const NODE_SEPARATOR: &str = "/~~";

/// Immutable URI parsing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootConfig {
    roots: Vec<String>,
    default_realm: Option<String>,
    allow_extensions: bool,
}

impl RootConfig {
    /// Roots are stored without a trailing `/`
    pub fn new<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RootConfig {
            roots: roots
                .into_iter()
                .map(|r| {
                    let r: String = r.into();
                    r.trim_end_matches('/').to_string()
                })
                .collect(),
            default_realm: None,
            allow_extensions: false,
        }
    }

    /// Domain given to XUIs that carry none
    pub fn with_default_realm(mut self, realm: impl Into<String>) -> Self {
        self.default_realm = Some(realm.into());
        self
    }

    /// Accept extension selector steps instead of rejecting them
    pub fn with_extension_selectors(mut self, allow: bool) -> Self {
        self.allow_extensions = allow;
        self
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn default_realm(&self) -> Option<&str> {
        self.default_realm.as_deref()
    }

    /// Longest root that prefixes `uri` and ends at a path boundary
    fn match_root(&self, uri: &str) -> Option<&str> {
        self.roots
            .iter()
            .filter(|root| {
                uri.strip_prefix(root.as_str())
                    .map(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
                    .unwrap_or(false)
            })
            .max_by_key(|root| root.len())
            .map(String::as_str)
    }
}

/// XCAP user identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId {
    pub username: String,
    pub domain: Option<String>,
}

impl UserId {
    pub fn new(username: impl Into<String>, domain: impl Into<String>) -> Self {
        UserId {
            username: username.into(),
            domain: Some(domain.into()),
        }
    }

    /// Parse `user@domain`, optionally `sip:`/`sips:` prefixed
    pub fn parse(xui: &str) -> UserId {
        let bare = xui
            .strip_prefix("sip:")
            .or_else(|| xui.strip_prefix("sips:"))
            .unwrap_or(xui);
        match bare.rsplit_once('@') {
            Some((user, domain)) if !domain.is_empty() => UserId::new(user, domain),
            Some((user, _)) => UserId {
                username: user.to_string(),
                domain: None,
            },
            None => UserId {
                username: bare.to_string(),
                domain: None,
            },
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.domain {
            Some(domain) => write!(f, "{}@{}", self.username, domain),
            None => f.write_str(&self.username),
        }
    }
}

/// Document context
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    User(UserId),
}

/// Document selector part of an XCAP URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSelector {
    pub xcap_root: String,
    pub application_id: String,
    pub scope: Scope,
    pub document_path: String,
}

impl DocumentSelector {
    pub fn user(&self) -> Option<&UserId> {
        match &self.scope {
            Scope::User(user) => Some(user),
            Scope::Global => None,
        }
    }

    pub fn is_global(&self) -> bool {
        self.scope == Scope::Global
    }
}

impl fmt::Display for DocumentSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::Global => write!(f, "{}/{}/global/{}", self.xcap_root, self.application_id, self.document_path),
            Scope::User(user) => write!(
                f,
                "{}/{}/users/{}/{}",
                self.xcap_root, self.application_id, user, self.document_path
            ),
        }
    }
}

/// Fully parsed XCAP URI
#[derive(Debug, Clone)]
pub struct ParsedUri {
    /// Request URI as received
    pub uri: String,
    pub document: DocumentSelector,
    /// Empty selector addresses the whole document
    pub node: Arc<NodeSelector>,
    /// Prefix bindings from `xmlns(prefix=uri)` query expressions
    pub namespaces: Vec<(String, String)>,
}

impl ParsedUri {
    pub fn targets_document(&self) -> bool {
        self.node.is_empty()
    }

    /// Bound URI for a query prefix
    pub fn query_namespace(&self, prefix: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }
}

/// URI failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("XCAP root not found for URI: {0}")]
    NoRoot(String),
    #[error("request addresses the XCAP root")]
    RootAccess,
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// XCAP URI parser
pub struct UriParser {
    config: RootConfig,
    cache: SelectorCache,
}

impl UriParser {
    pub fn new(config: RootConfig, cache_capacity: usize) -> Self {
        let cache = SelectorCache::new(cache_capacity, config.allow_extensions);
        UriParser { config, cache }
    }

    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    /// Parse a full request URI
    pub fn parse(&self, uri: &str) -> Result<ParsedUri, UriError> {
        let root = self
            .config
            .match_root(uri)
            .ok_or_else(|| UriError::NoRoot(uri.to_string()))?;
        let remainder = &uri[root.len()..];
        let (path, query) = match remainder.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (remainder, None),
        };
        if path.is_empty() || path == "/" {
            return Err(UriError::RootAccess);
        }

        let (doc_part, node_part) = split_node_selector(path);
        let document = self.parse_document_selector(root, doc_part)?;

        let node = match node_part {
            Some(raw) => {
                let decoded = strict_decode(raw).map_err(|m| ParseError::new(ParseErrorKind::NodeSelector, m))?;
                let node = self.cache.get_or_parse(&decoded)?;
                // `~~` present means at least one step; only its absence selects the document
                if node.is_empty() {
                    return Err(ParseError::new(ParseErrorKind::NodeSelector, "empty node selector").into());
                }
                node
            }
            None => Arc::new(NodeSelector::default()),
        };
        let namespaces = match query {
            Some(q) if !q.is_empty() => parse_xmlns_query(q)?,
            _ => Vec::new(),
        };

        debug!(uri = %uri, document = %document, node = %node, "parsed XCAP URI");
        Ok(ParsedUri {
            uri: uri.to_string(),
            document,
            node,
            namespaces,
        })
    }

    fn parse_document_selector(&self, root: &str, doc_part: &str) -> Result<DocumentSelector, ParseError> {
        let err = |m: String| ParseError::new(ParseErrorKind::DocumentSelector, m);
        let body = doc_part
            .strip_prefix('/')
            .ok_or_else(|| err(format!("'{}' must start with '/'", doc_part)))?;
        let segments = body
            .split('/')
            .map(|s| {
                let decoded = strict_decode(s).map_err(|m| err(m.to_string()))?;
                if decoded.contains('/') {
                    return Err(err(format!("segment '{}' encodes a '/'", s)));
                }
                Ok(decoded)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut segments = segments.into_iter();

        let application_id = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| err("missing application id".into()))?;

        let scope = match segments.next().as_deref() {
            Some("global") => Scope::Global,
            Some("users") => {
                let first = segments.next().ok_or_else(|| err("missing user".into()))?;
                let mut user = if first.contains('@') || first.starts_with("sip:") || first.starts_with("sips:") {
                    UserId::parse(&first)
                } else {
                    let username = segments.next().ok_or_else(|| err("missing user after domain".into()))?;
                    UserId::new(username, first)
                };
                if user.username.is_empty() {
                    return Err(err("empty user name".into()));
                }
                if user.domain.is_none() {
                    user.domain = self.config.default_realm.clone();
                }
                Scope::User(user)
            }
            Some(other) => return Err(err(format!("expected 'global' or 'users', found '{}'", other))),
            None => return Err(err("missing document context".into())),
        };

        let rest: Vec<String> = segments.collect();
        if rest.is_empty() || rest.iter().any(|s| s.is_empty() || s == "." || s == "..") {
            return Err(err(format!("invalid document path '{}'", rest.join("/"))));
        }

        Ok(DocumentSelector {
            xcap_root: root.to_string(),
            application_id,
            scope,
            document_path: rest.join("/"),
        })
    }
}

/// Split at the first `/~~` followed by `/` or the end of the path
fn split_node_selector(path: &str) -> (&str, Option<&str>) {
    let mut from = 0;
    while let Some(found) = path[from..].find(NODE_SEPARATOR) {
        let at = from + found;
        let after = &path[at + NODE_SEPARATOR.len()..];
        if after.is_empty() || after.starts_with('/') {
            return (&path[..at], Some(after));
        }
        from = at + NODE_SEPARATOR.len();
    }
    (path, None)
}

/// Percent-decode, rejecting malformed escapes and non-UTF-8 results
fn strict_decode(input: &str) -> Result<String, &'static str> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
            if !valid {
                return Err("malformed percent-encoding");
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    percent_decode_str(input)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| "percent-encoding does not decode to UTF-8")
}

/// Parse `xmlns(p=uri)xmlns(q=uri)`; `^` escapes `(`, `)` and `^`
fn parse_xmlns_query(query: &str) -> Result<Vec<(String, String)>, ParseError> {
    let err = |m: &str| ParseError::new(ParseErrorKind::NodeSelector, format!("{} in query '{}'", m, query));
    let decoded = strict_decode(query).map_err(err)?;
    let mut rest = decoded.as_str();
    let mut bindings = Vec::new();

    while !rest.is_empty() {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let body = rest.strip_prefix("xmlns(").ok_or_else(|| err("expected xmlns(...)"))?;
        let mut value = String::new();
        let mut chars = body.char_indices();
        let mut end = None;
        while let Some((i, c)) = chars.next() {
            match c {
                '^' => match chars.next() {
                    Some((_, escaped @ ('(' | ')' | '^'))) => value.push(escaped),
                    _ => return Err(err("invalid '^' escape")),
                },
                ')' => {
                    end = Some(i);
                    break;
                }
                c => value.push(c),
            }
        }
        let end = end.ok_or_else(|| err("unterminated xmlns("))?;
        let (prefix, uri) = value.split_once('=').ok_or_else(|| err("expected prefix=uri"))?;
        let prefix = prefix.trim();
        if !crate::core::scanner::is_qname(prefix) || prefix.contains(':') {
            return Err(err("invalid prefix"));
        }
        bindings.push((prefix.to_string(), uri.trim().to_string()));
        rest = &body[end + 1..];
    }
    Ok(bindings)
}
