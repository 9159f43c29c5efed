//! xcapcore - XCAP (RFC 4825) document engine
//!
//! Layers, bottom up:
//! - core: XML tokenizer and character/entity rules
//! - dom: lossless arena document with namespace lookup
//! - selector: XCAP URI and node selector parsing
//! - resolve: selector evaluation against a document
//! - mutation: GET/PUT/DELETE on one document
//! - server: request flow over a `DocumentStore` with ETags and notification
//!
//! ```no_run
//! use std::sync::Arc;
//! use xcapcore::{Requester, ServerConfig, MemoryStore, XcapRequest, XcapServer};
//!
//! let config = ServerConfig::from_toml("[server]\nroot = [\"http://xcap.example.com/xcap-root\"]\n")?;
//! let server = XcapServer::from_config(&config, Arc::new(MemoryStore::new()))?;
//! let response = server.handle(&XcapRequest::get(
//!     "http://xcap.example.com/xcap-root/xcap-caps/global/index",
//!     Requester::TrustedPeer,
//! ));
//! assert_eq!(response.status, 200);
//! # Ok::<(), xcapcore::ConfigError>(())
//! ```

pub mod appusage;
pub mod config;
pub mod core;
pub mod dom;
pub mod error;
pub mod etag;
pub mod mutation;
pub mod notify;
pub mod resolve;
pub mod selector;
pub mod server;
pub mod store;

pub use appusage::{AppUsage, AppUsageRegistry, GenericAppUsage, Requester};
pub use config::{ConfigError, ServerConfig};
pub use dom::XmlDocument;
pub use error::{ConflictTag, StoreError, XcapError};
pub use etag::{check_precondition, generate_etag, ETag, Preconditions};
pub use mutation::MutationEngine;
pub use notify::{ChangeNotifier, RecordingNotifier, TracingNotifier};
pub use resolve::{Navigator, ResolvedTarget};
pub use selector::{NodeSelector, ParsedUri, RootConfig, Scope, UriParser, UserId};
pub use server::{Method, XcapRequest, XcapResponse, XcapServer};
pub use store::{DocumentStore, MemoryStore};
