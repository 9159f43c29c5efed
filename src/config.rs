//! Server configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! [server]
//! root = ["http://xcap.example.com/xcap-root"]
//! default_realm = "example.com"
//! allow_extension_selectors = false
//! selector_cache_size = 512
//!
//! [[applications]]
//! id = "watchers"
//! namespace = "http://openxcap.org/ns/watchers"
//! mime_type = "application/xml"
//! ```
//!
//! The configuration is immutable once validated; `validate` turns it into
//! the `RootConfig` the URI parser is built with.

use crate::appusage::{AppUsageRegistry, GenericAppUsage};
use crate::selector::RootConfig;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid XCAP root '{root}': {reason}")]
    InvalidRoot { root: String, reason: String },

    #[error("at least one XCAP root is required")]
    NoRoot,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,

    /// Extra application usages
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

/// `[server]` table
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// XCAP root URIs
    #[serde(default)]
    pub root: Vec<String>,

    /// Domain for XUIs that carry none
    #[serde(default)]
    pub default_realm: Option<String>,

    #[serde(default)]
    pub allow_extension_selectors: bool,

    /// Parsed node selectors kept for reuse; 0 disables the cache
    #[serde(default = "default_selector_cache_size")]
    pub selector_cache_size: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            root: Vec::new(),
            default_realm: None,
            allow_extension_selectors: false,
            selector_cache_size: default_selector_cache_size(),
        }
    }
}

fn default_selector_cache_size() -> usize {
    512
}

/// One `[[applications]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApplicationConfig {
    pub id: String,
    pub namespace: String,
    pub mime_type: String,
    /// Share storage with another application id
    #[serde(default)]
    pub storage_id: Option<String>,
    /// Store every document under this one path
    #[serde(default)]
    pub document_path: Option<String>,
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check the roots and build the URI parser configuration
    ///
    /// A root that is a path prefix of one already accepted (or the other way
    /// round) would make root matching ambiguous; it is dropped with a warning.
    pub fn validate(&self) -> Result<RootConfig, ConfigError> {
        let mut accepted: Vec<String> = Vec::new();
        for root in &self.server.root {
            let url = Url::parse(root).map_err(|e| ConfigError::InvalidRoot {
                root: root.clone(),
                reason: e.to_string(),
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidRoot {
                    root: root.clone(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
            if url.host_str().is_none() {
                return Err(ConfigError::InvalidRoot {
                    root: root.clone(),
                    reason: "missing host".into(),
                });
            }
            if url.query().is_some() || url.fragment().is_some() {
                return Err(ConfigError::InvalidRoot {
                    root: root.clone(),
                    reason: "a root cannot carry a query or fragment".into(),
                });
            }

            let root = root.trim_end_matches('/').to_string();
            if let Some(existing) = accepted.iter().find(|a| overlaps(a, &root)) {
                warn!(root = %root, existing = %existing, "ignoring XCAP root that overlaps another");
                continue;
            }
            accepted.push(root);
        }
        if accepted.is_empty() {
            return Err(ConfigError::NoRoot);
        }

        let mut config = RootConfig::new(accepted).with_extension_selectors(self.server.allow_extension_selectors);
        if let Some(realm) = &self.server.default_realm {
            config = config.with_default_realm(realm.clone());
        }
        Ok(config)
    }

    /// Default usages plus the configured ones
    pub fn registry(&self) -> AppUsageRegistry {
        let mut registry = AppUsageRegistry::with_defaults();
        for app in &self.applications {
            let mut usage = GenericAppUsage::new(app.id.clone(), app.namespace.clone(), app.mime_type.clone());
            if let Some(storage_id) = &app.storage_id {
                usage = usage.stored_as(storage_id.clone());
            }
            if let Some(path) = &app.document_path {
                usage = usage.with_fixed_path(path.clone());
            }
            registry.register(Arc::new(usage));
        }
        registry
    }
}

/// One root equals the other or contains it as a path prefix
fn overlaps(a: &str, b: &str) -> bool {
    let is_prefix = |short: &str, long: &str| {
        long.strip_prefix(short)
            .map(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(false)
    };
    is_prefix(a, b) || is_prefix(b, a)
}
