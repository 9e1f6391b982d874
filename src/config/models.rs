//! Configuration data structures for remora.
//!
//! These types map directly to TOML (also JSON / YAML) configuration
//! files. They are serde-friendly and carry defaults so minimal configs
//! stay concise; the [`build`](crate::config::build) module turns a
//! validated config into the runtime routing tree.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Address the proxy listens on.
    pub listen_addr: String,
    /// Upstream client defaults, inherited by every node.
    pub upstream: UpstreamConfig,
    /// The root of the routing tree.
    pub root: NodeConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            upstream: UpstreamConfig::default(),
            root: NodeConfig::default(),
        }
    }
}

/// Defaults for the upstream client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Per-request timeout, as a humantime string (e.g. "8s", "2m").
    pub timeout: String,
    /// Maximum redirect hops to follow before relaying. 0 (the default)
    /// relays 3xx responses to the client untouched.
    pub max_redirects: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout: "8s".to_string(),
            max_redirects: 0,
        }
    }
}

/// One node of the routing tree.
///
/// All matcher fields are optional; a node without any matches everything
/// but yields to its children. Transform fields apply to this node only —
/// they are not inherited by children.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Regex matched against the request host.
    pub host: Option<String>,
    /// Literal path prefix match.
    pub path_prefix: Option<String>,
    /// Header matchers: header name to value regex.
    pub headers: HashMap<String, String>,

    /// Request header changes (`-name` delete, `+name` append, bare set).
    pub request_headers: HashMap<String, String>,
    /// Response header changes, same conventions.
    pub response_headers: HashMap<String, String>,
    /// Regex rewrites applied to response bodies.
    pub body_rewrites: Vec<RewriteRuleConfig>,

    /// Run the mangler chain on 3xx responses too.
    pub mangle_redirects: bool,
    /// Override the inherited upstream timeout for this node.
    pub timeout: Option<String>,

    pub children: Vec<NodeConfig>,
}

/// A single search/replace pair for body rewriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteRuleConfig {
    pub search: String,
    pub replace: String,
}
