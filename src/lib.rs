//! Remora - a programmable forward/reverse HTTP proxy.
//!
//! Remora accepts client requests, walks a tree of routing nodes to find
//! the one configuration node responsible for each request, forwards the
//! request upstream, and lets a chain of pluggable transforms rewrite the
//! outgoing request and the incoming response before it reaches the
//! client. It is built for operators who need to intercept, filter, and
//! rewrite HTTP traffic without writing a new proxy per use case.
//!
//! # Concepts
//! - **Node** ([`ProxyNode`]) — a configuration unit holding matchers,
//!   transforms, an upstream client, and child nodes. Nodes form a tree;
//!   demultiplexing picks the deepest node whose matchers claim the
//!   request, with first-attached-child winning ties.
//! - **Matcher** — predicate deciding whether a node claims a request.
//! - **Middleware** — request-side transform wrapping the next handler.
//! - **Mangler** — response-side transform rewriting the upstream
//!   response before it is relayed.
//!
//! Only the selected node's transform chains run for a request: chains
//! are never inherited or merged across tree levels. See [`ProxyNode`]
//! for the trade-off.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use remora::{HyperTransport, ProxyNode, ProxyService, UpstreamClient};
//! use remora::adapters::{HostMatcher, RegexRewriter};
//!
//! # fn main() -> eyre::Result<()> {
//! let transport = Arc::new(HyperTransport::new()?);
//! let mut root = ProxyNode::new(UpstreamClient::new(transport));
//!
//! let child = root.child();
//! child.add_matcher(HostMatcher::new(r"example\.com")?);
//! child.add_mangler(
//!     RegexRewriter::new().body_rule("http://", "https://")?,
//! );
//!
//! let service = Arc::new(ProxyService::new(root));
//! // mount the service in the bundled server adapter (see the binary)
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters**
//! (implementations) and keeps the routing/forwarding logic inside
//! `core`. The binary wires configuration, transport, and server
//! together; embedders can compose the same pieces directly.
//!
//! # Error Handling
//! Fallible APIs return `eyre::Result<T>` or a domain-specific error
//! type. Transform failures never abort a request: each transform
//! degrades to a pass-through for that invocation and logs locally.
pub mod adapters;
pub mod config;
pub mod core;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// Re-export the types most embedders need
pub use crate::{
    adapters::{HyperTransport, ProxyServer},
    core::{ProxyNode, ProxyService, RedirectPolicy, UpstreamClient},
    ports::{
        ConnectionGuard, Handler, Mangler, Matcher, Middleware, TlsTerminated, UpstreamTransport,
    },
    utils::GracefulShutdown,
};
