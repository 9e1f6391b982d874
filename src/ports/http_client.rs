use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use http::{Request, Response};
use thiserror::Error;

/// Failures raised by the upstream transport.
///
/// Everything here is a transport-level failure: there is no meaningful
/// HTTP response to relay, so the forwarding engine routes these into its
/// explicit failure branch. Transform failures never surface through this
/// type.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// DNS resolution, TCP connect, or TLS handshake failure.
    #[error("connection error: {0}")]
    Connect(String),

    /// The configured per-node timeout elapsed before a response arrived.
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be turned into a valid wire request.
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for upstream transport operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// The port for dispatching one request to an origin server.
///
/// Implementations own connection pooling and reuse; a single transport is
/// shared by every node that inherited it and must be safe for concurrent
/// use. Retry policy does not belong here or in the forwarding engine.
#[async_trait]
pub trait UpstreamTransport: Send + Sync + 'static {
    async fn send(&self, request: Request<Body>) -> UpstreamResult<Response<Body>>;
}
