//! Per-node upstream client policy.
//!
//! The transport (and its connection pool) is shared by every node that
//! inherited it; timeout and redirect policy travel by value and stay
//! independently mutable per node after a child is created.
use std::{sync::Arc, time::Duration};

use axum::body::Body;
use http::{Method, Request, Response, Uri, header};
use tokio::time::timeout;

use crate::ports::http_client::{UpstreamError, UpstreamResult, UpstreamTransport};

/// Default per-node upstream timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// What to do with 3xx upstream responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Relay redirects to the client untouched. The default: the client
    /// drives its own redirect handling.
    None,
    /// Follow up to `max` redirect hops before relaying. Only bodyless
    /// methods (GET, HEAD) are re-issued; a streamed request body cannot
    /// be replayed.
    Follow { max: usize },
}

/// The upstream client a routing node forwards through.
///
/// Cloning shares the transport but copies the policy, which is exactly
/// the inheritance rule for child nodes.
#[derive(Clone)]
pub struct UpstreamClient {
    transport: Arc<dyn UpstreamTransport>,
    timeout: Duration,
    redirect: RedirectPolicy,
}

impl UpstreamClient {
    pub fn new(transport: Arc<dyn UpstreamTransport>) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
            redirect: RedirectPolicy::None,
        }
    }

    pub fn transport(&self) -> Arc<dyn UpstreamTransport> {
        self.transport.clone()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn redirect_policy(&self) -> RedirectPolicy {
        self.redirect
    }

    pub fn set_redirect_policy(&mut self, policy: RedirectPolicy) {
        self.redirect = policy;
    }

    /// Dispatch one request, enforcing the node's timeout over the whole
    /// exchange (redirect hops included). A timed-out call surfaces as
    /// [`UpstreamError::Timeout`] and is treated by the forwarding engine
    /// like any other transport failure.
    pub async fn execute(&self, request: Request<Body>) -> UpstreamResult<Response<Body>> {
        match timeout(self.timeout, self.dispatch(request)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
        }
    }

    async fn dispatch(&self, request: Request<Body>) -> UpstreamResult<Response<Body>> {
        let RedirectPolicy::Follow { max } = self.redirect else {
            return self.transport.send(request).await;
        };

        let method = request.method().clone();
        let mut base = request.uri().clone();
        let mut response = self.transport.send(request).await?;

        if method != Method::GET && method != Method::HEAD {
            return Ok(response);
        }

        let mut hops = 0;
        while hops < max && response.status().is_redirection() {
            let Some(next) = redirect_target(&base, response.headers()) else {
                break;
            };
            tracing::debug!(location = %next, "following upstream redirect");
            let mut request = Request::new(Body::empty());
            *request.method_mut() = method.clone();
            *request.uri_mut() = next.clone();
            base = next;
            response = self.transport.send(request).await?;
            hops += 1;
        }

        Ok(response)
    }
}

/// Resolve the `Location` header against the previous request URI.
/// Unparseable targets end redirect following; the last response is
/// relayed as-is.
fn redirect_target(base: &Uri, headers: &http::HeaderMap) -> Option<Uri> {
    let location = headers.get(header::LOCATION)?.to_str().ok()?;

    if let Ok(uri) = location.parse::<Uri>() {
        if uri.scheme().is_some() {
            return Some(uri);
        }
    }

    let base = url::Url::parse(&base.to_string()).ok()?;
    let resolved = base.join(location).ok()?;
    resolved.as_str().parse().ok()
}
