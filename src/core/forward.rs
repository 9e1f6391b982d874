//! The request-forwarding engine.
//!
//! [`ProxyService`] is the single entry point: demux the request to a
//! node, compose that node's middleware chain around the core forwarding
//! handler, run it. The core handler rebuilds the upstream request,
//! executes it through the node's client, applies the mangler chain, and
//! relays the result. Requests no node claims go through an explicitly
//! constructed passthrough node instead of any hidden global.
use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderValue, Request, Response, StatusCode, Uri, header, request::Parts};

use crate::{
    core::{body::ProxyBody, client::UpstreamClient, node::ProxyNode},
    ports::{
        connection::{ConnectionGuard, TlsTerminated},
        http_client::UpstreamError,
        transform::{BoxHandler, Handler, RequestContext},
    },
};

/// The proxy's request-handling entry point.
///
/// Holds the configured routing tree plus the default passthrough node
/// used when nothing matches. Construction finalizes the tree: the
/// service only hands out shared references, so the tree is read-only and
/// safely shared by all concurrent requests from here on.
pub struct ProxyService {
    root: ProxyNode,
    passthrough: ProxyNode,
}

impl ProxyService {
    pub fn new(root: ProxyNode) -> Self {
        // Same transport (and connection pool) as the tree, default
        // policy, no matchers or transforms.
        let passthrough = ProxyNode::new(UpstreamClient::new(root.client().transport()));
        Self { root, passthrough }
    }

    pub fn root(&self) -> &ProxyNode {
        &self.root
    }

    /// Handle one HTTP exchange.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let node = match self.root.demux(&request) {
            Some(node) => node,
            None => {
                tracing::info!(
                    method = %request.method(),
                    uri = %request.uri(),
                    "nothing matched, relaying unmodified"
                );
                &self.passthrough
            }
        };

        // Right-to-left composition: the first middleware added ends up
        // outermost and sees the request before any other.
        let mut handler: BoxHandler<'_> = Box::new(ForwardHandler { node });
        for middleware in node.middlewares.iter().rev() {
            handler = middleware.wrap(handler);
        }

        handler.handle(request).await
    }
}

struct ForwardHandler<'a> {
    node: &'a ProxyNode,
}

#[async_trait]
impl Handler for ForwardHandler<'_> {
    async fn handle(&self, request: Request<Body>) -> Response<Body> {
        self.node.forward(request).await
    }
}

impl ProxyNode {
    /// Forward a request upstream and relay the (possibly mangled)
    /// response.
    pub(crate) async fn forward(&self, request: Request<Body>) -> Response<Body> {
        let (parts, body) = request.into_parts();

        let upstream = match build_upstream_request(&parts, body) {
            Ok(upstream) => upstream,
            Err(err) => {
                tracing::error!(error = %err, "cannot build upstream request");
                return self.fail(parts).await;
            }
        };

        let cx = RequestContext::new(
            parts.method.clone(),
            upstream.uri().clone(),
            parts.headers.clone(),
        );

        match self.client.execute(upstream).await {
            Ok(response) => {
                let response = self.mangle(&cx, response.map(ProxyBody::Stream)).await;
                relay(response)
            }
            Err(err) => {
                tracing::error!(error = %err, uri = %cx.uri, "upstream request failed");
                self.fail(parts).await
            }
        }
    }

    /// Run the mangler chain in insertion order. Redirect responses skip
    /// the chain entirely unless this node opted in via
    /// [`set_mangle_redirects`](Self::set_mangle_redirects).
    pub async fn mangle(
        &self,
        cx: &RequestContext,
        mut response: Response<ProxyBody>,
    ) -> Response<ProxyBody> {
        if response.status().is_redirection() && !self.mangle_redirects {
            return response;
        }

        for mangler in &self.manglers {
            response = mangler.mangle(cx, response).await;
        }
        response
    }

    /// The transport-failure branch: error handler if configured, else
    /// drop the client connection when the capability is present, else a
    /// generic 502. Transport failures are never retried here.
    async fn fail(&self, parts: Parts) -> Response<Body> {
        if let Some(handler) = &self.error_handler {
            let request = Request::from_parts(parts, Body::empty());
            return handler.handle(request).await;
        }

        if let Some(guard) = parts.extensions.get::<ConnectionGuard>() {
            tracing::warn!("dropping client connection after upstream failure");
            guard.abort();
        }

        // Reaches the wire only when no guard was available (or the drop
        // races the write); either way the client sees a failure.
        status_response(StatusCode::BAD_GATEWAY)
    }
}

/// Reconstruct the request to send upstream: scheme from the inbound TLS
/// marker, host from the URI authority or the `Host` header, original
/// path and query; method, headers, and body verbatim.
fn build_upstream_request(parts: &Parts, body: Body) -> Result<Request<Body>, UpstreamError> {
    let scheme = if parts.extensions.get::<TlsTerminated>().is_some() {
        "https"
    } else {
        "http"
    };

    let authority = parts
        .uri
        .authority()
        .map(|a| a.to_string())
        .or_else(|| {
            parts
                .headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .ok_or_else(|| UpstreamError::InvalidRequest("request carries no host".to_string()))?;

    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or("/", |pq| pq.as_str());

    let uri: Uri = format!("{scheme}://{authority}{path_and_query}")
        .parse()
        .map_err(|e| UpstreamError::InvalidRequest(format!("{e}")))?;

    let mut upstream = Request::new(body);
    *upstream.method_mut() = parts.method.clone();
    *upstream.uri_mut() = uri;
    *upstream.headers_mut() = parts.headers.clone();
    Ok(upstream)
}

/// Copy the mangled response into the client-facing one: status, every
/// header name/value pair verbatim (multi-value headers preserved as
/// separate entries), then the body.
fn relay(response: Response<ProxyBody>) -> Response<Body> {
    let (parts, body) = response.into_parts();

    let mut relayed = Response::new(Body::empty());
    *relayed.status_mut() = parts.status;
    *relayed.version_mut() = parts.version;

    let headers = relayed.headers_mut();
    for (name, value) in parts.headers.iter() {
        headers.append(name, value.clone());
    }

    // A transform may have re-buffered the body to a different size; the
    // announced length must match what is actually written.
    if let ProxyBody::Buffered(bytes) = &body {
        if headers.contains_key(header::CONTENT_LENGTH) {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        }
    }

    *relayed.body_mut() = body.into_body();
    relayed
}

fn status_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}
