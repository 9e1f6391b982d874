//! Capability contracts for the transform pipeline.
//!
//! Three small traits drive everything the proxy does to traffic:
//! [`Matcher`] decides whether a routing node claims a request,
//! [`Middleware`] wraps the downstream handler to observe or mutate the
//! request before it is forwarded, and [`Mangler`] rewrites the upstream
//! response before it is relayed to the client. Each trait has a plain
//! closure adapter so callers can register either a stateful transform or a
//! simple function.
//!
//! All implementations must be safe to call from many concurrent requests;
//! any per-request state belongs on the request/response objects themselves,
//! never inside the transform.
use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderMap, Method, Request, Response, Uri};

use crate::core::body::ProxyBody;

/// Immutable snapshot of the inbound request, handed to every mangler.
///
/// `http::Response` does not carry the request that produced it, so the
/// forwarding engine captures method, resolved upstream URI, and headers
/// before the body is consumed and passes them down the mangler chain.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    /// The absolute URI the request was forwarded to.
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestContext {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }
}

/// Predicate deciding whether a routing node claims a request.
///
/// Must be pure: no side effects, no per-request mutable state.
pub trait Matcher: Send + Sync {
    fn matches(&self, request: &Request<Body>) -> bool;
}

/// Adapts a plain closure into a [`Matcher`].
pub struct MatcherFn<F>(pub F);

impl<F> Matcher for MatcherFn<F>
where
    F: Fn(&Request<Body>) -> bool + Send + Sync,
{
    fn matches(&self, request: &Request<Body>) -> bool {
        (self.0)(request)
    }
}

/// One HTTP exchange: a request in, a response out.
///
/// Trait objects may borrow node state for the duration of a single
/// request, so boxed handlers are not required to be `'static`.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: Request<Body>) -> Response<Body>;
}

/// A boxed handler valid for the lifetime of one request dispatch.
pub type BoxHandler<'a> = Box<dyn Handler + 'a>;

/// Adapts a plain closure into a [`Handler`].
pub struct HandlerFn<F>(pub F);

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: Fn(Request<Body>) -> Response<Body> + Send + Sync,
{
    async fn handle(&self, request: Request<Body>) -> Response<Body> {
        (self.0)(request)
    }
}

/// Request-side transform: receives the next handler and returns a handler
/// that runs its own logic around it.
///
/// The returned handler may mutate the request in place before delegating,
/// or short-circuit by producing a response itself. Either way it must
/// leave the request safe for consumption by the rest of the chain.
pub trait Middleware: Send + Sync {
    fn wrap<'a>(&'a self, next: BoxHandler<'a>) -> BoxHandler<'a>;
}

/// Adapts a plain request-mutation closure into a [`Middleware`].
///
/// The hook runs on the request, then the wrapped handler always delegates
/// to the next one. Short-circuiting requires implementing [`Middleware`]
/// directly.
pub struct MiddlewareFn<F>(pub F);

impl<F> Middleware for MiddlewareFn<F>
where
    F: Fn(&mut Request<Body>) + Send + Sync,
{
    fn wrap<'a>(&'a self, next: BoxHandler<'a>) -> BoxHandler<'a> {
        Box::new(HookHandler {
            hook: &self.0,
            next,
        })
    }
}

struct HookHandler<'a, F> {
    hook: &'a F,
    next: BoxHandler<'a>,
}

#[async_trait]
impl<F> Handler for HookHandler<'_, F>
where
    F: Fn(&mut Request<Body>) + Send + Sync,
{
    async fn handle(&self, mut request: Request<Body>) -> Response<Body> {
        (self.hook)(&mut request);
        self.next.handle(request).await
    }
}

/// Response-side transform: consumes an upstream response and returns the
/// response to hand to the next mangler (or the client).
///
/// Contract: a mangler that reads the body must return a response whose
/// body is fully re-readable from the start — leave it buffered via
/// [`crate::core::body::materialize`], never as a partially consumed
/// stream. Violating this silently corrupts every mangler downstream and
/// the client-visible body.
#[async_trait]
pub trait Mangler: Send + Sync {
    async fn mangle(
        &self,
        cx: &RequestContext,
        response: Response<ProxyBody>,
    ) -> Response<ProxyBody>;
}

/// Adapts a plain closure into a [`Mangler`].
pub struct ManglerFn<F>(pub F);

#[async_trait]
impl<F> Mangler for ManglerFn<F>
where
    F: Fn(&RequestContext, Response<ProxyBody>) -> Response<ProxyBody> + Send + Sync,
{
    async fn mangle(
        &self,
        cx: &RequestContext,
        response: Response<ProxyBody>,
    ) -> Response<ProxyBody> {
        (self.0)(cx, response)
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderValue, StatusCode};

    use super::*;

    fn request() -> Request<Body> {
        Request::builder()
            .uri("http://example.com/login")
            .body(Body::empty())
            .unwrap()
    }

    fn context() -> RequestContext {
        RequestContext::new(
            Method::GET,
            "http://example.com/login".parse().unwrap(),
            HeaderMap::new(),
        )
    }

    #[test]
    fn matcher_fn_delegates_to_closure() {
        let matcher = MatcherFn(|req: &Request<Body>| req.uri().path() == "/login");
        assert!(matcher.matches(&request()));

        let matcher = MatcherFn(|req: &Request<Body>| req.uri().path() == "/logout");
        assert!(!matcher.matches(&request()));
    }

    #[tokio::test]
    async fn middleware_fn_mutates_then_delegates() {
        let terminal = HandlerFn(|req: Request<Body>| {
            let mut response = Response::new(Body::empty());
            if req.headers().contains_key("x-marked") {
                *response.status_mut() = StatusCode::ACCEPTED;
            }
            response
        });

        let middleware = MiddlewareFn(|req: &mut Request<Body>| {
            req.headers_mut()
                .insert("x-marked", HeaderValue::from_static("1"));
        });

        let handler = middleware.wrap(Box::new(terminal));
        let response = handler.handle(request()).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn mangler_fn_rewrites_response() {
        let mangler = ManglerFn(|_cx: &RequestContext, mut response: Response<ProxyBody>| {
            response
                .headers_mut()
                .insert("x-mangled", HeaderValue::from_static("yes"));
            response
        });

        let response = Response::new(ProxyBody::from_bytes("hello"));
        let mangled = mangler.mangle(&context(), response).await;
        assert_eq!(mangled.headers()["x-mangled"], "yes");
    }
}
