//! The routing tree: nodes and the demultiplexer.
//!
//! A [`ProxyNode`] bundles the matchers that decide whether it claims a
//! request with the transform pipeline applied once it does. Nodes own
//! their children exclusively, so the tree is a plain recursive value:
//! built top-down at configuration time, immutable and lock-free once
//! serving begins.
use std::sync::Arc;

use axum::body::Body;
use http::{Request, Response};

use crate::{
    core::{body::ProxyBody, client::UpstreamClient},
    ports::transform::{
        Handler, Mangler, ManglerFn, Matcher, MatcherFn, Middleware, MiddlewareFn, RequestContext,
    },
};

/// One node of the routing tree.
///
/// A node with no matchers claims every request but yields to its
/// children; a node with matchers claims a request when ANY of them
/// matches, and excludes its whole subtree when none do.
///
/// Known limitation, kept deliberately: matcher/middleware/mangler lists
/// are never inherited by or merged with ancestors or descendants. Only
/// the single node selected by [`demux`](Self::demux) contributes its
/// pipeline to a request, so shared behavior has to be registered on each
/// level that wants it. In exchange, every node's transform chain can be
/// reasoned about locally.
pub struct ProxyNode {
    pub(crate) matchers: Vec<Box<dyn Matcher>>,
    pub(crate) middlewares: Vec<Box<dyn Middleware>>,
    pub(crate) manglers: Vec<Box<dyn Mangler>>,
    pub(crate) children: Vec<ProxyNode>,
    pub(crate) client: UpstreamClient,
    pub(crate) error_handler: Option<Arc<dyn Handler>>,
    pub(crate) mangle_redirects: bool,
}

impl ProxyNode {
    /// A fresh node with no matchers, transforms, or children.
    pub fn new(client: UpstreamClient) -> Self {
        Self {
            matchers: Vec::new(),
            middlewares: Vec::new(),
            manglers: Vec::new(),
            children: Vec::new(),
            client,
            error_handler: None,
            mangle_redirects: false,
        }
    }

    /// Add a matcher. Multiple matchers are OR'ed together.
    pub fn add_matcher(&mut self, matcher: impl Matcher + 'static) {
        self.matchers.push(Box::new(matcher));
    }

    /// Add a matcher from a plain predicate closure.
    pub fn add_matcher_fn<F>(&mut self, matcher: F)
    where
        F: Fn(&Request<Body>) -> bool + Send + Sync + 'static,
    {
        self.matchers.push(Box::new(MatcherFn(matcher)));
    }

    /// Add a middleware. The first middleware added ends up outermost: it
    /// sees the request before any other and can short-circuit the rest.
    pub fn add_middleware(&mut self, middleware: impl Middleware + 'static) {
        self.middlewares.push(Box::new(middleware));
    }

    /// Add a middleware from a plain request-mutation closure.
    pub fn add_middleware_fn<F>(&mut self, middleware: F)
    where
        F: Fn(&mut Request<Body>) + Send + Sync + 'static,
    {
        self.middlewares.push(Box::new(MiddlewareFn(middleware)));
    }

    /// Add a mangler. Manglers run in insertion order: the first one added
    /// sees the raw upstream response, each one's output feeds the next.
    pub fn add_mangler(&mut self, mangler: impl Mangler + 'static) {
        self.manglers.push(Box::new(mangler));
    }

    /// Add a mangler from a plain closure.
    pub fn add_mangler_fn<F>(&mut self, mangler: F)
    where
        F: Fn(&RequestContext, Response<ProxyBody>) -> Response<ProxyBody> + Send + Sync + 'static,
    {
        self.manglers.push(Box::new(ManglerFn(mangler)));
    }

    /// Attach a new child node and return it for configuration.
    ///
    /// The child starts with a copy of this node's upstream client and
    /// error handler; both stay independently overridable afterwards.
    pub fn child(&mut self) -> &mut ProxyNode {
        let child = ProxyNode {
            matchers: Vec::new(),
            middlewares: Vec::new(),
            manglers: Vec::new(),
            children: Vec::new(),
            client: self.client.clone(),
            error_handler: self.error_handler.clone(),
            mangle_redirects: false,
        };
        let index = self.children.len();
        self.children.push(child);
        &mut self.children[index]
    }

    pub fn children(&self) -> &[ProxyNode] {
        &self.children
    }

    pub fn client(&self) -> &UpstreamClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut UpstreamClient {
        &mut self.client
    }

    /// Install the fallback handler invoked when forwarding fails at the
    /// transport level. Children created afterwards inherit it.
    pub fn set_error_handler(&mut self, handler: Arc<dyn Handler>) {
        self.error_handler = Some(handler);
    }

    /// Let the mangler chain run on 3xx responses too. Off by default:
    /// redirects normally skip the chain entirely.
    pub fn set_mangle_redirects(&mut self, mangle: bool) {
        self.mangle_redirects = mangle;
    }

    pub fn mangle_redirects(&self) -> bool {
        self.mangle_redirects
    }

    /// Find the node responsible for a request, or `None` when this whole
    /// subtree declines it.
    ///
    /// Children are consulted in insertion order and the first one to
    /// return a selection wins, which yields deepest-most-specific-match
    /// semantics: a matching child always overrides its parent, and ties
    /// between sibling subtrees go to whichever was attached first.
    pub fn demux(&self, request: &Request<Body>) -> Option<&ProxyNode> {
        let mut selected = None;

        if self.matchers.is_empty() {
            if self.children.is_empty() {
                // unconditional leaf
                return Some(self);
            }
            selected = Some(self);
        } else if self.matchers.iter().any(|m| m.matches(request)) {
            selected = Some(self);
        } else {
            // no matcher claimed it: the whole subtree is out
            return None;
        }

        for child in &self.children {
            if let Some(node) = child.demux(request) {
                selected = Some(node);
                break;
            }
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::ports::http_client::{UpstreamResult, UpstreamTransport};

    struct NullTransport;

    #[async_trait]
    impl UpstreamTransport for NullTransport {
        async fn send(&self, _request: Request<Body>) -> UpstreamResult<Response<Body>> {
            Ok(Response::new(Body::empty()))
        }
    }

    fn client() -> UpstreamClient {
        UpstreamClient::new(Arc::new(NullTransport))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn host_is(expected: &'static str) -> impl Fn(&Request<Body>) -> bool + Send + Sync {
        move |req: &Request<Body>| req.uri().host() == Some(expected)
    }

    fn host_starts_with(prefix: &'static str) -> impl Fn(&Request<Body>) -> bool + Send + Sync {
        move |req: &Request<Body>| req.uri().host().is_some_and(|h| h.starts_with(prefix))
    }

    #[test]
    fn empty_node_selects_itself() {
        let root = ProxyNode::new(client());
        let selected = root.demux(&get("http://google.es/")).unwrap();
        assert!(std::ptr::eq(selected, &root));
    }

    #[test]
    fn empty_child_overrides_parent() {
        let mut root = ProxyNode::new(client());
        root.child();

        let selected = root.demux(&get("http://google.es/")).unwrap();
        assert!(std::ptr::eq(selected, &root.children()[0]));
    }

    #[test]
    fn deepest_match_wins() {
        let mut root = ProxyNode::new(client());

        let child1 = root.child();
        child1.add_matcher_fn(host_starts_with("google."));

        let child11 = child1.child();
        // OR'ed together: any match claims the request
        child11.add_matcher_fn(host_is("google.es"));
        child11.add_matcher_fn(host_is("google.co.uk"));

        let selected = root.demux(&get("http://google.es/")).unwrap();
        assert!(std::ptr::eq(selected, &root.children()[0].children()[0]));

        // matches the level-one child but not the leaf
        let selected = root.demux(&get("http://google.com/")).unwrap();
        assert!(std::ptr::eq(selected, &root.children()[0]));
    }

    #[test]
    fn unmatched_subtree_is_excluded_entirely() {
        let mut root = ProxyNode::new(client());

        let child = root.child();
        child.add_matcher_fn(host_is("facebook.com"));
        // this grandchild would match anything, but its parent declines
        child.child();

        let selected = root.demux(&get("http://google.es/")).unwrap();
        assert!(std::ptr::eq(selected, &root));
    }

    #[test]
    fn first_matching_sibling_wins() {
        let mut root = ProxyNode::new(client());

        let first = root.child();
        first.add_matcher_fn(host_starts_with("google."));
        let second = root.child();
        second.add_matcher_fn(host_starts_with("google."));

        let selected = root.demux(&get("http://google.es/")).unwrap();
        assert!(std::ptr::eq(selected, &root.children()[0]));
    }

    #[test]
    fn root_with_failed_matchers_selects_nothing() {
        let mut root = ProxyNode::new(client());
        root.add_matcher_fn(host_is("something.invalid"));

        let child = root.child();
        child.add_matcher_fn(host_is("facebook.com"));

        assert!(root.demux(&get("http://facebook.com/")).is_none());
    }

    #[test]
    fn demux_is_deterministic() {
        let mut root = ProxyNode::new(client());
        let child = root.child();
        child.add_matcher_fn(host_starts_with("google."));

        let request = get("http://google.es/");
        let first = root.demux(&request).unwrap() as *const ProxyNode;
        for _ in 0..10 {
            let again = root.demux(&request).unwrap() as *const ProxyNode;
            assert_eq!(first, again);
        }
    }

    #[test]
    fn children_inherit_client_and_error_handler() {
        use crate::ports::transform::HandlerFn;

        let mut root = ProxyNode::new(client());
        root.client_mut()
            .set_timeout(std::time::Duration::from_secs(3));
        root.set_error_handler(Arc::new(HandlerFn(|_req: Request<Body>| {
            Response::new(Body::empty())
        })));

        let child = root.child();
        assert_eq!(
            child.client().timeout(),
            std::time::Duration::from_secs(3)
        );
        assert!(child.error_handler.is_some());

        // and stays independently mutable
        child
            .client_mut()
            .set_timeout(std::time::Duration::from_secs(9));
        assert_eq!(
            root.client().timeout(),
            std::time::Duration::from_secs(3)
        );
    }
}
