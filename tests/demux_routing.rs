// Integration tests for routing-tree dispatch and the transform pipeline,
// driven through the public ProxyService entry point with a mock transport.
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderValue, Request, Response, StatusCode};
use remora::{
    ProxyNode, ProxyService, UpstreamClient,
    adapters::{HeaderChanger, HostMatcher, PathPrefixMatcher},
    core::ProxyBody,
    ports::{RequestContext, UpstreamResult, UpstreamTransport},
};

/// Answers every request with 200 and reflects the requested URI, so
/// tests can observe what was forwarded where.
struct EchoTransport;

#[async_trait]
impl UpstreamTransport for EchoTransport {
    async fn send(&self, request: Request<Body>) -> UpstreamResult<Response<Body>> {
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("x-upstream-uri", request.uri().to_string())
            .body(Body::from("upstream"))
            .unwrap())
    }
}

fn client() -> UpstreamClient {
    UpstreamClient::new(Arc::new(EchoTransport))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn tag_mangler(
    name: &'static str,
) -> impl Fn(&RequestContext, Response<ProxyBody>) -> Response<ProxyBody> + Send + Sync {
    move |_cx, mut response| {
        response
            .headers_mut()
            .insert(name, HeaderValue::from_static("1"));
        response
    }
}

#[tokio::test]
async fn only_the_selected_node_contributes_its_pipeline() {
    let mut root = ProxyNode::new(client());
    root.add_mangler_fn(tag_mangler("x-root"));

    let child = root.child();
    child.add_matcher(HostMatcher::new(r"example\.com").unwrap());
    child.add_mangler_fn(tag_mangler("x-child"));

    let service = ProxyService::new(root);

    // the child claims this one: parent manglers must not run
    let response = service.handle(get("http://example.com/")).await;
    assert!(response.headers().contains_key("x-child"));
    assert!(!response.headers().contains_key("x-root"));

    // nothing below the root claims this one
    let response = service.handle(get("http://other.net/")).await;
    assert!(response.headers().contains_key("x-root"));
    assert!(!response.headers().contains_key("x-child"));
}

#[tokio::test]
async fn deepest_matching_node_wins() {
    let mut root = ProxyNode::new(client());
    root.add_mangler_fn(tag_mangler("x-root"));

    let host_node = root.child();
    host_node.add_matcher(HostMatcher::new(r"example\.com").unwrap());
    host_node.add_mangler_fn(tag_mangler("x-host"));

    let path_node = host_node.child();
    path_node.add_matcher(PathPrefixMatcher::new("/api"));
    path_node.add_mangler_fn(tag_mangler("x-api"));

    let service = ProxyService::new(root);

    let response = service.handle(get("http://example.com/api/users")).await;
    assert!(response.headers().contains_key("x-api"));
    assert!(!response.headers().contains_key("x-host"));

    let response = service.handle(get("http://example.com/index.html")).await;
    assert!(response.headers().contains_key("x-host"));
    assert!(!response.headers().contains_key("x-api"));
}

#[tokio::test]
async fn first_attached_sibling_wins_ties() {
    let mut root = ProxyNode::new(client());

    let first = root.child();
    first.add_matcher(HostMatcher::new(r"example\.com").unwrap());
    first.add_mangler_fn(tag_mangler("x-first"));

    let second = root.child();
    second.add_matcher(HostMatcher::new(r"example\.com").unwrap());
    second.add_mangler_fn(tag_mangler("x-second"));

    let service = ProxyService::new(root);
    let response = service.handle(get("http://example.com/")).await;

    assert!(response.headers().contains_key("x-first"));
    assert!(!response.headers().contains_key("x-second"));
}

#[tokio::test]
async fn miss_falls_back_to_a_plain_passthrough() {
    let mut root = ProxyNode::new(client());
    root.add_matcher(HostMatcher::new(r"managed\.zone").unwrap());
    root.add_mangler_fn(tag_mangler("x-managed"));

    let service = ProxyService::new(root);
    let response = service.handle(get("http://elsewhere.org/page")).await;

    // forwarded, but through the no-op node: no transforms applied
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key("x-managed"));
    assert_eq!(
        response.headers()["x-upstream-uri"],
        "http://elsewhere.org/page"
    );
}

#[tokio::test]
async fn header_changer_runs_on_both_sides_of_the_exchange() {
    let mut root = ProxyNode::new(client());

    let mut request_changes = HeaderChanger::new();
    request_changes
        .request
        .insert("x-proxied-by".to_string(), "remora".to_string());
    root.add_middleware(request_changes);

    let mut response_changes = HeaderChanger::new();
    response_changes
        .response
        .insert("-x-upstream-uri".to_string(), String::new());
    response_changes
        .response
        .insert("x-filtered".to_string(), "yes".to_string());
    root.add_mangler(response_changes);

    let service = ProxyService::new(root);
    let response = service.handle(get("http://example.com/")).await;

    assert!(!response.headers().contains_key("x-upstream-uri"));
    assert_eq!(response.headers()["x-filtered"], "yes");
}
