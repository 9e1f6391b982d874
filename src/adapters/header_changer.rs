//! Bulk header mutation for both directions of an exchange.
use std::collections::HashMap;

use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response};

use crate::{
    core::body::ProxyBody,
    ports::transform::{BoxHandler, Handler, Mangler, Middleware, RequestContext},
};

/// Adds, sets, appends, or removes headers on requests before they go
/// upstream and on responses before they reach the client.
///
/// Both maps use the same key convention: a name starting with `-`
/// (e.g. `-Server`) deletes the header, a name starting with `+` appends
/// the value to any existing ones, and a bare name sets the value,
/// replacing whatever was there. Invalid names or values are skipped with
/// a warning.
#[derive(Default)]
pub struct HeaderChanger {
    pub request: HashMap<String, String>,
    pub response: HashMap<String, String>,
}

impl HeaderChanger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_changes(changes: &HashMap<String, String>, headers: &mut HeaderMap) {
    for (key, value) in changes {
        if let Some(name) = key.strip_prefix('-') {
            headers.remove(name);
        } else if let Some(name) = key.strip_prefix('+') {
            match (name.parse::<HeaderName>(), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::warn!(header = %name, "skipping unrepresentable header append"),
            }
        } else {
            match (key.parse::<HeaderName>(), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %key, "skipping unrepresentable header set"),
            }
        }
    }
}

impl Middleware for HeaderChanger {
    fn wrap<'a>(&'a self, next: BoxHandler<'a>) -> BoxHandler<'a> {
        Box::new(ChangeRequestHeaders {
            changes: &self.request,
            next,
        })
    }
}

struct ChangeRequestHeaders<'a> {
    changes: &'a HashMap<String, String>,
    next: BoxHandler<'a>,
}

#[async_trait]
impl Handler for ChangeRequestHeaders<'_> {
    async fn handle(&self, mut request: Request<Body>) -> Response<Body> {
        apply_changes(self.changes, request.headers_mut());
        self.next.handle(request).await
    }
}

#[async_trait]
impl Mangler for HeaderChanger {
    async fn mangle(
        &self,
        _cx: &RequestContext,
        mut response: Response<ProxyBody>,
    ) -> Response<ProxyBody> {
        apply_changes(&self.response, response.headers_mut());
        response
    }
}

/// Append-only request-side variant: every pair is added to the request
/// headers, existing values kept.
#[derive(Default)]
pub struct HeaderAdder(pub HashMap<String, String>);

impl Middleware for HeaderAdder {
    fn wrap<'a>(&'a self, next: BoxHandler<'a>) -> BoxHandler<'a> {
        Box::new(AddRequestHeaders {
            additions: &self.0,
            next,
        })
    }
}

struct AddRequestHeaders<'a> {
    additions: &'a HashMap<String, String>,
    next: BoxHandler<'a>,
}

#[async_trait]
impl Handler for AddRequestHeaders<'_> {
    async fn handle(&self, mut request: Request<Body>) -> Response<Body> {
        for (key, value) in self.additions {
            match (key.parse::<HeaderName>(), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    request.headers_mut().append(name, value);
                }
                _ => tracing::warn!(header = %key, "skipping unrepresentable header add"),
            }
        }
        self.next.handle(request).await
    }
}
