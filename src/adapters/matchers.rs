//! Built-in matchers for the routing tree.
use axum::body::Body;
use http::{Request, header};
use regex::Regex;

use crate::ports::transform::Matcher;

/// Matches the request host (authority or `Host` header, port included)
/// against a regex.
pub struct HostMatcher {
    pattern: Regex,
}

impl HostMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, request: &Request<Body>) -> bool {
        let host = request
            .uri()
            .authority()
            .map(|a| a.as_str())
            .or_else(|| {
                request
                    .headers()
                    .get(header::HOST)
                    .and_then(|v| v.to_str().ok())
            });

        host.is_some_and(|h| self.pattern.is_match(h))
    }
}

/// Matches when any value of the named header matches a regex.
pub struct HeaderMatcher {
    name: http::HeaderName,
    pattern: Regex,
}

#[derive(thiserror::Error, Debug)]
pub enum HeaderMatcherError {
    #[error("invalid header name: {0}")]
    Name(#[from] http::header::InvalidHeaderName),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl HeaderMatcher {
    pub fn new(name: &str, value_pattern: &str) -> Result<Self, HeaderMatcherError> {
        Ok(Self {
            name: name.parse()?,
            pattern: Regex::new(value_pattern)?,
        })
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, request: &Request<Body>) -> bool {
        request
            .headers()
            .get_all(&self.name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| self.pattern.is_match(v))
    }
}

/// Matches requests whose path starts with a literal prefix.
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, request: &Request<Body>) -> bool {
        request.uri().path().starts_with(&self.prefix)
    }
}
