//! Pattern-based rewriting of response headers and bodies.
use async_trait::async_trait;
use http::{HeaderName, HeaderValue, Response};
use regex::{Regex, bytes::Regex as BytesRegex};

use crate::{
    adapters::{DEFAULT_MAX_BODY_SIZE, announced_length},
    core::body::{ProxyBody, materialize},
    ports::transform::{Mangler, RequestContext},
};

#[derive(thiserror::Error, Debug)]
pub enum RewriteRuleError {
    #[error("invalid header name: {0}")]
    Header(#[from] http::header::InvalidHeaderName),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// A collection of regex rules applied to responses on their way back to
/// the client, to header values and to the body.
///
/// Bodies larger than the configured maximum are passed through
/// unmodified, never partially rewritten. Replacement strings support the
/// usual `$1` capture-group references.
pub struct RegexRewriter {
    header_rules: Vec<(HeaderName, Regex, String)>,
    body_rules: Vec<(BytesRegex, Vec<u8>)>,
    max_size: usize,
}

impl RegexRewriter {
    pub fn new() -> Self {
        Self {
            header_rules: Vec::new(),
            body_rules: Vec::new(),
            max_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Add a rule applied to every value of the named response header.
    pub fn header_rule(
        mut self,
        header: &str,
        search: &str,
        replace: &str,
    ) -> Result<Self, RewriteRuleError> {
        self.header_rules.push((
            header.parse::<HeaderName>()?,
            Regex::new(search)?,
            replace.to_string(),
        ));
        Ok(self)
    }

    /// Add a rule applied to the response body.
    pub fn body_rule(mut self, search: &str, replace: &str) -> Result<Self, RewriteRuleError> {
        self.body_rules
            .push((BytesRegex::new(search)?, replace.as_bytes().to_vec()));
        Ok(self)
    }
}

impl Default for RegexRewriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mangler for RegexRewriter {
    async fn mangle(
        &self,
        _cx: &RequestContext,
        mut response: Response<ProxyBody>,
    ) -> Response<ProxyBody> {
        if announced_length(response.headers()).is_some_and(|len| len > self.max_size) {
            return response;
        }

        for (name, search, replace) in &self.header_rules {
            let rewritten: Vec<HeaderValue> = response
                .headers()
                .get_all(name)
                .iter()
                .map(|value| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| search.replace_all(v, replace.as_str()))
                        .and_then(|v| HeaderValue::from_str(&v).ok())
                        .unwrap_or_else(|| value.clone())
                })
                .collect();

            if !rewritten.is_empty() {
                let headers = response.headers_mut();
                headers.remove(name);
                for value in rewritten {
                    headers.append(name.clone(), value);
                }
            }
        }

        if !self.body_rules.is_empty() {
            match materialize(&mut response).await {
                Ok(bytes) => {
                    // the announced length may have been absent or wrong
                    if bytes.len() > self.max_size {
                        return response;
                    }
                    let mut data = bytes.to_vec();
                    for (search, replace) in &self.body_rules {
                        data = search.replace_all(&data, replace.as_slice()).into_owned();
                    }
                    *response.body_mut() = ProxyBody::from_bytes(data);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "body unavailable, response passed through unmodified");
                }
            }
        }

        response
    }
}
