//! Keyword-driven inspection of request form fields.
use std::{collections::HashSet, io::Write};

use async_trait::async_trait;
use http::{Response, header};

use crate::{
    adapters::{DEFAULT_MAX_BODY_SIZE, DumpSink, announced_length},
    core::body::{ProxyBody, materialize},
    ports::transform::{Mangler, RequestContext},
};

enum SetKind {
    Any,
    All,
}

struct KeywordSet {
    kind: SetKind,
    keywords: HashSet<String>,
}

impl KeywordSet {
    fn matches(&self, observed: &HashSet<String>) -> bool {
        if observed.is_empty() {
            return false;
        }
        match self.kind {
            SetKind::Any => self.keywords.iter().any(|k| observed.contains(k)),
            SetKind::All => self.keywords.iter().all(|k| observed.contains(k)),
        }
    }
}

/// Dumps request form fields to a sink when configured keywords show up.
///
/// Field names come from the request query string; when `try_json` is set
/// (or the response announces a JSON content type) the top-level keys of
/// the response body are inspected too. Keyword sets are checked
/// independently: a dump happens when ANY set matches, where an `any` set
/// matches if one of its keywords is present and an `all` set only if
/// every one is.
///
/// Responses with an error status are skipped unless `ignore_status` is
/// set; the assumption is that a failed request did not process the
/// submitted fields.
pub struct FormDumper {
    keyword_sets: Vec<KeywordSet>,
    pub try_json: bool,
    pub ignore_status: bool,
    sink: DumpSink,
    max_size: usize,
}

impl FormDumper {
    pub fn new(sink: DumpSink) -> Self {
        Self {
            keyword_sets: Vec::new(),
            try_json: false,
            ignore_status: false,
            sink,
            max_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Dump when at least one of these keywords appears.
    pub fn any<I, S>(&mut self, keywords: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add(SetKind::Any, keywords);
        self
    }

    /// Dump when every one of these keywords appears.
    pub fn all<I, S>(&mut self, keywords: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add(SetKind::All, keywords);
        self
    }

    fn add<I, S>(&mut self, kind: SetKind, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keyword_sets.push(KeywordSet {
            kind,
            keywords: keywords.into_iter().map(Into::into).collect(),
        });
    }
}

fn is_json(headers: &http::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("json"))
}

#[async_trait]
impl Mangler for FormDumper {
    async fn mangle(
        &self,
        cx: &RequestContext,
        mut response: Response<ProxyBody>,
    ) -> Response<ProxyBody> {
        if response.status().as_u16() >= 400 && !self.ignore_status {
            return response;
        }

        let fields: Vec<(String, String)> = cx
            .uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        let mut observed: HashSet<String> = fields.iter().map(|(k, _)| k.clone()).collect();

        if self.try_json || is_json(response.headers()) {
            let announced_too_big =
                announced_length(response.headers()).is_some_and(|len| len > self.max_size);
            if !announced_too_big {
                match materialize(&mut response).await {
                    Ok(bytes) if bytes.len() <= self.max_size => {
                        if let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(&bytes)
                        {
                            observed.extend(map.keys().cloned());
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::debug!(error = %err, "skipping JSON inspection, body unavailable");
                    }
                }
            }
        }

        if self.keyword_sets.iter().any(|set| set.matches(&observed)) {
            if let Ok(mut sink) = self.sink.lock() {
                let _ = writeln!(sink, "{} {} {:?}", cx.method, cx.uri, fields);
            }
        }

        response
    }
}
