//! Structured rewriting of HTML response bodies.
use async_trait::async_trait;
use http::Response;
use scraper::Html;

use crate::{
    adapters::{DEFAULT_MAX_BODY_SIZE, announced_length},
    core::body::{ProxyBody, materialize},
    ports::transform::{Mangler, RequestContext},
};

/// Anything that can operate on a parsed HTML document. Changes applied to
/// the document are reflected in the body sent back to the client.
pub trait HtmlModifier: Send + Sync {
    fn modify(&self, document: &mut Html);
}

/// Adapts a plain closure into an [`HtmlModifier`].
pub struct HtmlModifierFn<F>(pub F);

impl<F> HtmlModifier for HtmlModifierFn<F>
where
    F: Fn(&mut Html) + Send + Sync,
{
    fn modify(&self, document: &mut Html) {
        (self.0)(document)
    }
}

/// Parses the response body into a document tree, applies the registered
/// modifiers in order, and re-serializes the result.
///
/// Oversized, non-UTF-8, or unreadable bodies are passed through
/// unmodified; parsing itself is error-recovering, so any byte soup
/// produces some document.
pub struct HtmlRewriter {
    modifiers: Vec<Box<dyn HtmlModifier>>,
    max_size: usize,
}

impl HtmlRewriter {
    pub fn new() -> Self {
        Self {
            modifiers: Vec::new(),
            max_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn add_modifier(&mut self, modifier: impl HtmlModifier + 'static) {
        self.modifiers.push(Box::new(modifier));
    }

    pub fn add_modifier_fn<F>(&mut self, modifier: F)
    where
        F: Fn(&mut Html) + Send + Sync + 'static,
    {
        self.modifiers.push(Box::new(HtmlModifierFn(modifier)));
    }
}

impl Default for HtmlRewriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mangler for HtmlRewriter {
    async fn mangle(
        &self,
        _cx: &RequestContext,
        mut response: Response<ProxyBody>,
    ) -> Response<ProxyBody> {
        if self.modifiers.is_empty() {
            return response;
        }
        if announced_length(response.headers()).is_some_and(|len| len > self.max_size) {
            return response;
        }

        let bytes = match materialize(&mut response).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "body unavailable, response passed through unmodified");
                return response;
            }
        };
        if bytes.len() > self.max_size {
            return response;
        }

        let text = match std::str::from_utf8(&bytes) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "non-UTF-8 body, response passed through unmodified");
                return response;
            }
        };

        let mut document = Html::parse_document(text);
        for modifier in &self.modifiers {
            modifier.modify(&mut document);
        }

        let rewritten = document.root_element().html();
        *response.body_mut() = ProxyBody::from_bytes(rewritten);
        response
    }
}
