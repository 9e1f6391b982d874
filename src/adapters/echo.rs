use std::io::Write;

use async_trait::async_trait;
use http::Response;

use crate::{
    adapters::DumpSink,
    core::body::ProxyBody,
    ports::transform::{Mangler, RequestContext},
};

/// Writes one `"<prefix> <url>"` line per mangled response to a sink.
/// Handy as a minimal traffic log and as a visible probe in a chain.
pub struct EchoMangler {
    prefix: String,
    sink: DumpSink,
}

impl EchoMangler {
    pub fn new(prefix: impl Into<String>, sink: DumpSink) -> Self {
        Self {
            prefix: prefix.into(),
            sink,
        }
    }
}

#[async_trait]
impl Mangler for EchoMangler {
    async fn mangle(
        &self,
        cx: &RequestContext,
        response: Response<ProxyBody>,
    ) -> Response<ProxyBody> {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = writeln!(sink, "{} {}", self.prefix, cx.uri);
        }
        response
    }
}
