use std::{
    io::Write,
    sync::{Arc, Mutex},
};

use http::{HeaderMap, header};

pub mod echo;
pub mod form_dumper;
pub mod header_changer;
pub mod html_rewriter;
pub mod http_client;
pub mod matchers;
pub mod regex_rewriter;
pub mod server;

pub use echo::EchoMangler;
pub use form_dumper::FormDumper;
pub use header_changer::{HeaderAdder, HeaderChanger};
pub use html_rewriter::{HtmlModifier, HtmlModifierFn, HtmlRewriter};
pub use http_client::HyperTransport;
pub use matchers::{HeaderMatcher, HostMatcher, PathPrefixMatcher};
pub use regex_rewriter::RegexRewriter;
pub use server::ProxyServer;

/// Ceiling shared by the body-inspecting transforms: bodies larger than
/// this are passed through unmodified, never partially rewritten.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024 * 1024;

/// Where the logging transforms write their output.
pub type DumpSink = Arc<Mutex<dyn Write + Send>>;

/// The length the response announces, if it announces one.
pub(crate) fn announced_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
}
