pub mod connection;
pub mod http_client;
pub mod transform;

pub use connection::{ConnectionGuard, TlsTerminated};
pub use http_client::{UpstreamError, UpstreamResult, UpstreamTransport};
pub use transform::{
    BoxHandler, Handler, HandlerFn, Mangler, ManglerFn, Matcher, MatcherFn, Middleware,
    MiddlewareFn, RequestContext,
};
