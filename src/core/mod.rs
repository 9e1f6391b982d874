pub mod body;
pub mod client;
pub mod forward;
pub mod node;

pub use body::{BodyError, ProxyBody, materialize};
pub use client::{DEFAULT_TIMEOUT, RedirectPolicy, UpstreamClient};
pub use forward::ProxyService;
pub use node::ProxyNode;
