//! Assembly of the runtime routing tree from a validated configuration.
use std::sync::Arc;

use eyre::{Context, Result};

use crate::{
    adapters::{HeaderChanger, HeaderMatcher, HostMatcher, PathPrefixMatcher, RegexRewriter},
    config::models::{NodeConfig, ProxyConfig},
    core::{
        client::{RedirectPolicy, UpstreamClient},
        node::ProxyNode,
    },
    ports::http_client::UpstreamTransport,
};

/// Build the routing tree described by `config` on top of the given
/// transport. Expects a validated config; pattern errors still surface as
/// errors rather than panics.
pub fn build_tree(config: &ProxyConfig, transport: Arc<dyn UpstreamTransport>) -> Result<ProxyNode> {
    let mut client = UpstreamClient::new(transport);
    client.set_timeout(
        humantime::parse_duration(&config.upstream.timeout)
            .context("invalid upstream.timeout")?,
    );
    if config.upstream.max_redirects > 0 {
        client.set_redirect_policy(RedirectPolicy::Follow {
            max: config.upstream.max_redirects,
        });
    }

    let mut root = ProxyNode::new(client);
    configure_node(&mut root, &config.root)?;
    Ok(root)
}

fn configure_node(node: &mut ProxyNode, config: &NodeConfig) -> Result<()> {
    if let Some(host) = &config.host {
        node.add_matcher(
            HostMatcher::new(host).with_context(|| format!("invalid host pattern {host:?}"))?,
        );
    }
    if let Some(prefix) = &config.path_prefix {
        node.add_matcher(PathPrefixMatcher::new(prefix.clone()));
    }
    for (name, pattern) in &config.headers {
        node.add_matcher(
            HeaderMatcher::new(name, pattern)
                .with_context(|| format!("invalid header matcher {name:?}"))?,
        );
    }

    if !config.request_headers.is_empty() {
        let mut changer = HeaderChanger::new();
        changer.request = config.request_headers.clone();
        node.add_middleware(changer);
    }
    if !config.response_headers.is_empty() {
        let mut changer = HeaderChanger::new();
        changer.response = config.response_headers.clone();
        node.add_mangler(changer);
    }

    if !config.body_rewrites.is_empty() {
        let mut rewriter = RegexRewriter::new();
        for rule in &config.body_rewrites {
            rewriter = rewriter
                .body_rule(&rule.search, &rule.replace)
                .with_context(|| format!("invalid body rewrite {:?}", rule.search))?;
        }
        node.add_mangler(rewriter);
    }

    if config.mangle_redirects {
        node.set_mangle_redirects(true);
    }
    if let Some(timeout) = &config.timeout {
        node.client_mut().set_timeout(
            humantime::parse_duration(timeout)
                .with_context(|| format!("invalid node timeout {timeout:?}"))?,
        );
    }

    for child_config in &config.children {
        let child = node.child();
        configure_node(child, child_config)?;
    }

    Ok(())
}
