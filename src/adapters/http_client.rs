use async_trait::async_trait;
use axum::body::Body;
use eyre::Result;
use http::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;

use crate::ports::http_client::{UpstreamError, UpstreamResult, UpstreamTransport};

/// Upstream transport over Hyper with Rustls (HTTP/1.1).
///
/// Responsibilities:
/// * Forces the wire request to HTTP/1.1
/// * Sets the `Host` header from the request URI
/// * Strips `Transfer-Encoding` from the decoded response, since the body
///   is re-framed when relayed
///
/// One instance owns one connection pool; every node that inherits it
/// shares that pool. Deliberately minimal: timeouts and redirect policy
/// live in the per-node [`UpstreamClient`](crate::core::client::UpstreamClient),
/// retries belong to neither layer.
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl HyperTransport {
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::info!("loaded {} native root certificates", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, Body>(https_connector);

        tracing::debug!("created upstream HTTP client");
        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamTransport for HyperTransport {
    async fn send(&self, mut request: Request<Body>) -> UpstreamResult<Response<Body>> {
        // Host must track the URI we are actually connecting to
        if let Some(host) = request.uri().host() {
            let host_value = if let Some(port) = request.uri().port() {
                HeaderValue::from_str(&format!("{host}:{}", port.as_u16()))
            } else {
                HeaderValue::from_str(host)
            };
            match host_value {
                Ok(value) => {
                    request.headers_mut().insert(header::HOST, value);
                }
                Err(e) => {
                    return Err(UpstreamError::InvalidRequest(format!(
                        "unrepresentable host header: {e}"
                    )));
                }
            }
        } else {
            return Err(UpstreamError::InvalidRequest(
                "outgoing URI has no host".to_string(),
            ));
        }

        let (mut parts, body) = request.into_parts();
        parts.version = Version::HTTP_11;
        let outgoing = Request::from_parts(parts, body);

        let method = outgoing.method().clone();
        let uri = outgoing.uri().clone();

        tracing::debug!(%method, %uri, "sending upstream request");

        match self.client.request(outgoing).await {
            Ok(response) => {
                let (mut parts, incoming) = response.into_parts();

                // The body arrives decoded; the relay side re-frames it.
                parts.headers.remove(header::TRANSFER_ENCODING);

                Ok(Response::from_parts(parts, Body::new(incoming)))
            }
            Err(e) => {
                tracing::debug!(%method, %uri, error = %e, "upstream request errored");
                Err(UpstreamError::Connect(format!(
                    "request to {method} {uri} failed: {e}"
                )))
            }
        }
    }
}
