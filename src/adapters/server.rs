//! The HTTP/1.1 entry point.
//!
//! One task per connection; every request is handed to
//! [`ProxyService::handle`] with a per-connection [`ConnectionGuard`] in
//! its extensions. The connection future races the guard, so an aborted
//! guard drops the socket without writing a response — the fail-closed
//! path for transport errors with no HTTP representation.
use std::{io, net::SocketAddr, sync::Arc};

use axum::body::Body;
use eyre::{Context, Result};
use hyper::{Request, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};

use crate::{
    core::forward::ProxyService, ports::connection::ConnectionGuard,
    utils::graceful_shutdown::GracefulShutdown,
};

/// Accept loop binding a [`ProxyService`] to a listener.
pub struct ProxyServer {
    service: Arc<ProxyService>,
}

impl ProxyServer {
    pub fn new(service: Arc<ProxyService>) -> Self {
        Self { service }
    }

    /// Serve until the shutdown signal fires. In-flight connections finish
    /// on their own tasks.
    pub async fn run(&self, listener: TcpListener, shutdown: Arc<GracefulShutdown>) -> Result<()> {
        let local_addr = listener.local_addr().context("listener has no local addr")?;
        tracing::info!(%local_addr, "proxy listening");

        let mut shutdown_rx = shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let service = self.service.clone();
                            tokio::spawn(async move {
                                serve_connection(stream, peer, service).await;
                            });
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "accept error");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, service: Arc<ProxyService>) {
    let guard = ConnectionGuard::new();

    let request_guard = guard.clone();
    let handler = service_fn(move |mut request: Request<hyper::body::Incoming>| {
        let service = service.clone();
        let guard = request_guard.clone();
        async move {
            request.extensions_mut().insert(guard.clone());
            let request = request.map(Body::new);
            let response = service.handle(request).await;

            // A triggered guard means "fail closed": erroring the service
            // makes hyper tear the connection down without a response,
            // instead of racing the fallback status onto the wire.
            if guard.is_aborted() {
                return Err(io::Error::other("connection aborted by proxy"));
            }
            Ok(response)
        }
    });

    let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), handler);
    tokio::pin!(connection);

    tokio::select! {
        biased;
        // covers aborts that fire while a response is already streaming
        _ = guard.aborted() => {
            tracing::warn!(%peer, "connection dropped by proxy");
        }
        result = &mut connection => {
            if let Err(e) = result {
                tracing::debug!(%peer, error = %e, "connection closed");
            }
        }
    }
}
