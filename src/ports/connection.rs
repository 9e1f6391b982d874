//! Optional per-connection capabilities, probed through request extensions.
//!
//! The core never assumes these are present: a request arriving through the
//! bundled server adapter carries them, one built by hand in a test or an
//! embedding does not, and the engine falls back to a safe default path in
//! that case.
use tokio_util::sync::CancellationToken;

/// Capability to drop the client connection outright.
///
/// The server adapter inserts one guard per connection and races the
/// connection future against its token. When an upstream call fails at the
/// transport level and no error handler is configured, the forwarding
/// engine triggers the guard: the socket is closed without a response,
/// failing closed rather than inventing an HTTP status for a non-HTTP
/// failure.
#[derive(Clone, Debug, Default)]
pub struct ConnectionGuard {
    token: CancellationToken,
}

impl ConnectionGuard {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request the connection be dropped.
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`abort`](Self::abort) has been called.
    pub async fn aborted(&self) {
        self.token.cancelled().await;
    }
}

/// Marker extension: the inbound leg of this request was TLS-terminated.
///
/// Its presence makes the forwarding engine rebuild the upstream URL with
/// the `https` scheme. TLS termination itself happens outside this crate.
#[derive(Clone, Copy, Debug)]
pub struct TlsTerminated;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_reports_abort() {
        let guard = ConnectionGuard::new();
        assert!(!guard.is_aborted());

        guard.abort();
        assert!(guard.is_aborted());
        // resolves immediately once aborted
        guard.aborted().await;
    }

    #[test]
    fn guard_clones_share_the_token() {
        let guard = ConnectionGuard::new();
        let clone = guard.clone();
        clone.abort();
        assert!(guard.is_aborted());
    }
}
