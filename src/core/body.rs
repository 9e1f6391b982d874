//! Response body buffering for the mangler chain.
//!
//! Several manglers in one chain may each want to read the full response
//! body. Draining the stream once into an owned buffer and handing out
//! cheap clones keeps that linear instead of quadratic, and guarantees no
//! mangler ever observes a partially consumed stream.
use axum::body::Body;
use bytes::{Bytes, BytesMut};
use http::{Response, header};
use http_body_util::BodyExt;
use thiserror::Error;

/// Initial scratch capacity when the upstream did not announce a length.
const SCRATCH_CAPACITY: usize = 8 * 1024;

/// The body of a response travelling through the mangler chain.
///
/// `Stream` is an unread upstream stream; `Buffered` is an owned buffer
/// that is re-readable from the start any number of times. A transform
/// that swaps in fresh streamed content resets the state to `Stream`, and
/// the next [`materialize`] call drains it again.
pub enum ProxyBody {
    Stream(Body),
    Buffered(Bytes),
}

impl ProxyBody {
    /// A buffered body over owned bytes.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::Buffered(bytes.into())
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered(_))
    }

    /// Convert into the host platform's body type for the final relay.
    pub fn into_body(self) -> Body {
        match self {
            Self::Stream(body) => body,
            Self::Buffered(bytes) => Body::from(bytes),
        }
    }
}

impl From<Body> for ProxyBody {
    fn from(body: Body) -> Self {
        Self::Stream(body)
    }
}

#[derive(Error, Debug)]
pub enum BodyError {
    #[error("failed to read response body: {0}")]
    Read(String),
}

/// Drain the response body into an owned buffer and return it.
///
/// Idempotent: the first call consumes the stream, replaces the body with
/// the buffered variant, and returns the bytes; further calls on a
/// still-buffered body return the same bytes without touching the stream
/// again. The initial buffer capacity comes from the `Content-Length`
/// header when present, otherwise a fixed scratch capacity grown as
/// needed.
///
/// On a read error the bytes drained so far are kept as the buffered body
/// so the chain stays consistent; callers are expected to log and pass the
/// response through unmodified.
pub async fn materialize(response: &mut Response<ProxyBody>) -> Result<Bytes, BodyError> {
    if let ProxyBody::Buffered(bytes) = response.body() {
        return Ok(bytes.clone());
    }

    let announced = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    let mut stream =
        match std::mem::replace(response.body_mut(), ProxyBody::Buffered(Bytes::new())) {
            ProxyBody::Stream(stream) => stream,
            // checked above
            ProxyBody::Buffered(_) => return Ok(Bytes::new()),
        };

    let mut buffer = BytesMut::with_capacity(announced.unwrap_or(SCRATCH_CAPACITY));
    loop {
        match stream.frame().await {
            None => break,
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    buffer.extend_from_slice(&data);
                }
            }
            Some(Err(err)) => {
                *response.body_mut() = ProxyBody::Buffered(buffer.freeze());
                return Err(BodyError::Read(err.to_string()));
            }
        }
    }

    let bytes = buffer.freeze();
    *response.body_mut() = ProxyBody::Buffered(bytes.clone());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "<html><body>response body</body></html>";

    fn streamed_response() -> Response<ProxyBody> {
        Response::new(ProxyBody::Stream(Body::from(PAGE)))
    }

    #[tokio::test]
    async fn first_call_buffers_the_stream() {
        let mut response = streamed_response();
        let bytes = materialize(&mut response).await.unwrap();

        assert_eq!(bytes, PAGE.as_bytes());
        assert!(response.body().is_buffered());
    }

    #[tokio::test]
    async fn repeated_calls_return_the_same_buffer() {
        let mut response = streamed_response();
        let first = materialize(&mut response).await.unwrap();

        for _ in 0..10 {
            let again = materialize(&mut response).await.unwrap();
            assert_eq!(again, first);
            // same allocation, not a re-drained copy
            assert_eq!(again.as_ptr(), first.as_ptr());
        }
    }

    #[tokio::test]
    async fn replaced_stream_is_drained_again() {
        let mut response = streamed_response();
        let first = materialize(&mut response).await.unwrap();
        assert_eq!(first, PAGE.as_bytes());

        *response.body_mut() = ProxyBody::Stream(Body::from("rewritten"));
        let second = materialize(&mut response).await.unwrap();
        assert_eq!(second, "rewritten".as_bytes());
    }

    #[tokio::test]
    async fn announced_length_is_only_a_capacity_hint() {
        let mut response = Response::builder()
            .header(header::CONTENT_LENGTH, PAGE.len())
            .body(ProxyBody::Stream(Body::from(PAGE)))
            .unwrap();

        let bytes = materialize(&mut response).await.unwrap();
        assert_eq!(bytes, PAGE.as_bytes());
    }

    #[tokio::test]
    async fn empty_body_buffers_to_empty_bytes() {
        let mut response = Response::new(ProxyBody::Stream(Body::empty()));
        let bytes = materialize(&mut response).await.unwrap();
        assert!(bytes.is_empty());
        assert!(response.body().is_buffered());
    }
}
