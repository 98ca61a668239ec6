//! Bounded body capture.
//!
//! Neither side holds more than `limit + 1` bytes for the record. The request
//! is replayed to the handler from the captured prefix plus the unread rest;
//! the response is forwarded chunk by chunk while its prefix is copied, and
//! the record is enqueued once the body ends or is dropped.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::{Body, BodyDataStream, Bytes};
use axum::http::StatusCode;
use futures::{Stream, StreamExt};
use reqtrail_core::request::{capture_body, TRUNCATED};
use serde_json::Value;

use super::capture::{Capture, Settlement};
use super::middleware::AuditInterceptor;

/// Read the request body up to `limit + 1` bytes.
///
/// Returns the value to record and a body that yields the full original
/// stream. Bodies past the limit are recorded as [`TRUNCATED`].
pub(super) async fn capture_request(
    body: Body,
    limit: usize,
) -> Result<(Value, Body), axum::Error> {
    let mut stream = body.into_data_stream();
    let mut head: Vec<Bytes> = Vec::new();
    let mut seen = 0usize;

    while seen <= limit {
        match stream.next().await {
            Some(chunk) => {
                let chunk = chunk?;
                seen = seen.saturating_add(chunk.len());
                head.push(chunk);
            }
            None => {
                let bytes = head.concat();
                return Ok((capture_body(&bytes, limit), Body::from(bytes)));
            }
        }
    }

    let prefix = futures::stream::iter(head.into_iter().map(Ok::<_, axum::Error>));
    Ok((
        Value::String(TRUNCATED.to_string()),
        Body::from_stream(prefix.chain(stream)),
    ))
}

/// Everything needed to settle the record once the response body is done.
struct Pending {
    interceptor: AuditInterceptor,
    capture: Capture,
    status: StatusCode,
    /// Measured when the handler returned, not when the body finished.
    elapsed: Duration,
}

enum BodyEnd {
    Complete,
    Failed(String),
    Dropped,
}

/// Response body pass-through that copies a bounded prefix for the record.
pub(super) struct ResponseCapture {
    inner: BodyDataStream,
    captured: Vec<u8>,
    limit: usize,
    pending: Option<Pending>,
}

impl ResponseCapture {
    pub(super) fn wrap(
        body: Body,
        limit: usize,
        interceptor: AuditInterceptor,
        capture: Capture,
        status: StatusCode,
        elapsed: Duration,
    ) -> Body {
        Body::from_stream(Self {
            inner: body.into_data_stream(),
            captured: Vec::new(),
            limit,
            pending: Some(Pending {
                interceptor,
                capture,
                status,
                elapsed,
            }),
        })
    }

    fn copy(&mut self, chunk: &[u8]) {
        let room = self
            .limit
            .saturating_add(1)
            .saturating_sub(self.captured.len());
        self.captured
            .extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn finish(&mut self, end: BodyEnd) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let settlement = match end {
            BodyEnd::Complete => Settlement::Completed {
                status: pending.status,
                body: Some(capture_body(&self.captured, self.limit)),
            },
            BodyEnd::Failed(message) => Settlement::Failed {
                status: Some(pending.status),
                message: format!("Failed to read response body: {message}"),
            },
            BodyEnd::Dropped if self.captured.is_empty() => Settlement::Completed {
                status: pending.status,
                body: None,
            },
            BodyEnd::Dropped => Settlement::Completed {
                status: pending.status,
                body: Some(Value::String(TRUNCATED.to_string())),
            },
        };
        pending
            .interceptor
            .enqueue(pending.capture, settlement, pending.elapsed);
    }
}

impl Stream for ResponseCapture {
    type Item = Result<Bytes, axum::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let polled = Pin::new(&mut this.inner).poll_next(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => this.copy(chunk),
            Poll::Ready(Some(Err(e))) => this.finish(BodyEnd::Failed(e.to_string())),
            Poll::Ready(None) => this.finish(BodyEnd::Complete),
            Poll::Pending => {}
        }
        polled
    }
}

impl Drop for ResponseCapture {
    fn drop(&mut self) {
        self.finish(BodyEnd::Dropped);
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    fn chunked(parts: &[&'static str]) -> Body {
        let chunks: Vec<Result<Bytes, std::io::Error>> = parts
            .iter()
            .copied()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        Body::from_stream(futures::stream::iter(chunks))
    }

    async fn collect(body: Body) -> Vec<u8> {
        body.collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn small_request_body_is_captured_whole() {
        let (value, body) = capture_request(chunked(&["{\"a\":", "1}"]), 64)
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!({"a": 1}));
        assert_eq!(collect(body).await, b"{\"a\":1}");
    }

    #[tokio::test]
    async fn large_request_body_is_replayed_in_full() {
        let (value, body) = capture_request(chunked(&["0123", "4567", "89"]), 4)
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!(TRUNCATED));
        assert_eq!(collect(body).await, b"0123456789");
    }

    #[tokio::test]
    async fn exact_limit_is_not_truncated() {
        let (value, _) = capture_request(chunked(&["12", "34"]), 4).await.unwrap();
        assert_eq!(value, serde_json::json!(1234));
    }
}
