//! Audit capture middleware.
//!
//! Install with [`axum::Router::route_layer`] so axum's [`MatchedPath`] is
//! available:
//!
//! ```ignore
//! router.route_layer(axum::middleware::from_fn_with_state(interceptor, audit_middleware))
//! ```
//!
//! Requests whose `(method, matched route)` is not in the [`AuditRegistry`],
//! or whose path is excluded, pass through untouched. For everything else
//! the middleware snapshots the request, runs the handler, and enqueues
//! exactly one record describing the outcome. The response is never
//! delayed by persistence. When the response body is logged, the record is
//! enqueued once the body has been streamed to the client.

use std::any::Any;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, MatchedPath, Query, Request, State};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::FutureExt;
use reqtrail_core::error::CoreError;
use reqtrail_core::exclusion::ExclusionMatcher;
use reqtrail_core::policy::{BodyLogging, EffectivePolicy};
use reqtrail_core::request::RequestInfo;
use reqtrail_core::token::{TokenExtractor, TokenInfo};

use super::body::{capture_request, ResponseCapture};
use super::capture::{Capture, Settlement};
use super::registry::AuditRegistry;
use super::writer::AuditWriter;
use crate::config::AuditConfig;
use crate::error::{AppError, HandlerFailure};

/// Shared interceptor state. Cheap to clone.
#[derive(Clone)]
pub struct AuditInterceptor {
    inner: Arc<Inner>,
}

struct Inner {
    registry: AuditRegistry,
    exclusions: ExclusionMatcher,
    body_logging: BodyLogging,
    max_body_bytes: usize,
    redact_token: bool,
    tokens: TokenExtractor,
    writer: AuditWriter,
}

impl AuditInterceptor {
    /// Compile the exclusion patterns and bind the interceptor to a writer.
    pub fn new(
        config: &AuditConfig,
        registry: AuditRegistry,
        writer: AuditWriter,
    ) -> Result<Self, CoreError> {
        let exclusions = ExclusionMatcher::new(&config.exclude_routes)?;
        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                exclusions,
                body_logging: config.body_logging(),
                max_body_bytes: config.max_body_bytes,
                redact_token: config.redact_token,
                tokens: config.token_extractor.clone(),
                writer,
            }),
        })
    }

    /// Resolve the policy for this request, or `None` if it is not audited.
    fn policy_for(&self, request: &Request) -> Option<EffectivePolicy> {
        let route = request.extensions().get::<MatchedPath>()?;
        let policy = self.inner.registry.lookup(request.method(), route.as_str())?;
        if self.inner.exclusions.is_excluded(request.uri().path()) {
            tracing::debug!(path = %request.uri().path(), "Audit skipped: excluded route");
            return None;
        }
        Some(policy.resolve(&self.inner.body_logging))
    }

    fn extract_token(&self, info: &RequestInfo) -> TokenInfo {
        std::panic::catch_unwind(AssertUnwindSafe(|| self.inner.tokens.extract(info)))
            .unwrap_or_else(|_| {
                tracing::debug!("Token extraction panicked; recording without identity");
                TokenInfo::default()
            })
    }

    pub(super) fn enqueue(&self, capture: Capture, settlement: Settlement, elapsed: Duration) {
        let record = capture.into_record(settlement, elapsed, self.inner.redact_token);
        tracing::debug!(
            method = %record.http_method,
            endpoint = %record.endpoint,
            status = record.status_code,
            elapsed_ms = record.execution_time_ms,
            "Audit record captured"
        );
        self.inner.writer.send(record);
    }
}

/// Axum middleware entry point. See the module docs for installation.
pub async fn audit_middleware(
    State(interceptor): State<AuditInterceptor>,
    request: Request,
    next: Next,
) -> Response {
    let Some(policy) = interceptor.policy_for(&request) else {
        return next.run(request).await;
    };

    let started = Instant::now();
    let timestamp = Utc::now();
    let (parts, body) = request.into_parts();
    let mut info = request_info(&parts);

    let body = if policy.log_request_body {
        match capture_request(body, interceptor.inner.max_body_bytes).await {
            Ok((value, body)) => {
                info.body = Some(value);
                body
            }
            Err(e) => {
                let err = AppError::BadRequest(format!("Failed to read request body: {e}"));
                let token = interceptor.extract_token(&info);
                let settlement = Settlement::Failed {
                    status: Some(StatusCode::BAD_REQUEST),
                    message: err.to_string(),
                };
                let capture = Capture {
                    timestamp,
                    request: info,
                    token,
                    policy,
                };
                interceptor.enqueue(capture, settlement, started.elapsed());
                return err.into_response();
            }
        }
    } else {
        body
    };

    let token = interceptor.extract_token(&info);
    let capture = Capture {
        timestamp,
        request: info,
        token,
        policy,
    };

    let request = Request::from_parts(parts, body);
    let outcome = AssertUnwindSafe(next.run(request)).catch_unwind().await;

    let mut response = match outcome {
        Ok(response) => response,
        Err(panic) => {
            let settlement = Settlement::Failed {
                status: None,
                message: panic_message(panic.as_ref()),
            };
            interceptor.enqueue(capture, settlement, started.elapsed());
            std::panic::resume_unwind(panic);
        }
    };

    if let Some(failure) = response.extensions_mut().remove::<HandlerFailure>() {
        let settlement = Settlement::Failed {
            status: failure.status.or(Some(response.status())),
            message: failure.message,
        };
        interceptor.enqueue(capture, settlement, started.elapsed());
        return response;
    }

    if !capture.policy.log_response_body {
        let settlement = Settlement::Completed {
            status: response.status(),
            body: None,
        };
        interceptor.enqueue(capture, settlement, started.elapsed());
        return response;
    }

    let elapsed = started.elapsed();
    let max_body_bytes = interceptor.inner.max_body_bytes;
    let (parts, body) = response.into_parts();
    let status = parts.status;
    let body = ResponseCapture::wrap(body, max_body_bytes, interceptor, capture, status, elapsed);
    Response::from_parts(parts, body)
}

/// Snapshot the request head. Never fails; unreadable values are skipped.
fn request_info(parts: &Parts) -> RequestInfo {
    let path = parts.uri.path().to_string();
    let endpoint = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let query = Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(q)| q)
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Unparseable query string");
            BTreeMap::new()
        });

    let user_agent = parts
        .headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    RequestInfo {
        method: parts.method.as_str().to_string(),
        path,
        endpoint,
        headers: header_map(&parts.headers),
        query,
        body: None,
        user_agent,
        ip_address: client_ip(parts),
    }
}

/// Flatten headers into lower-case keys. Repeated headers are joined with `", "`.
fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    map
}

/// First `X-Forwarded-For` entry, then `X-Real-IP`, then the peer address.
fn client_ip(parts: &Parts) -> Option<String> {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return Some(first.to_string());
        }
    }
    if let Some(real_ip) = header("x-real-ip") {
        return Some(real_ip.to_string());
    }
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
