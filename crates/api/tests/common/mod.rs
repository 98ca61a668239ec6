//! Shared helpers for API integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use reqtrail_api::audit::{
    AuditInterceptor, AuditRegistry, AuditSink, AuditWriter, AuditWriterConfig,
};
use reqtrail_api::config::{AuditConfig, ServerConfig};
use reqtrail_api::router::build_app_router;
use reqtrail_api::routes;
use reqtrail_api::state::AppState;
use reqtrail_db::models::audit::CreateAuditRecord;

// ---------------------------------------------------------------------------
// In-memory sinks
// ---------------------------------------------------------------------------

/// Collects records in memory.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<CreateAuditRecord>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<CreateAuditRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Poll until at least `n` records arrived, or fail after two seconds.
    pub async fn wait_for(&self, n: usize) -> Vec<CreateAuditRecord> {
        for _ in 0..200 {
            let records = self.records();
            if records.len() >= n {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} audit records, got {}", self.records().len());
    }

    /// Give the writer a moment, then assert nothing was recorded.
    pub async fn assert_empty(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(self.records().is_empty(), "unexpected records: {:?}", self.records());
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn insert(&self, record: &CreateAuditRecord) -> Result<(), sqlx::Error> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Holds every insert until [`GatedSink::release`] is called.
pub struct GatedSink {
    gate: Semaphore,
    pub inner: MemorySink,
}

impl GatedSink {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            inner: MemorySink::default(),
        }
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl AuditSink for GatedSink {
    async fn insert(&self, record: &CreateAuditRecord) -> Result<(), sqlx::Error> {
        let permit = self.gate.acquire().await.map_err(|_| sqlx::Error::PoolClosed)?;
        permit.forget();
        self.inner.insert(record).await
    }
}

// ---------------------------------------------------------------------------
// App builders
// ---------------------------------------------------------------------------

/// Build an interceptor writing to `sink`.
pub fn interceptor(
    config: &AuditConfig,
    registry: AuditRegistry,
    sink: Arc<dyn AuditSink>,
) -> AuditInterceptor {
    let (writer, _handle) = AuditWriter::spawn(
        sink,
        AuditWriterConfig {
            queue_capacity: config.queue_capacity,
            concurrency: config.writer_concurrency,
        },
    );
    AuditInterceptor::new(config, registry, writer).expect("valid exclusion patterns")
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        audit: AuditConfig::default(),
    }
}

/// Build the full application router against `pool`, auditing into `sink`.
///
/// Uses [`build_app_router`] so tests exercise the production middleware
/// stack.
pub fn build_test_app(pool: PgPool, sink: Arc<dyn AuditSink>) -> Router {
    let config = test_config();
    let interceptor = interceptor(&config.audit, routes::audited_routes(), sink);
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };
    build_app_router(state, &config, interceptor)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("JSON body")
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}
