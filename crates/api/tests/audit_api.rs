//! Integration tests for the audit reporting and retention endpoints.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{body_json, build_test_app, delete, get, MemorySink};
use reqtrail_db::models::audit::CreateAuditRecord;
use reqtrail_db::repositories::AuditRecordRepo;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn record(endpoint: &str, status_code: i32, age_days: i64) -> CreateAuditRecord {
    CreateAuditRecord {
        timestamp: Utc::now() - Duration::days(age_days),
        user_id: Some("alice".into()),
        user_email: None,
        http_method: "GET".into(),
        endpoint: endpoint.into(),
        service_name: Some("orders".into()),
        action_description: None,
        request_data: None,
        response_data: None,
        user_agent: None,
        ip_address: None,
        token: None,
        status_code,
        execution_time_ms: 5,
    }
}

async fn seed(pool: &PgPool, records: &[CreateAuditRecord]) -> Vec<i64> {
    let mut ids = Vec::new();
    for r in records {
        ids.push(AuditRecordRepo::insert(pool, r).await.unwrap().id);
    }
    ids
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_returns_page_with_total(pool: PgPool) {
    seed(
        &pool,
        &[
            record("/orders", 200, 0),
            record("/orders/1", 404, 0),
            record("/users", 200, 0),
        ],
    )
    .await;
    let app = build_test_app(pool, Arc::new(MemorySink::default()));

    let response = get(app.clone(), "/admin/audit-logs?endpoint=orders&limit=1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["total"], 2);
    assert_eq!(json["data"]["limit"], 1);
    assert_eq!(json["data"]["items"].as_array().unwrap().len(), 1);

    let json = body_json(get(app, "/admin/audit-logs?sort_by=statusCode&sort_order=desc").await).await;
    assert_eq!(json["data"]["items"][0]["status_code"], 404);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_parameters_are_rejected(pool: PgPool) {
    let app = build_test_app(pool, Arc::new(MemorySink::default()));

    let response = get(app.clone(), "/admin/audit-logs?sort_by=password").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    let response = get(app, "/admin/audit-logs?from=yesterday").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Single record / statistics
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn get_by_id_and_not_found(pool: PgPool) {
    let ids = seed(&pool, &[record("/orders", 200, 0)]).await;
    let app = build_test_app(pool, Arc::new(MemorySink::default()));

    let json = body_json(get(app.clone(), &format!("/admin/audit-logs/{}", ids[0])).await).await;
    assert_eq!(json["data"]["endpoint"], "/orders");

    let response = get(app, &format!("/admin/audit-logs/{}", ids[0] + 100)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stats_endpoint_aggregates(pool: PgPool) {
    seed(
        &pool,
        &[
            record("/orders", 200, 0),
            record("/orders", 201, 0),
            record("/users", 500, 0),
        ],
    )
    .await;
    let app = build_test_app(pool, Arc::new(MemorySink::default()));

    let json = body_json(get(app, "/admin/audit-logs/stats?top=1").await).await;
    let stats = &json["data"];
    assert_eq!(stats["total_requests"], 3);
    assert_eq!(stats["success_count"], 2);
    assert_eq!(stats["failure_count"], 1);
    assert_eq!(stats["top_endpoints"].as_array().unwrap().len(), 1);
    assert_eq!(stats["top_endpoints"][0]["endpoint"], "/orders");
    assert_eq!(stats["top_users"][0]["user_id"], "alice");
}

// ---------------------------------------------------------------------------
// Retention cleanup
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn cleanup_deletes_old_records_and_is_audited(pool: PgPool) {
    seed(
        &pool,
        &[
            record("/old", 200, 40),
            record("/older", 200, 100),
            record("/recent", 200, 1),
        ],
    )
    .await;
    let sink = Arc::new(MemorySink::default());
    let app = build_test_app(pool.clone(), sink.clone());

    let response = delete(app.clone(), "/admin/audit-logs?older_than_days=30").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["deleted"], 2);

    let json = body_json(get(app, "/admin/audit-logs").await).await;
    assert_eq!(json["data"]["total"], 1);
    assert_eq!(json["data"]["items"][0]["endpoint"], "/recent");

    let audited = sink.wait_for(1).await;
    assert_eq!(audited.len(), 1, "only the DELETE is audited");
    assert_eq!(audited[0].http_method, "DELETE");
    assert_eq!(audited[0].endpoint, "/admin/audit-logs?older_than_days=30");
    assert_eq!(audited[0].service_name.as_deref(), Some("audit"));
    assert_eq!(audited[0].response_data.as_ref().unwrap()["data"]["deleted"], 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cleanup_rejects_negative_days(pool: PgPool) {
    let sink = Arc::new(MemorySink::default());
    let app = build_test_app(pool, sink.clone());

    let response = delete(app, "/admin/audit-logs?older_than_days=-1").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let audited = sink.wait_for(1).await;
    assert_eq!(audited[0].status_code, 400);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cleanup_rejects_out_of_range_days(pool: PgPool) {
    seed(&pool, &[record("/kept", 200, 1)]).await;
    let sink = Arc::new(MemorySink::default());
    let app = build_test_app(pool.clone(), sink);

    let max = i64::MAX.to_string();
    for days in ["100000000", max.as_str()] {
        let uri = format!("/admin/audit-logs?older_than_days={days}");
        let response = delete(app.clone(), &uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "days = {days}");
    }

    let json = body_json(get(app, "/admin/audit-logs").await).await;
    assert_eq!(json["data"]["total"], 1);
}
