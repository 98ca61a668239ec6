//! Handlers for the audit reporting and retention endpoints.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use reqtrail_core::error::CoreError;
use reqtrail_core::query::{
    clamp_limit, clamp_offset, SortField, SortOrder, DEFAULT_LIMIT, DEFAULT_TOP_N, MAX_LIMIT,
};
use reqtrail_core::types::{DbId, Timestamp};
use reqtrail_db::models::audit::{AuditQuery, AuditRecordPage};
use reqtrail_db::repositories::AuditRecordRepo;
use serde::{Deserialize, Serialize};

use crate::background::audit_retention;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Upper bound for the `top` parameter of the statistics endpoint.
const MAX_TOP_N: i64 = 100;

// ---------------------------------------------------------------------------
// Request / query parameter types
// ---------------------------------------------------------------------------

/// Query parameters for audit record listings.
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQueryParams {
    pub user_id: Option<String>,
    pub service_name: Option<String>,
    pub http_method: Option<String>,
    pub status_code: Option<i32>,
    pub endpoint: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// Query parameters for the statistics endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub top: Option<i64>,
}

/// Query parameters for the cleanup endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct CleanupParams {
    /// Defaults to `AUDIT_RETENTION_DAYS`.
    pub older_than_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub deleted: u64,
    pub cutoff: Timestamp,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse an optional RFC 3339 timestamp.
fn parse_timestamp(field: &str, s: Option<&str>) -> AppResult<Option<Timestamp>> {
    s.map(|v| {
        v.parse::<Timestamp>()
            .map_err(|_| AppError::BadRequest(format!("Invalid date format for '{field}'")))
    })
    .transpose()
}

impl AuditLogQueryParams {
    fn into_query(self) -> AppResult<AuditQuery> {
        let from = parse_timestamp("from", self.from.as_deref())?;
        let to = parse_timestamp("to", self.to.as_deref())?;

        let sort_by = self
            .sort_by
            .as_deref()
            .map(SortField::parse)
            .transpose()?
            .unwrap_or_default();
        let sort_order = self
            .sort_order
            .as_deref()
            .map(SortOrder::parse)
            .transpose()?
            .unwrap_or_default();

        Ok(AuditQuery {
            user_id: self.user_id,
            service_name: self.service_name,
            http_method: self.http_method,
            status_code: self.status_code,
            endpoint: self.endpoint,
            from,
            to,
            limit: Some(clamp_limit(self.limit, DEFAULT_LIMIT, MAX_LIMIT)),
            offset: Some(clamp_offset(self.offset)),
            sort_by,
            sort_order,
        })
    }
}

// ---------------------------------------------------------------------------
// Query audit records
// ---------------------------------------------------------------------------

/// GET /admin/audit-logs
///
/// Filtered, sorted and paginated listing.
pub async fn query_audit_logs(
    State(state): State<AppState>,
    Query(params): Query<AuditLogQueryParams>,
) -> AppResult<impl IntoResponse> {
    let query = params.into_query()?;

    let items = AuditRecordRepo::query(&state.pool, &query).await?;
    let total = AuditRecordRepo::count(&state.pool, &query).await?;

    Ok(Json(DataResponse {
        data: AuditRecordPage {
            items,
            total,
            limit: query.limit.unwrap_or(DEFAULT_LIMIT),
            offset: query.offset.unwrap_or(0),
        },
    }))
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// GET /admin/audit-logs/stats
pub async fn audit_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> AppResult<impl IntoResponse> {
    let from = parse_timestamp("from", params.from.as_deref())?;
    let to = parse_timestamp("to", params.to.as_deref())?;
    let top = clamp_limit(params.top, DEFAULT_TOP_N, MAX_TOP_N);

    let stats = AuditRecordRepo::stats(&state.pool, from, to, top).await?;
    Ok(Json(DataResponse { data: stats }))
}

// ---------------------------------------------------------------------------
// Single record
// ---------------------------------------------------------------------------

/// GET /admin/audit-logs/{id}
pub async fn get_audit_log(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let record = AuditRecordRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "AuditRecord",
            id,
        })?;
    Ok(Json(DataResponse { data: record }))
}

// ---------------------------------------------------------------------------
// Retention cleanup
// ---------------------------------------------------------------------------

/// DELETE /admin/audit-logs?older_than_days=N
///
/// Deletes records older than `N` days and reports how many were removed.
pub async fn cleanup_audit_logs(
    State(state): State<AppState>,
    Query(params): Query<CleanupParams>,
) -> AppResult<impl IntoResponse> {
    let days = params
        .older_than_days
        .unwrap_or(state.config.audit.retention_days);
    let cutoff = audit_retention::cutoff_for(days).ok_or_else(|| {
        AppError::BadRequest(format!(
            "older_than_days must be a non-negative day count in range, got {days}"
        ))
    })?;

    let deleted = AuditRecordRepo::delete_older_than(&state.pool, cutoff).await?;
    tracing::info!(deleted, days, "Audit records purged on request");

    Ok(Json(DataResponse {
        data: CleanupResult { deleted, cutoff },
    }))
}
