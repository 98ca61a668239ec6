//! Audit record entity models and DTOs.
//!
//! Audit records have no `updated_at` field: once inserted they are never
//! modified, only deleted by the retention cleanup.

use reqtrail_core::query::{SortField, SortOrder};
use reqtrail_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Audit record entity
// ---------------------------------------------------------------------------

/// A single audited request. Immutable once created.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditRecord {
    pub id: DbId,
    /// When the request entered the audit interceptor.
    pub timestamp: Timestamp,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub http_method: String,
    /// Request path including the query string.
    pub endpoint: String,
    pub service_name: Option<String>,
    pub action_description: Option<String>,
    /// Sanitized headers, body and query; only when request logging is on.
    pub request_data: Option<serde_json::Value>,
    /// Response payload or error message; only when response logging is on.
    pub response_data: Option<serde_json::Value>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub token: Option<String>,
    pub status_code: i32,
    pub execution_time_ms: i64,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// DTO for inserting a new audit record. `id` and `created_at` are assigned
/// by the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAuditRecord {
    pub timestamp: Timestamp,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub http_method: String,
    pub endpoint: String,
    pub service_name: Option<String>,
    pub action_description: Option<String>,
    pub request_data: Option<serde_json::Value>,
    pub response_data: Option<serde_json::Value>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub token: Option<String>,
    pub status_code: i32,
    pub execution_time_ms: i64,
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Filter, pagination and sort parameters for listing audit records.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub user_id: Option<String>,
    pub service_name: Option<String>,
    pub http_method: Option<String>,
    pub status_code: Option<i32>,
    /// Case-insensitive substring match on `endpoint`.
    pub endpoint: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

/// Paginated response for audit record queries.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecordPage {
    pub items: Vec<AuditRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Aggregate statistics over a (possibly unbounded) time range.
#[derive(Debug, Clone, Serialize)]
pub struct AuditStats {
    pub total_requests: i64,
    /// Requests answered with a status below 400.
    pub success_count: i64,
    /// Requests answered with a status of 400 or above.
    pub failure_count: i64,
    /// `None` when the range holds no records.
    pub avg_execution_time_ms: Option<f64>,
    pub top_endpoints: Vec<EndpointCount>,
    pub top_users: Vec<UserCount>,
}

/// Scalar part of [`AuditStats`], read in a single query.
#[derive(Debug, Clone, FromRow)]
pub struct AuditTotals {
    pub total_requests: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub avg_execution_time_ms: Option<f64>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EndpointCount {
    pub endpoint: String,
    pub count: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserCount {
    pub user_id: String,
    pub count: i64,
}
