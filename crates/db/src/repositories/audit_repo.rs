//! Repository for the `audit_records` table.

use reqtrail_core::query::{clamp_limit, clamp_offset, DEFAULT_LIMIT, MAX_LIMIT};
use reqtrail_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::audit::{
    AuditQuery, AuditRecord, AuditStats, AuditTotals, CreateAuditRecord, EndpointCount, UserCount,
};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

/// Column list for `audit_records` SELECT queries.
const COLUMNS: &str = "\
    id, timestamp, user_id, user_email, http_method, endpoint, \
    service_name, action_description, request_data, response_data, \
    user_agent, ip_address, token, status_code, execution_time_ms, created_at";

/// Column list for INSERT (excludes auto-generated `id` and `created_at`).
const INSERT_COLUMNS: &str = "\
    timestamp, user_id, user_email, http_method, endpoint, \
    service_name, action_description, request_data, response_data, \
    user_agent, ip_address, token, status_code, execution_time_ms";

// ---------------------------------------------------------------------------
// AuditRecordRepo
// ---------------------------------------------------------------------------

/// Provides insert, query, aggregate and retention operations for audit records.
pub struct AuditRecordRepo;

impl AuditRecordRepo {
    /// Insert a single audit record, returning the stored row.
    pub async fn insert(
        pool: &PgPool,
        record: &CreateAuditRecord,
    ) -> Result<AuditRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO audit_records ({INSERT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuditRecord>(&query)
            .bind(record.timestamp)
            .bind(&record.user_id)
            .bind(&record.user_email)
            .bind(&record.http_method)
            .bind(&record.endpoint)
            .bind(&record.service_name)
            .bind(&record.action_description)
            .bind(&record.request_data)
            .bind(&record.response_data)
            .bind(&record.user_agent)
            .bind(&record.ip_address)
            .bind(&record.token)
            .bind(record.status_code)
            .bind(record.execution_time_ms)
            .fetch_one(pool)
            .await
    }

    /// Find a single record by id.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<AuditRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM audit_records WHERE id = $1");
        sqlx::query_as::<_, AuditRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Query audit records with filtering, sorting and pagination.
    pub async fn query(
        pool: &PgPool,
        params: &AuditQuery,
    ) -> Result<Vec<AuditRecord>, sqlx::Error> {
        let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
        let offset = clamp_offset(params.offset);

        let (where_clause, bind_values, bind_idx) = build_audit_filter(params);

        // The sort column comes from a closed enum, never from user text.
        let query = format!(
            "SELECT {COLUMNS} FROM audit_records {where_clause} \
             ORDER BY {} {}, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            params.sort_by.column(),
            params.sort_order.as_sql(),
            bind_idx + 1
        );

        let q = bind_audit_values(sqlx::query_as::<_, AuditRecord>(&query), &bind_values);
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Count audit records matching the given filter (for pagination metadata).
    pub async fn count(pool: &PgPool, params: &AuditQuery) -> Result<i64, sqlx::Error> {
        let (where_clause, bind_values, _) = build_audit_filter(params);

        let query = format!("SELECT COUNT(*)::BIGINT AS count FROM audit_records {where_clause}");

        let q = bind_audit_values_scalar(sqlx::query_scalar::<_, i64>(&query), &bind_values);
        q.fetch_one(pool).await
    }

    /// Aggregate statistics over an optional time range.
    ///
    /// `top_n` bounds both the top-endpoint and top-user lists. Records
    /// without a `user_id` are left out of the top-user list.
    pub async fn stats(
        pool: &PgPool,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
        top_n: i64,
    ) -> Result<AuditStats, sqlx::Error> {
        let range = AuditQuery {
            from,
            to,
            ..Default::default()
        };
        let (where_clause, bind_values, bind_idx) = build_audit_filter(&range);

        let totals_query = format!(
            "SELECT \
                COUNT(*)::BIGINT AS total_requests, \
                COUNT(*) FILTER (WHERE status_code < 400)::BIGINT AS success_count, \
                COUNT(*) FILTER (WHERE status_code >= 400)::BIGINT AS failure_count, \
                AVG(execution_time_ms)::FLOAT8 AS avg_execution_time_ms \
             FROM audit_records {where_clause}"
        );
        let totals = bind_audit_values(sqlx::query_as::<_, AuditTotals>(&totals_query), &bind_values)
            .fetch_one(pool)
            .await?;

        let endpoints_query = format!(
            "SELECT endpoint, COUNT(*)::BIGINT AS count \
             FROM audit_records {where_clause} \
             GROUP BY endpoint \
             ORDER BY count DESC, endpoint ASC \
             LIMIT ${bind_idx}"
        );
        let top_endpoints =
            bind_audit_values(sqlx::query_as::<_, EndpointCount>(&endpoints_query), &bind_values)
                .bind(top_n)
                .fetch_all(pool)
                .await?;

        let user_condition = if where_clause.is_empty() {
            "WHERE user_id IS NOT NULL".to_string()
        } else {
            format!("{where_clause} AND user_id IS NOT NULL")
        };
        let users_query = format!(
            "SELECT user_id, COUNT(*)::BIGINT AS count \
             FROM audit_records {user_condition} \
             GROUP BY user_id \
             ORDER BY count DESC, user_id ASC \
             LIMIT ${bind_idx}"
        );
        let top_users = bind_audit_values(sqlx::query_as::<_, UserCount>(&users_query), &bind_values)
            .bind(top_n)
            .fetch_all(pool)
            .await?;

        Ok(AuditStats {
            total_requests: totals.total_requests,
            success_count: totals.success_count,
            failure_count: totals.failure_count,
            avg_execution_time_ms: totals.avg_execution_time_ms,
            top_endpoints,
            top_users,
        })
    }

    /// Delete every record whose request `timestamp` is before `cutoff`.
    ///
    /// Returns the number of rows deleted.
    pub async fn delete_older_than(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM audit_records WHERE timestamp < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Internal helpers for dynamic query building
// ---------------------------------------------------------------------------

/// Typed bind value for dynamically-built audit queries.
enum BindValue {
    Int(i32),
    Text(String),
    Timestamp(Timestamp),
}

/// Build a WHERE clause and bind values from `AuditQuery` filter parameters.
///
/// Returns `(where_clause, bind_values, next_bind_index)`.
/// The `where_clause` is empty if no filters are active, or starts with `WHERE `.
fn build_audit_filter(params: &AuditQuery) -> (String, Vec<BindValue>, u32) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_idx = 1u32;
    let mut bind_values: Vec<BindValue> = Vec::new();

    if let Some(ref user_id) = params.user_id {
        conditions.push(format!("user_id = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(user_id.clone()));
    }

    if let Some(ref service_name) = params.service_name {
        conditions.push(format!("service_name = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(service_name.clone()));
    }

    if let Some(ref http_method) = params.http_method {
        conditions.push(format!("http_method = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(http_method.to_ascii_uppercase()));
    }

    if let Some(status_code) = params.status_code {
        conditions.push(format!("status_code = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Int(status_code));
    }

    if let Some(ref endpoint) = params.endpoint {
        conditions.push(format!("endpoint ILIKE ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(format!("%{}%", escape_like(endpoint))));
    }

    if let Some(from) = params.from {
        conditions.push(format!("timestamp >= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(from));
    }

    if let Some(to) = params.to {
        conditions.push(format!("timestamp <= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(to));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    (where_clause, bind_values, bind_idx)
}

/// Escape `LIKE` wildcards so the filter is a plain substring match.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Bind a slice of `BindValue` to a sqlx `QueryAs`.
fn bind_audit_values<'q, O>(
    mut q: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    bind_values: &'q [BindValue],
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    for val in bind_values {
        match val {
            BindValue::Int(v) => q = q.bind(*v),
            BindValue::Text(v) => q = q.bind(v.as_str()),
            BindValue::Timestamp(v) => q = q.bind(*v),
        }
    }
    q
}

/// Bind a slice of `BindValue` to a sqlx `QueryScalar`.
fn bind_audit_values_scalar<'q>(
    mut q: sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments>,
    bind_values: &'q [BindValue],
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments> {
    for val in bind_values {
        match val {
            BindValue::Int(v) => q = q.bind(*v),
            BindValue::Text(v) => q = q.bind(v.as_str()),
            BindValue::Timestamp(v) => q = q.bind(*v),
        }
    }
    q
}
