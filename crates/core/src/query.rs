//! Pagination and sorting rules for audit record listings.

use crate::error::CoreError;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 500;
pub const DEFAULT_TOP_N: i64 = 10;

/// Clamp a user-provided limit to `[1, max]`, using `default` when absent.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).max(1).min(max)
}

/// Clamp a user-provided offset to non-negative.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

/// Columns an audit listing may be sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Timestamp,
    StatusCode,
    ExecutionTime,
    HttpMethod,
    Endpoint,
    UserId,
    ServiceName,
}

impl SortField {
    /// Parse a sort field, accepting both snake_case and camelCase names.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "timestamp" => Ok(Self::Timestamp),
            "status_code" | "statusCode" => Ok(Self::StatusCode),
            "execution_time_ms" | "executionTimeMs" => Ok(Self::ExecutionTime),
            "http_method" | "httpMethod" => Ok(Self::HttpMethod),
            "endpoint" => Ok(Self::Endpoint),
            "user_id" | "userId" => Ok(Self::UserId),
            "service_name" | "serviceName" => Ok(Self::ServiceName),
            other => Err(CoreError::Validation(format!("Unknown sort field '{other}'"))),
        }
    }

    /// The column name this field sorts on.
    pub fn column(self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::StatusCode => "status_code",
            Self::ExecutionTime => "execution_time_ms",
            Self::HttpMethod => "http_method",
            Self::Endpoint => "endpoint",
            Self::UserId => "user_id",
            Self::ServiceName => "service_name",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(CoreError::Validation(format!("Unknown sort order '{other}'"))),
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}
