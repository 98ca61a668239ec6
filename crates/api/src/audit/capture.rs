//! Composition of an audit record from a settled request.

use std::time::Duration;

use axum::http::StatusCode;
use reqtrail_core::policy::EffectivePolicy;
use reqtrail_core::request::{strip_nul, RequestInfo};
use reqtrail_core::sanitize::REDACTED;
use reqtrail_core::token::TokenInfo;
use reqtrail_core::types::Timestamp;
use reqtrail_db::models::audit::CreateAuditRecord;
use serde_json::Value;

/// Everything captured before the handler runs.
#[derive(Debug, Clone)]
pub struct Capture {
    /// Wall-clock time the request entered the interceptor.
    pub timestamp: Timestamp,
    pub request: RequestInfo,
    pub token: TokenInfo,
    pub policy: EffectivePolicy,
}

/// How the handler finished.
#[derive(Debug, Clone)]
pub enum Settlement {
    Completed {
        status: StatusCode,
        /// Present only when response logging is enabled.
        body: Option<Value>,
    },
    /// Error response or panic. A missing status is recorded as 500.
    Failed {
        status: Option<StatusCode>,
        message: String,
    },
}

impl Capture {
    /// Build the persisted record. `elapsed` is measured from interceptor
    /// entry to settlement.
    pub fn into_record(
        self,
        settlement: Settlement,
        elapsed: Duration,
        redact_token: bool,
    ) -> CreateAuditRecord {
        let request_data = self
            .policy
            .log_request_body
            .then(|| self.request.to_request_data());

        let (status, response_data) = match settlement {
            Settlement::Completed { status, body } => (
                status,
                if self.policy.log_response_body {
                    Some(body.unwrap_or(Value::Null))
                } else {
                    None
                },
            ),
            Settlement::Failed { status, message } => (
                status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                self.policy
                    .log_response_body
                    .then(|| strip_nul(Value::String(message))),
            ),
        };

        let token = self.token.token.map(|t| {
            if redact_token {
                REDACTED.to_string()
            } else {
                t
            }
        });

        CreateAuditRecord {
            timestamp: self.timestamp,
            user_id: self.token.user_id,
            user_email: self.token.user_email,
            http_method: self.request.method,
            endpoint: self.request.endpoint,
            service_name: self.policy.service_name,
            action_description: self.policy.description,
            request_data,
            response_data,
            user_agent: self.request.user_agent,
            ip_address: self.request.ip_address,
            token,
            status_code: i32::from(status.as_u16()),
            execution_time_ms: i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
        }
    }
}
