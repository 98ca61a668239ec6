//! Route definitions for audit reporting and retention.

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use reqtrail_core::policy::AuditPolicy;

use crate::audit::AuditRegistry;
use crate::handlers::audit;
use crate::state::AppState;

/// Base path of the audit reporting API.
pub const AUDIT_LOGS_PATH: &str = "/admin/audit-logs";

/// Audit routes, registered with their full paths so the audit middleware
/// sees complete route templates.
///
/// ```text
/// GET    /admin/audit-logs          -> query_audit_logs
/// DELETE /admin/audit-logs          -> cleanup_audit_logs (audited)
/// GET    /admin/audit-logs/stats    -> audit_stats
/// GET    /admin/audit-logs/{id}     -> get_audit_log
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            AUDIT_LOGS_PATH,
            get(audit::query_audit_logs).delete(audit::cleanup_audit_logs),
        )
        .route(&format!("{AUDIT_LOGS_PATH}/stats"), get(audit::audit_stats))
        .route(&format!("{AUDIT_LOGS_PATH}/{{id}}"), get(audit::get_audit_log))
}

/// Audit policies for the routes above. Only the destructive cleanup is audited.
pub fn audited() -> AuditRegistry {
    AuditRegistry::new().register(
        Method::DELETE,
        AUDIT_LOGS_PATH,
        AuditPolicy::new()
            .service("audit")
            .description("Purge old audit records")
            .log_response_body(true),
    )
}
