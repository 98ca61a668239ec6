pub mod audit;

use axum::Router;

use crate::audit::AuditRegistry;
use crate::state::AppState;

/// Build the application route tree.
///
/// Routes are merged rather than nested: the audit middleware keys its
/// registry on the full route template reported by `MatchedPath`, which
/// axum does not expose to outer layers of a nested router.
///
/// ```text
/// /admin/audit-logs                 list (GET), cleanup (DELETE)
/// /admin/audit-logs/stats           aggregate statistics
/// /admin/audit-logs/{id}            single record
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(audit::router())
}

/// Audit registrations for every route in [`api_routes`].
pub fn audited_routes() -> AuditRegistry {
    AuditRegistry::new().merge(audit::audited())
}
