//! Request-audit capture pipeline.
//!
//! The [`middleware`] observes registered routes and composes one
//! [`CreateAuditRecord`](reqtrail_db::models::audit::CreateAuditRecord) per
//! request; the [`writer`] persists it off the request path through an
//! [`AuditSink`].

mod body;
pub mod capture;
pub mod middleware;
pub mod registry;
pub mod sink;
pub mod writer;

pub use middleware::{audit_middleware, AuditInterceptor};
pub use registry::AuditRegistry;
pub use sink::{AuditSink, PgAuditSink};
pub use writer::{AuditWriter, AuditWriterConfig};
