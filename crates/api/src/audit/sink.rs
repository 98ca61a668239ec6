//! Persistence boundary for captured audit records.

use async_trait::async_trait;
use reqtrail_db::models::audit::CreateAuditRecord;
use reqtrail_db::repositories::AuditRecordRepo;
use reqtrail_db::DbPool;

/// Destination for audit records produced by the interceptor.
///
/// Implementations must be safe to call concurrently; the writer issues up
/// to `AUDIT_WRITER_CONCURRENCY` inserts at once.
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    async fn insert(&self, record: &CreateAuditRecord) -> Result<(), sqlx::Error>;
}

/// [`AuditSink`] backed by the `audit_records` table.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: DbPool,
}

impl PgAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn insert(&self, record: &CreateAuditRecord) -> Result<(), sqlx::Error> {
        let stored = AuditRecordRepo::insert(&self.pool, record).await?;
        tracing::debug!(id = stored.id, endpoint = %stored.endpoint, "Audit record stored");
        Ok(())
    }
}
