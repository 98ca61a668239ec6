//! Periodic cleanup of old audit records.
//!
//! Deletes rows from `audit_records` whose request timestamp is older than
//! the configured retention period. Runs on a fixed interval using
//! `tokio::time::interval`.

use std::time::Duration;

use chrono::Utc;
use reqtrail_core::types::Timestamp;
use reqtrail_db::repositories::AuditRecordRepo;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

/// Cutoff for a retention of `days`: records strictly older are removed.
///
/// `None` when `days` is negative or reaches past the representable range.
pub fn cutoff_for(days: i64) -> Option<Timestamp> {
    if days < 0 {
        return None;
    }
    Utc::now().checked_sub_signed(chrono::Duration::try_days(days)?)
}

/// Delete every record older than `days`. Returns the number of rows removed.
///
/// A `days` value without a valid cutoff deletes nothing.
pub async fn cleanup_older_than(pool: &PgPool, days: i64) -> Result<u64, sqlx::Error> {
    let Some(cutoff) = cutoff_for(days) else {
        tracing::warn!(days, "Audit retention: no valid cutoff, skipping");
        return Ok(0);
    };
    AuditRecordRepo::delete_older_than(pool, cutoff).await
}

/// Run the audit retention cleanup loop until `cancel` is triggered.
///
/// The first pass runs immediately. `interval` must be non-zero.
pub async fn run(pool: PgPool, retention_days: i64, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        retention_days,
        interval_secs = interval.as_secs(),
        "Audit retention job started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Audit retention job stopping");
                break;
            }
            _ = ticker.tick() => {
                match cleanup_older_than(&pool, retention_days).await {
                    Ok(deleted) => {
                        if deleted > 0 {
                            tracing::info!(deleted, "Audit retention: purged old records");
                        } else {
                            tracing::debug!("Audit retention: no records to purge");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Audit retention: cleanup failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_is_in_the_past() {
        let cutoff = cutoff_for(30).unwrap();
        let age = Utc::now() - cutoff;
        assert!(age >= chrono::Duration::days(30));
        assert!(age < chrono::Duration::days(30) + chrono::Duration::seconds(5));
    }

    #[test]
    fn zero_days_cuts_at_now() {
        assert!(Utc::now() - cutoff_for(0).unwrap() < chrono::Duration::seconds(5));
    }

    #[test]
    fn out_of_range_days_have_no_cutoff() {
        assert!(cutoff_for(-1).is_none());
        assert!(cutoff_for(100_000_000).is_none());
        assert!(cutoff_for(i64::MAX).is_none());
    }
}
