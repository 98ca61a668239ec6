//! Asynchronous audit record writer.
//!
//! Request handlers hand records to an [`AuditWriter`] with a non-blocking
//! `try_send`. A background task drains the bounded queue and inserts
//! through an [`AuditSink`], with at most `concurrency` inserts in flight.
//! Failed inserts are logged and dropped.

use std::sync::Arc;

use reqtrail_db::models::audit::CreateAuditRecord;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use super::sink::AuditSink;

/// Queue and concurrency limits for the writer task.
#[derive(Debug, Clone, Copy)]
pub struct AuditWriterConfig {
    /// Records that may wait for the writer before new ones are dropped.
    pub queue_capacity: usize,
    /// Maximum concurrent inserts.
    pub concurrency: usize,
}

impl Default for AuditWriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            concurrency: 4,
        }
    }
}

/// Sending half of the audit queue. Cheap to clone.
///
/// The writer task exits once every clone has been dropped and all queued
/// and in-flight records are settled.
#[derive(Clone)]
pub struct AuditWriter {
    sender: mpsc::Sender<CreateAuditRecord>,
}

impl AuditWriter {
    /// Start the writer task. The returned handle completes after shutdown.
    pub fn spawn(sink: Arc<dyn AuditSink>, config: AuditWriterConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let handle = tokio::spawn(run(rx, sink, config.concurrency.max(1)));
        (Self { sender: tx }, handle)
    }

    /// Enqueue a record without waiting. Returns `false` if it was dropped.
    ///
    /// A full queue drops the record being sent; records already queued are
    /// kept.
    pub fn send(&self, record: CreateAuditRecord) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                tracing::warn!(
                    endpoint = %record.endpoint,
                    method = %record.http_method,
                    "Audit queue full, dropping record"
                );
                false
            }
            Err(TrySendError::Closed(record)) => {
                tracing::warn!(
                    endpoint = %record.endpoint,
                    "Audit writer stopped, dropping record"
                );
                false
            }
        }
    }
}

async fn run(
    mut rx: mpsc::Receiver<CreateAuditRecord>,
    sink: Arc<dyn AuditSink>,
    concurrency: usize,
) {
    let permits = Arc::new(Semaphore::new(concurrency));
    tracing::info!(concurrency, "Audit writer started");

    while let Some(record) = rx.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let sink = Arc::clone(&sink);
        tokio::spawn(async move {
            if let Err(e) = sink.insert(&record).await {
                tracing::error!(
                    error = %e,
                    endpoint = %record.endpoint,
                    method = %record.http_method,
                    "Failed to persist audit record"
                );
            }
            drop(permit);
        });
    }

    // Wait for in-flight inserts. `concurrency` fits in u32 for any sane config.
    let all = u32::try_from(concurrency).unwrap_or(u32::MAX);
    let _ = permits.acquire_many(all).await;
    tracing::info!("Audit writer stopped");
}
