//! Message-request bookkeeping: the row written after each forwarded
//! request completes, and the sync/async write paths that persist it.
//!
//! Async mode runs a single-writer task consuming a bounded channel,
//! batching by size or by a flush interval, mirroring the batching
//! strategy `waypoint-logging`'s `SqliteTransport` uses for log events.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use waypoint_core::{KeyId, ProviderId, RequestId, UserId};

use crate::errors::StorageError;
use crate::pool::Pool;

/// One row of billing/audit bookkeeping for a completed request.
#[derive(Clone, Debug)]
pub struct MessageRequestRecord {
    /// Per-request identifier.
    pub request_id: RequestId,
    /// Client key that made the request.
    pub key_id: KeyId,
    /// Owning user.
    pub user_id: UserId,
    /// Provider that ultimately served the request, if any attempt succeeded.
    pub provider_id: Option<ProviderId>,
    /// Model name used for billing, after any redirect.
    pub model: String,
    /// Final HTTP status returned to the client.
    pub status_code: Option<u16>,
    /// Computed cost in USD.
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub created_at: DateTime<Utc>,
}

/// Port for persisting [`MessageRequestRecord`]s, implemented by both the
/// synchronous and buffered writers below.
#[async_trait]
pub trait MessageRequestWriter: Send + Sync {
    /// Feed one record into the write path.
    ///
    /// # Errors
    ///
    /// Returns an error only in sync mode, where the write happens inline;
    /// the async writer never fails here (overflow is handled by dropping
    /// with a warning, not by returning an error to the caller).
    async fn enqueue(&self, record: MessageRequestRecord) -> Result<(), StorageError>;
}

fn insert_record(conn: &rusqlite::Connection, record: &MessageRequestRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO message_requests \
         (id, request_id, key_id, user_id, provider_id, model, status_code, \
          cost_usd, input_tokens, output_tokens, created_at) \
         VALUES (?1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            record.request_id.to_string(),
            record.key_id.to_string(),
            record.user_id.to_string(),
            record.provider_id.as_ref().map(ToString::to_string),
            record.model,
            record.status_code,
            record.cost_usd,
            record.input_tokens,
            record.output_tokens,
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Writes each record inline, on the request path.
pub struct SyncWriter {
    pool: Pool,
}

impl SyncWriter {
    /// Wrap a pool.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRequestWriter for SyncWriter {
    async fn enqueue(&self, record: MessageRequestRecord) -> Result<(), StorageError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let conn = pool.get()?;
            insert_record(&conn, &record)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::TaskPanicked(e.to_string()))?
    }
}

/// Buffers records into a bounded channel drained by a background task.
///
/// When the channel is full, the incoming record is dropped and a warning
/// is logged; this is the documented acceptable backpressure policy.
pub struct AsyncWriter {
    tx: mpsc::Sender<MessageRequestRecord>,
}

impl AsyncWriter {
    /// Spawn the background flush task and return a handle.
    #[must_use]
    pub fn spawn(pool: Pool, batch_size: usize, flush_interval_ms: u64, max_pending: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(max_pending);
        tokio::spawn(run_writer(pool, rx, batch_size, flush_interval_ms));
        Arc::new(Self { tx })
    }
}

#[async_trait]
impl MessageRequestWriter for AsyncWriter {
    async fn enqueue(&self, record: MessageRequestRecord) -> Result<(), StorageError> {
        if self.tx.try_send(record).is_err() {
            tracing::warn!("message_request write buffer full, dropping record");
        }
        Ok(())
    }
}

async fn run_writer(
    pool: Pool,
    mut rx: mpsc::Receiver<MessageRequestRecord>,
    batch_size: usize,
    flush_interval_ms: u64,
) {
    let mut batch = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(flush_interval_ms));

    loop {
        tokio::select! {
            maybe_record = rx.recv() => {
                match maybe_record {
                    Some(record) => {
                        batch.push(record);
                        if batch.len() >= batch_size {
                            flush(&pool, &mut batch).await;
                        }
                    }
                    None => {
                        flush(&pool, &mut batch).await;
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                flush(&pool, &mut batch).await;
            }
        }
    }
}

async fn flush(pool: &Pool, batch: &mut Vec<MessageRequestRecord>) {
    if batch.is_empty() {
        return;
    }
    let records = std::mem::take(batch);
    let pool = pool.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
        let mut conn = pool.get()?;
        let tx = conn.transaction()?;
        for record in &records {
            insert_record(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    })
    .await;

    match result {
        Ok(Err(err)) => tracing::error!(?err, "failed to flush message_request batch"),
        Err(err) => tracing::error!(?err, "failed to flush message_request batch"),
        Ok(Ok(())) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::build_pool;

    fn sample_record() -> MessageRequestRecord {
        MessageRequestRecord {
            request_id: RequestId::new(),
            key_id: KeyId::from("key-1"),
            user_id: UserId::from("user-1"),
            provider_id: Some(ProviderId::from("p1")),
            model: "claude-sonnet".to_string(),
            status_code: Some(200),
            cost_usd: 0.42,
            input_tokens: 100,
            output_tokens: 50,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sync_writer_persists_immediately() {
        let pool = build_pool("file::memory:?cache=shared").unwrap();
        let writer = SyncWriter::new(pool.clone());
        writer.enqueue(sample_record()).await.unwrap();

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM message_requests", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn async_writer_flushes_on_batch_threshold() {
        let pool = build_pool("file::memory:?cache=shared").unwrap();
        let writer = AsyncWriter::spawn(pool.clone(), 2, 60_000, 100);

        writer.enqueue(sample_record()).await.unwrap();
        writer.enqueue(sample_record()).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM message_requests", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn async_writer_flushes_on_interval() {
        let pool = build_pool("file::memory:?cache=shared").unwrap();
        let writer = AsyncWriter::spawn(pool.clone(), 100, 20, 100);

        writer.enqueue(sample_record()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(80)).await;

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM message_requests", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
