//! Upsert sink over the destination table.
//!
//! The sink is the single owner of the destination connection pool; no other
//! component issues queries against MySQL. It drives the shared
//! [`ConnectionState`] machine from its connect attempts and query failures.

use anyhow::Context;
use chrono::{DateTime, Datelike, Timelike, Utc};
use mysql_async::{prelude::*, Pool, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::WriteError;
use crate::record::QueryRow;
use crate::sync::{ConnectionState, RetryPolicy, RowWriter, SyncStatus};
use crate::MysqlOpts;

pub struct MysqlSink {
    pool: Pool,
    table: String,
    status: Arc<SyncStatus>,
}

impl MysqlSink {
    /// Build the pool and verify reachability with a ping, retrying per the
    /// policy. An exhausted bounded policy propagates the last error; the
    /// caller decides whether that is fatal.
    pub async fn connect(
        opts: &MysqlOpts,
        retry: &RetryPolicy,
        status: Arc<SyncStatus>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Self> {
        let pool = super::client::new_mysql_pool(opts);
        let sink = Self {
            pool,
            table: opts.db_table.clone(),
            status,
        };

        let mut attempt = 0u32;
        loop {
            sink.status.set_connection(ConnectionState::Connecting).await;
            match sink.ping().await {
                Ok(()) => {
                    sink.status.set_connection(ConnectionState::Connected).await;
                    info!(
                        host = %opts.db_host,
                        database = %opts.db_name,
                        "connected to MySQL"
                    );
                    return Ok(sink);
                }
                Err(e) => {
                    sink.status.set_connection(ConnectionState::Error).await;
                    attempt += 1;
                    let Some(delay) = retry.delay_for(attempt) else {
                        return Err(e).with_context(|| {
                            format!("destination unreachable after {attempt} attempts")
                        });
                    };
                    warn!(
                        error = %e,
                        attempt,
                        retry_in = ?delay,
                        "MySQL connect failed"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            anyhow::bail!("shutdown requested during destination connect")
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Idempotent destination bootstrap: the table contract the writer
    /// depends on, keyed by `conversation_id`.
    pub async fn ensure_table(&self) -> anyhow::Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                conversation_id VARCHAR(255) NOT NULL PRIMARY KEY,
                patient_id VARCHAR(255) NOT NULL,
                question TEXT NOT NULL,
                image_url TEXT,
                created_at DATETIME(6),
                INDEX idx_patient (patient_id)
            )",
            self.table
        );
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(ddl).await?;
        debug!(table = %self.table, "destination table ensured");
        Ok(())
    }

    /// Signal pool shutdown, letting checked-out connections drain.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.pool.clone().disconnect().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), mysql_async::Error> {
        let mut conn = self.pool.get_conn().await?;
        conn.ping().await
    }

    async fn try_upsert(&self, row: &QueryRow) -> Result<(), WriteError> {
        let stmt = format!(
            "INSERT INTO {} (conversation_id, patient_id, question, image_url, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                 question = VALUES(question),
                 image_url = VALUES(image_url),
                 created_at = VALUES(created_at)",
            self.table
        );
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(
            stmt,
            (
                row.conversation_id.clone(),
                row.patient_id.clone(),
                row.question.clone(),
                row.image_url.clone(),
                datetime_value(row.created_at),
            ),
        )
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RowWriter for MysqlSink {
    /// Insert-or-update keyed by `conversation_id`: unseen keys insert, seen
    /// keys refresh the mutable fields in place. Repeating the same input is
    /// a no-op row-count-wise.
    async fn upsert(&self, row: &QueryRow) -> Result<(), WriteError> {
        let result = self.try_upsert(row).await;
        if result.is_err() {
            self.status.set_connection(ConnectionState::Error).await;
        }
        result
    }

    async fn is_connected(&self) -> bool {
        if self.status.connection().await != ConnectionState::Connected {
            self.status.set_connection(ConnectionState::Connecting).await;
        }
        match self.ping().await {
            Ok(()) => {
                self.status.set_connection(ConnectionState::Connected).await;
                true
            }
            Err(e) => {
                debug!(error = %e, "destination ping failed");
                self.status.set_connection(ConnectionState::Error).await;
                false
            }
        }
    }
}

/// NULL for the unknown-time sentinel; MySQL keeps microsecond precision.
fn datetime_value(ts: Option<DateTime<Utc>>) -> Value {
    match ts {
        Some(dt) => Value::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.timestamp_subsec_micros(),
        ),
        None => Value::NULL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn datetime_value_preserves_components() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 15).unwrap();
        match datetime_value(Some(dt)) {
            Value::Date(year, month, day, hour, minute, second, micros) => {
                assert_eq!(
                    (year, month, day, hour, minute, second, micros),
                    (2024, 3, 1, 10, 30, 15, 0)
                );
            }
            other => panic!("expected Value::Date, got {other:?}"),
        }
    }

    #[test]
    fn unknown_time_sentinel_is_null() {
        assert_eq!(datetime_value(None), Value::NULL);
    }
}
