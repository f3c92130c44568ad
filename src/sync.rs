//! Sync scheduler for portal-sync.
//!
//! Drives the fetch -> map -> write cycle on a fixed interval. The design
//! constraints, in order of importance:
//!
//! 1. Cycles never overlap. The next tick is not awaited until every row
//!    outcome of the current cycle is accounted for, so two cycles can never
//!    contend on the same `conversation_id`.
//! 2. The first cycle is connection-gated: until the destination reports
//!    connected, the scheduler re-checks after a fixed delay instead of
//!    starting work.
//! 3. No error born inside a cycle escapes it. Fetch failures abandon the
//!    cycle; row failures are logged and counted, and their siblings proceed.
//!
//! The scheduler talks to the stores through the [`SourceReader`] and
//! [`RowWriter`] seams so its behavior is testable against in-memory fakes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FetchError, WriteError};
use crate::record::{QueryRow, SourceRecord};
use crate::SyncOpts;

/// Destination reachability, driven by connect attempts and query failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Process-wide view of destination reachability and the most recent cycle,
/// shared between the connector, the scheduler, and the liveness endpoint.
#[derive(Debug, Default)]
pub struct SyncStatus {
    connection: RwLock<ConnectionState>,
    last_cycle: RwLock<Option<CycleReport>>,
}

impl SyncStatus {
    pub async fn connection(&self) -> ConnectionState {
        *self.connection.read().await
    }

    pub async fn set_connection(&self, state: ConnectionState) {
        let mut current = self.connection.write().await;
        if *current != state {
            debug!(from = ?*current, to = ?state, "connection state transition");
            *current = state;
        }
    }

    pub async fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle.read().await.clone()
    }

    pub async fn record_cycle(&self, report: CycleReport) {
        *self.last_cycle.write().await = Some(report);
    }
}

/// Outcome of one fetch -> map -> write pass.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Records decoded from the source this cycle.
    pub fetched: usize,
    /// Source documents skipped because they could not be decoded.
    pub skipped: usize,
    /// Rows upserted successfully.
    pub written: usize,
    /// Rows whose write failed or timed out.
    pub failed: usize,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl CycleReport {
    /// Report for a cycle abandoned at the fetch step. No partial writes.
    fn fetch_failed(started: Instant) -> Self {
        Self {
            fetched: 0,
            skipped: 0,
            written: 0,
            failed: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        }
    }
}

/// One point-in-time scan of the source working set.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub records: Vec<SourceRecord>,
    /// Documents dropped during decoding (the malformed-single-record policy).
    pub skipped: usize,
}

/// Seam over the source store: one full scan of the pending collection.
#[async_trait::async_trait]
pub trait SourceReader: Send + Sync {
    async fn fetch_all(&self) -> Result<FetchBatch, FetchError>;
}

/// Seam over the destination store: idempotent per-row writes plus the
/// reachability predicate the scheduler gates on.
#[async_trait::async_trait]
pub trait RowWriter: Send + Sync {
    async fn upsert(&self, row: &QueryRow) -> Result<(), WriteError>;
    async fn is_connected(&self) -> bool;
}

/// Bounded or unbounded reconnect policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Give up after this many attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }

    /// Delay to sleep after the given failed attempt (1-based), or `None`
    /// once the policy is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        Some(self.initial_delay.mul_f64(factor).min(self.max_delay))
    }
}

/// Timer-driven scheduler: a sequence of non-overlapping cycles, not a pool
/// of concurrent workers.
pub struct Scheduler<R, W> {
    reader: Arc<R>,
    writer: Arc<W>,
    opts: SyncOpts,
    status: Arc<SyncStatus>,
}

impl<R, W> Scheduler<R, W>
where
    R: SourceReader + 'static,
    W: RowWriter + 'static,
{
    pub fn new(reader: Arc<R>, writer: Arc<W>, opts: SyncOpts, status: Arc<SyncStatus>) -> Self {
        Self {
            reader,
            writer,
            opts,
            status,
        }
    }

    /// Drive cycles until cancelled. Waits for the destination connection
    /// gate before the first cycle, then ticks on a fixed interval.
    pub async fn run(&self, cancel: CancellationToken) {
        if !self.await_connected(&cancel).await {
            info!("sync scheduler cancelled before first cycle");
            return;
        }

        let mut ticker = tokio::time::interval(self.opts.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !self.writer.is_connected().await {
                warn!("destination not reachable, skipping cycle");
                continue;
            }

            let report = self.run_cycle(&cancel).await;
            info!(
                fetched = report.fetched,
                skipped = report.skipped,
                written = report.written,
                failed = report.failed,
                duration_ms = report.duration_ms,
                "sync cycle completed"
            );
            self.status.record_cycle(report).await;
        }

        info!("sync scheduler stopped");
    }

    /// Connection gate: re-check on a fixed delay rather than blocking on a
    /// connect call. Returns false when cancelled while waiting.
    async fn await_connected(&self, cancel: &CancellationToken) -> bool {
        loop {
            if self.writer.is_connected().await {
                return true;
            }
            debug!(
                delay = ?self.opts.gate_delay,
                "destination not yet connected, deferring first cycle"
            );
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.opts.gate_delay) => {}
            }
        }
    }

    /// One full fetch -> map -> write pass over the source's current record
    /// set. Row writes are dispatched as independent futures with bounded
    /// concurrency and joined before the cycle is considered complete; once
    /// `cancel` is raised no new writes are issued and in-flight ones drain.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        use futures::StreamExt;

        let started = Instant::now();

        let fetch = tokio::time::timeout(self.opts.fetch_timeout, self.reader.fetch_all());
        let batch = match fetch.await {
            Ok(Ok(batch)) => batch,
            Ok(Err(e)) => {
                warn!(error = %e, "fetch failed, cycle abandoned");
                return CycleReport::fetch_failed(started);
            }
            Err(_) => {
                let e = FetchError::Timeout(self.opts.fetch_timeout);
                warn!(error = %e, "fetch failed, cycle abandoned");
                return CycleReport::fetch_failed(started);
            }
        };

        let skipped = batch.skipped;
        let rows: Vec<QueryRow> = batch.records.into_iter().map(SourceRecord::map).collect();
        let fetched = rows.len();

        let outcomes: Vec<bool> = futures::stream::iter(rows)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|row| self.write_row(row))
            .buffer_unordered(self.opts.write_concurrency.max(1))
            .collect()
            .await;

        let written = outcomes.iter().filter(|ok| **ok).count();
        CycleReport {
            fetched,
            skipped,
            written,
            failed: outcomes.len() - written,
            duration_ms: started.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        }
    }

    async fn write_row(&self, row: QueryRow) -> bool {
        let result = tokio::time::timeout(self.opts.write_timeout, self.writer.upsert(&row)).await;
        let error = match result {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => e,
            Err(_) => WriteError::Timeout(self.opts.write_timeout),
        };
        warn!(
            conversation_id = %row.conversation_id,
            error = %error,
            "row upsert failed"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_backs_off_exponentially_with_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(4)));
        // Capped at max_delay no matter how many failures accumulate
        assert_eq!(policy.delay_for(20), Some(Duration::from_secs(30)));
    }

    #[test]
    fn bounded_retry_policy_exhausts() {
        let policy = RetryPolicy::bounded(3);
        assert!(policy.delay_for(1).is_some());
        assert!(policy.delay_for(2).is_some());
        assert_eq!(policy.delay_for(3), None);
    }

    #[tokio::test]
    async fn status_starts_disconnected_with_no_cycle() {
        let status = SyncStatus::default();
        assert_eq!(status.connection().await, ConnectionState::Disconnected);
        assert!(status.last_cycle().await.is_none());
    }
}
