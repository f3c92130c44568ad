//! Error taxonomy for the sync pipeline.
//!
//! Every error here is scoped to a unit of work smaller than the process: a
//! single record ([`MapError`]), a single cycle ([`FetchError`]), or a single
//! row write ([`WriteError`]). None of them propagate past the scheduler.

use mongodb::bson::Bson;
use std::time::Duration;
use thiserror::Error;

/// A source document that cannot be decoded into a
/// [`SourceRecord`](crate::record::SourceRecord).
///
/// The offending document is skipped; the rest of the cycle continues.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("document is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` has unexpected type: {value}")]
    InvalidField { field: &'static str, value: Bson },
}

/// A failure reading the source working set. Aborts the current cycle only;
/// the scheduler returns to idle and retries on the next tick.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source query failed: {0}")]
    Query(#[from] mongodb::error::Error),
    #[error("source fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A failure writing one row to the destination. Logged and counted; never
/// aborts sibling rows in the same cycle.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("destination query failed: {0}")]
    Query(#[from] mysql_async::Error),
    #[error("row write timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
