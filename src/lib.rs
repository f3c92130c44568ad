//! portal-sync library
//!
//! A service that replicates patient question documents from a MongoDB
//! collection into a MySQL table.
//!
//! # Design
//!
//! - One-directional: MongoDB is the read-only source, MySQL the destination
//! - Periodic: a fixed-interval scheduler drives fetch -> map -> write cycles
//! - Idempotent: rows are upserted keyed by `conversation_id`, so re-running
//!   a cycle over unchanged source data never creates duplicates
//!
//! The scheduler only starts once the destination reports connected, and a
//! small HTTP listener is bound for liveness probing independent of the sync
//! data path.
//!
//! # Usage
//!
//! ```bash
//! # All options fall back to the environment, which is seeded from an
//! # optional KEY=VALUE file (ENV_FILE, default ./.env)
//! portal-sync \
//!   --mongo-uri mongodb://localhost:27017 \
//!   --mongo-database portal \
//!   --db-host localhost --db-user portal --db-name portal
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub mod config;
pub mod error;
pub mod mongodb;
pub mod mysql;
pub mod record;
pub mod server;
pub mod sync;

pub use error::{FetchError, MapError, WriteError};
pub use record::{QueryRow, SourceRecord};
pub use sync::{
    ConnectionState, CycleReport, FetchBatch, RetryPolicy, RowWriter, Scheduler, SourceReader,
    SyncStatus,
};

#[derive(Parser, Clone, Debug)]
pub struct SourceOpts {
    /// MongoDB connection URI
    #[arg(long, default_value = "mongodb://localhost:27017", env = "MONGO_URI")]
    pub mongo_uri: String,

    /// Source database name
    #[arg(long, default_value = "portal", env = "MONGO_DATABASE")]
    pub mongo_database: String,

    /// Source collection holding pending patient questions
    #[arg(long, default_value = "queries", env = "MONGO_COLLECTION")]
    pub mongo_collection: String,

    /// Path to a JSON credentials document granting read access to the source
    #[arg(
        long,
        default_value = "./source-credentials.json",
        env = "MONGO_CREDENTIALS_FILE"
    )]
    pub credentials_file: PathBuf,
}

#[derive(Parser, Clone, Debug)]
pub struct MysqlOpts {
    /// MySQL host
    #[arg(long, default_value = "localhost", env = "DB_HOST")]
    pub db_host: String,

    /// MySQL port
    #[arg(long, default_value = "3306", env = "DB_PORT")]
    pub db_port: u16,

    /// MySQL user
    #[arg(long, default_value = "root", env = "DB_USER")]
    pub db_user: String,

    /// MySQL password
    #[arg(long, default_value = "", env = "DB_PASSWORD")]
    pub db_password: String,

    /// MySQL database name
    #[arg(long, default_value = "portal", env = "DB_NAME")]
    pub db_name: String,

    /// Destination table receiving replicated questions
    #[arg(long, default_value = "queries", env = "DB_TABLE")]
    pub db_table: String,
}

#[derive(Parser, Clone, Debug)]
pub struct SyncOpts {
    /// Interval between sync cycles
    #[arg(long, default_value = "5s", env = "SYNC_INTERVAL", value_parser = crate::config::parse_duration)]
    pub interval: Duration,

    /// Delay between connection-gate checks before the first cycle
    #[arg(long, default_value = "5s", env = "SYNC_GATE_DELAY", value_parser = crate::config::parse_duration)]
    pub gate_delay: Duration,

    /// Timeout for one full-scan fetch of the source collection
    #[arg(long, default_value = "30s", env = "SYNC_FETCH_TIMEOUT", value_parser = crate::config::parse_duration)]
    pub fetch_timeout: Duration,

    /// Timeout for a single row write
    #[arg(long, default_value = "10s", env = "SYNC_WRITE_TIMEOUT", value_parser = crate::config::parse_duration)]
    pub write_timeout: Duration,

    /// Maximum concurrent row writes within one cycle
    #[arg(long, default_value = "8", env = "SYNC_WRITE_CONCURRENCY")]
    pub write_concurrency: usize,
}

#[derive(Parser, Clone, Debug)]
pub struct ServerOpts {
    /// Bind address for the liveness listener
    #[arg(long, default_value = "0.0.0.0", env = "HTTP_BIND")]
    pub http_bind: String,

    /// Port for the liveness listener
    #[arg(long, default_value = "3000", env = "HTTP_PORT")]
    pub http_port: u16,
}
