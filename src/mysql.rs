//! MySQL destination: pool construction and the upsert sink.

pub mod client;
pub mod sink;

pub use sink::MysqlSink;
