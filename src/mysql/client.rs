//! MySQL client utilities
//!
//! This module provides utilities for creating and managing MySQL connection
//! pools.

use mysql_async::{OptsBuilder, Pool};

use crate::MysqlOpts;

/// Create a new MySQL connection pool from destination options
pub fn new_mysql_pool(opts: &MysqlOpts) -> Pool {
    let builder = OptsBuilder::default()
        .ip_or_hostname(opts.db_host.clone())
        .tcp_port(opts.db_port)
        .user(Some(opts.db_user.clone()))
        .pass(Some(opts.db_password.clone()))
        .db_name(Some(opts.db_name.clone()));
    Pool::new(builder)
}
