//! portal-sync service entrypoint.
//!
//! Startup order matters here:
//!
//! 1. Logging, then the environment file, then option parsing, since
//!    env-backed options must see the injected values.
//! 2. The liveness listener binds next; an unavailable port is the one fatal
//!    startup condition.
//! 3. The destination connector retries until reachable, and only then does
//!    the scheduler start its connection-gated cycle loop.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use portal_sync::mongodb::MongoSource;
use portal_sync::mysql::MysqlSink;
use portal_sync::sync::{RetryPolicy, Scheduler, SyncStatus};
use portal_sync::{config, server, MysqlOpts, ServerOpts, SourceOpts, SyncOpts};

#[derive(Parser)]
#[command(name = "portal-sync")]
#[command(about = "Replicates patient question documents from MongoDB to MySQL")]
#[command(long_about = None)]
struct Cli {
    #[command(flatten)]
    source: SourceOpts,

    #[command(flatten)]
    mysql: MysqlOpts,

    #[command(flatten)]
    sync: SyncOpts,

    #[command(flatten)]
    server: ServerOpts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Seed the environment before clap reads it. The file path itself can
    // only come from the environment for that reason.
    let env_file = std::env::var("ENV_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".env"));
    config::env_file::load(Path::new(&env_file));

    let cli = Cli::parse();
    let status = Arc::new(SyncStatus::default());

    // Liveness listener comes up before any store is reachable, so probes
    // can see the process while it is still connecting.
    let listener = tokio::net::TcpListener::bind((cli.server.http_bind.as_str(), cli.server.http_port))
        .await
        .with_context(|| {
            format!(
                "failed to bind liveness listener on {}:{}",
                cli.server.http_bind, cli.server.http_port
            )
        })?;
    info!(addr = %listener.local_addr()?, "liveness listener bound");

    let app = server::router(Arc::clone(&status));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "liveness listener terminated");
        }
    });

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested, letting in-flight writes drain");
                cancel.cancel();
            }
        });
    }

    let sink = Arc::new(
        MysqlSink::connect(
            &cli.mysql,
            &RetryPolicy::default(),
            Arc::clone(&status),
            &cancel,
        )
        .await?,
    );
    sink.ensure_table().await?;

    let source = Arc::new(MongoSource::connect(&cli.source).await?);

    let scheduler = Scheduler::new(
        source,
        Arc::clone(&sink),
        cli.sync.clone(),
        Arc::clone(&status),
    );
    scheduler.run(cancel).await;

    if let Err(e) = sink.close().await {
        error!(error = %e, "destination pool shutdown failed");
    }
    Ok(())
}
