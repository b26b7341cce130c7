//! stashkv server
//!
//! Opens the snapshot file, starts the sweeper and flusher, and serves
//! clients until Ctrl+C. On shutdown the index is flushed one last time.

use anyhow::Context;
use clap::Parser;
use stashkv::commands::CommandHandler;
use stashkv::connection::{handle_connection, ConnectionStats};
use stashkv::service::KvService;
use stashkv::storage::{BackgroundTasks, StorageEngine};
use stashkv::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// stashkv server
#[derive(Parser, Debug)]
#[command(name = "stashkv")]
#[command(about = "Durable single-node key-value store")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = stashkv::DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = stashkv::DEFAULT_PORT)]
    port: u16,

    /// Snapshot file holding the persisted entries
    #[arg(short, long, default_value = "data.json")]
    data_file: PathBuf,

    /// Seconds between periodic flushes
    #[arg(long, default_value_t = 60)]
    flush_interval_secs: u64,

    /// Seconds between expiration sweeps
    #[arg(long, default_value_t = 10)]
    sweep_interval_secs: u64,

    /// Lifetime in seconds of entries added without a TTL
    #[arg(long, default_value_t = 86_400)]
    default_ttl_secs: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> Config {
        Config::builder()
            .host(&self.host)
            .port(self.port)
            .data_file(&self.data_file)
            .flush_interval(Duration::from_secs(self.flush_interval_secs))
            .sweep_interval(Duration::from_secs(self.sweep_interval_secs))
            .default_ttl(Duration::from_secs(self.default_ttl_secs))
            .build()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid --log-level filter")?;
    fmt().with_env_filter(filter).with_target(false).init();

    let config = args.config();
    info!(
        version = stashkv::VERSION,
        data_file = %config.data_file.display(),
        flush_interval = ?config.flush_interval,
        sweep_interval = ?config.sweep_interval,
        "Starting stashkv"
    );

    let engine = StorageEngine::open(&config.data_file)
        .with_context(|| format!("failed to open {}", config.data_file.display()))?;
    let engine = Arc::new(engine);

    let tasks = BackgroundTasks::start(&engine, config.expiry(), config.flush());

    let stats = Arc::new(ConnectionStats::new());
    let handler = CommandHandler::new(
        KvService::new(Arc::clone(&engine), config.default_ttl),
        Arc::clone(&stats),
    );

    let listener = match TcpListener::bind(config.bind_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            // nothing was served, but restored entries still get written back
            let _ = tasks.shutdown().await;
            return Err(e).with_context(|| format!("failed to bind {}", config.bind_address()));
        }
    };
    info!(address = %config.bind_address(), "Listening");

    tokio::select! {
        _ = accept_loop(listener, handler, stats) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Shutdown signal received");
        }
    }

    // the listener was dropped with the accept loop; no new connections
    tasks
        .shutdown()
        .await
        .context("final flush failed, recent changes may be lost")?;

    info!("Shutdown complete");
    Ok(())
}

async fn accept_loop(listener: TcpListener, handler: CommandHandler, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(
                    stream,
                    peer,
                    handler.clone(),
                    Arc::clone(&stats),
                ));
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
            }
        }
    }
}
