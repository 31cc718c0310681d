//! Cinder server binary.
//!
//! # Usage
//!
//! ```bash
//! # In-memory notes, self-signed certificate (development)
//! cinder-server --bind 127.0.0.1:4433
//!
//! # Durable notes, real certificate
//! cinder-server --bind 0.0.0.0:4433 --cert cert.pem --key key.pem --db notes.redb
//! ```

use std::{path::PathBuf, time::Duration};

use cinder_server::{DriverConfig, Server, ServerRuntimeConfig, StorageBackend};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Burn-after-read note server
#[derive(Parser, Debug)]
#[command(name = "cinder-server")]
#[command(about = "Burn-after-read encrypted note server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long, requires = "key")]
    cert: Option<PathBuf>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long, requires = "cert")]
    key: Option<PathBuf>,

    /// Persist notes in this redb file instead of memory
    #[arg(long)]
    db: Option<PathBuf>,

    /// Largest accepted note, in bytes
    #[arg(long, default_value = "65536")]
    max_note_bytes: usize,

    /// Seconds between expiry sweeps
    #[arg(long, default_value = "60")]
    sweep_interval_secs: u64,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let storage = match args.db {
        Some(path) => {
            tracing::info!("Storing notes in {}", path.display());
            StorageBackend::Redb { path }
        },
        None => {
            tracing::warn!("No --db given - notes are lost on restart");
            StorageBackend::Memory
        },
    };

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        storage,
        driver: DriverConfig {
            max_connections: args.max_connections,
            max_note_bytes: args.max_note_bytes,
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
        },
        ..Default::default()
    };

    let server = Server::bind(config)?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
