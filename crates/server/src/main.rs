//! Quadsum Server
//!
//! Authenticates a client against a `user:password` file with a salted
//! SHA-224 challenge, then answers each streamed vector with the sum of
//! squares of its elements.

mod batch;
mod config;
mod credentials;
mod handshake;
mod journal;
mod ratelimit;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use quadsum_core::protocol::{DEFAULT_MAX_VECTORS, DEFAULT_MAX_VECTOR_LEN};
use quadsum_core::{CoreError, VectorLimits};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ServerConfig;
use crate::server::ComputeServer;

/// Quadsum Server - authenticated sum-of-squares over TCP
#[derive(Parser, Debug)]
#[command(name = "quadsum-server")]
#[command(author = "Quadsum Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Authenticated sum-of-squares server", long_about = None)]
#[command(arg_required_else_help = true)]
struct Args {
    /// Credential file with `user:password` lines
    #[arg(short, long)]
    base: PathBuf,

    /// Journal file name
    #[arg(short, long)]
    journal: PathBuf,

    /// Error log file
    #[arg(short, long, default_value = "journal.txt")]
    log: PathBuf,

    /// Listening port (0 lets the OS choose)
    #[arg(short, long, allow_negative_numbers = true)]
    port: i32,

    /// IPv4 bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    address: String,

    /// Deadline in seconds for every receive/send (0 disables)
    #[arg(long, default_value_t = 30)]
    io_timeout_secs: u64,

    /// Largest accepted vector count per batch
    #[arg(long, default_value_t = DEFAULT_MAX_VECTORS)]
    max_vectors: u32,

    /// Largest accepted vector length
    #[arg(long, default_value_t = DEFAULT_MAX_VECTOR_LEN)]
    max_vector_len: u32,

    /// Keep accepting connections instead of serving exactly one
    #[arg(long, default_value = "false")]
    keep_serving: bool,

    /// Send a random salt per session instead of the fixed one
    #[arg(long, default_value = "false")]
    fresh_salt: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, CoreError> {
        Ok(ServerConfig {
            bind_address: config::parse_address(&self.address)?,
            port: config::parse_port(self.port)?,
            io_timeout: config::io_timeout(self.io_timeout_secs),
            limits: VectorLimits {
                max_vectors: self.max_vectors,
                max_vector_len: self.max_vector_len,
            },
            credentials_path: self.base,
            journal_path: self.journal,
            log_path: self.log,
            keep_serving: self.keep_serving,
            fresh_salt: self.fresh_salt,
        })
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return Ok(ExitCode::from(usage_exit_code(e.kind())));
        }
    };

    setup_logging(&args.log_level)?;

    let config = args.into_config().context("Invalid configuration")?;
    info!("Starting Quadsum Server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Credentials: {}, journal: {}, error log: {}",
        config.credentials_path.display(),
        config.journal_path.display(),
        config.log_path.display()
    );

    let keep_serving = config.keep_serving;
    let server = ComputeServer::bind(config).await?;
    println!("Listening on {}", server.local_addr());

    if keep_serving {
        server.run(shutdown_signal()).await?;
        info!("Shutdown complete");
        return Ok(ExitCode::SUCCESS);
    }

    let outcome = server.serve_once().await?;
    info!("Session finished: {:?}", outcome);
    Ok(ExitCode::from(outcome.exit_code()))
}

/// Exit status when argument parsing stops the process
///
/// Only `--version` succeeds; help and usage errors end with status 1.
fn usage_exit_code(kind: clap::error::ErrorKind) -> u8 {
    match kind {
        clap::error::ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

/// Setup logging with tracing
fn setup_logging(level: &str) -> Result<()> {
    let log_level = level.parse::<Level>().unwrap_or(Level::INFO);

    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
                return;
            }
            Err(e) => warn!("Failed to setup SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down...");
}
