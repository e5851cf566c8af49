//! Translator web service binary.
//!
//! Run with: `translator-ws --config config.yaml`

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use translator_ws::{server, TranslatorEndpoint, TranslatorServiceConfig};

/// SOAP translator web service secured with WS-Security.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Address to listen on, overrides `server.listen_address`
    #[arg(short, long, env = "TRANSLATOR_LISTEN_ADDRESS")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting translator web service v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    let mut config: TranslatorServiceConfig = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        serde_yaml::from_str(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        TranslatorServiceConfig::default()
    };
    if let Some(listen) = args.listen {
        config.server.listen_address = listen;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        endpoint_path = %config.server.endpoint_path,
        validation_actions = ?config.ws_security.validation_actions,
        time_to_live_secs = config.ws_security.time_to_live_secs,
        users = config.ws_security.users.len(),
        "Configuration loaded"
    );

    let listener = tokio::net::TcpListener::bind(&config.server.listen_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen_address))?;
    let endpoint = Arc::new(TranslatorEndpoint::new(config));

    server::serve(listener, endpoint, shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Translator web service stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server");
}
