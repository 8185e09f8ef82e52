//! DriveGate CLI - Serve a Google Drive account over plain HTTP paths.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use drivegate_drive::memory::{MemoryStore, MEMORY_ROOT_ID};
use drivegate_gateway::{build_router, DriveGateway, GatewayConfig};

#[derive(Parser)]
#[command(name = "drivegate")]
#[command(about = "DriveGate - Path-addressed HTTP gateway for Google Drive")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway.
    Serve {
        /// Configuration file (JSON).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to listen on.
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Serve an empty in-memory store instead of Google Drive.
        #[arg(long)]
        in_memory: bool,
    },

    /// Validate a configuration and print it without secrets.
    CheckConfig {
        /// Configuration file (JSON).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve {
            config,
            bind,
            in_memory,
        } => cmd_serve(config.as_deref(), bind, in_memory).await,

        Commands::CheckConfig { config } => cmd_check_config(config.as_deref()),
    }
}

/// Load the configuration file, or build one from the environment alone.
fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => {
            let mut config = GatewayConfig::default();
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
                .validate()
                .context("No configuration file given and the environment is incomplete")?;
            Ok(config)
        }
    }
}

async fn cmd_serve(config_path: Option<&Path>, bind: SocketAddr, in_memory: bool) -> Result<()> {
    let (gateway, public_url) = if in_memory {
        info!("Serving an in-memory store");
        let gateway = DriveGateway::with_store(Arc::new(MemoryStore::new()), MEMORY_ROOT_ID, 4);
        (gateway, None)
    } else {
        let config = load_config(config_path)?;
        let gateway = DriveGateway::from_config(&config).context("Failed to set up Drive access")?;
        (gateway, config.public_url)
    };

    let router = build_router(Arc::new(gateway), public_url);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

fn cmd_check_config(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    println!("Configuration is valid.");
    println!("  Client ID:   {}", config.client_id);
    println!("  Root folder: {}", config.root_id);
    println!("  Token URL:   {}", config.token_url);
    println!("  API base:    {}", config.api_base);
    println!("  Upload base: {}", config.upload_base);
    println!("  Token margin: {}s", config.token_margin_secs);
    println!("  Timeout:     {}s", config.request_timeout_secs);
    println!("  Listing concurrency: {}", config.listing_concurrency);
    match &config.public_url {
        Some(url) => println!("  Public URL:  {}", url),
        None => println!("  Public URL:  (from Host header)"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["drivegate", "serve", "--in-memory"]).unwrap();
        match cli.command {
            Commands::Serve {
                config,
                bind,
                in_memory,
            } => {
                assert!(config.is_none());
                assert_eq!(bind, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
                assert!(in_memory);
            }
            Commands::CheckConfig { .. } => panic!("expected serve"),
        }
    }
}
