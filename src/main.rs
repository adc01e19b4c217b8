// src/main.rs

use anyhow::{Context, Result};
use arcade::server::{ArcadeConfig, run_server};
use arcade::{BundleStore, MemoryStore, R2Store, Reconciler, RemoteStore};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "arcade")]
#[command(author, version, about = "Game bundle host with an R2-backed local mirror", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "arcade.toml")]
        config: PathBuf,
    },
    /// Pull every complete remote bundle into the local store, then exit
    Reconcile {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "arcade.toml")]
        config: PathBuf,
    },
}

/// Remote store for the configured target
///
/// Offline configurations without any target get an empty in-memory store,
/// so the server runs for local development without credentials.
fn build_remote(config: &ArcadeConfig) -> Result<Arc<dyn RemoteStore>> {
    if !config.has_remote_target() {
        warn!("No remote target configured, using an in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = R2Store::new(&config.remote_config()).context("Failed to configure remote store")?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { config }) => {
            let config = ArcadeConfig::resolve(Some(config.as_path()))?;
            let remote = build_remote(&config)?;
            run_server(config.to_server_config()?, remote).await
        }
        Some(Commands::Reconcile { config }) => {
            let config = ArcadeConfig::resolve(Some(config.as_path()))?;
            if !config.has_remote_target() {
                anyhow::bail!("reconcile needs remote.account_id or remote.endpoint");
            }
            let remote = build_remote(&config)?;

            // An explicit reconcile runs even when the server would skip it
            let mut server_config = config.to_server_config()?;
            server_config.sync.offline = false;

            let store = BundleStore::open(&server_config.storage_root).with_context(|| {
                format!("Failed to open bundle store at {:?}", server_config.storage_root)
            })?;
            let reconciler = Reconciler::new(store, remote, server_config.sync);

            info!("Reconciling {:?}", server_config.storage_root);
            let report = reconciler.reconcile_all().await?;

            println!("Reconciliation complete:");
            println!("  Bundles seen:     {}", report.bundles_seen);
            println!("  Synced:           {}", report.synced);
            println!("  Skipped:          {}", report.skipped);
            println!("  Failed:           {}", report.failed);
            println!("  Files downloaded: {}", report.files_downloaded);
            println!("  Files present:    {}", report.files_present);
            println!("  Files failed:     {}", report.files_failed);
            Ok(())
        }
        None => {
            // No command provided, show help
            println!("Arcade v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'arcade --help' for usage information");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_with_config() {
        let cli = Cli::try_parse_from(["arcade", "serve", "--config", "/etc/arcade.toml"]).unwrap();
        match cli.command {
            Some(Commands::Serve { config }) => assert_eq!(config, PathBuf::from("/etc/arcade.toml")),
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_offline_without_target_uses_memory_store() {
        let mut config = ArcadeConfig::default();
        config.sync.offline = true;
        let remote = build_remote(&config).unwrap();
        assert_eq!(remote.name(), "memory");
    }
}
