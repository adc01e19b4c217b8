// src/server/mod.rs
//! Arcade HTTP server
//!
//! This module provides an HTTP server that:
//! - Accepts zipped game uploads and unpacks them into the bundle store
//! - Serves bundle files, hydrating missing bundles from the remote mirror
//! - Mirrors new bundles to the remote store in the background
//! - Stores and serves standalone media files straight from the remote store
//!
//! Background work (startup reconciliation, hydration, uploads) is
//! fire-and-forget: failures are logged and counted in [`ServerMetrics`],
//! never reported to the request that triggered them.

pub mod config;
mod handlers;
pub mod metrics;
mod routes;

pub use config::ArcadeConfig;
pub use handlers::games::NOT_YET_AVAILABLE;
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use routes::create_router;

use crate::bundle::BundleId;
use crate::filesystem::BundleStore;
use crate::remote::RemoteStore;
use crate::sync::{Hydrator, Reconciler, SyncConfig, upload_bundle};
use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Bundle store root
    pub storage_root: PathBuf,
    /// Base URL for misc-file links, without trailing slash (empty = relative)
    pub public_url: String,
    /// CORS allowed origins (empty = any)
    pub cors_allowed_origins: Vec<String>,
    /// Largest accepted game archive in bytes
    pub max_game_upload: usize,
    /// Largest accepted misc file in bytes
    pub max_misc_upload: usize,
    /// Reconciliation and hydration settings
    pub sync: SyncConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 3001)),
            storage_root: PathBuf::from("./games"),
            public_url: String::new(),
            cors_allowed_origins: Vec::new(),
            max_game_upload: 100 * 1024 * 1024,
            max_misc_upload: 50 * 1024 * 1024,
            sync: SyncConfig::default(),
        }
    }
}

/// Shared server state
///
/// Read-only after construction; everything mutable lives on disk, in the
/// remote store, or behind the hydrator's in-flight map.
pub struct ServerState {
    pub config: ServerConfig,
    pub store: BundleStore,
    pub remote: Arc<dyn RemoteStore>,
    pub hydrator: Hydrator,
    pub reconciler: Reconciler,
    /// Metrics collector
    pub metrics: Arc<ServerMetrics>,
}

impl ServerState {
    pub fn new(config: ServerConfig, remote: Arc<dyn RemoteStore>) -> crate::Result<Self> {
        let store = BundleStore::open(&config.storage_root)?;
        let hydrator = Hydrator::new(store.clone(), Arc::clone(&remote), config.sync.clone());
        let reconciler = Reconciler::new(store.clone(), Arc::clone(&remote), config.sync.clone());

        Ok(Self {
            config,
            store,
            remote,
            hydrator,
            reconciler,
            metrics: Arc::new(ServerMetrics::new()),
        })
    }
}

/// Start the arcade server
pub async fn run_server(config: ServerConfig, remote: Arc<dyn RemoteStore>) -> Result<()> {
    tracing::info!("Starting arcade server on {}", config.bind_addr);
    tracing::info!("Bundle store: {:?}", config.storage_root);
    tracing::info!("Remote store: {}", remote.name());

    let state = Arc::new(
        ServerState::new(config.clone(), remote)
            .with_context(|| format!("Failed to open bundle store at {:?}", config.storage_root))?,
    );

    let cleared = state.store.clear_staging()?;
    if cleared > 0 {
        tracing::info!("Removed {} stale staging directories", cleared);
    }

    spawn_reconcile(&state);

    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("Arcade is ready to serve");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Run startup reconciliation in the background, unless offline
///
/// Requests are served while it runs; a bundle it has not reached yet is an
/// ordinary cache miss.
pub fn spawn_reconcile(state: &Arc<ServerState>) {
    if state.config.sync.offline {
        tracing::info!("Offline mode, startup reconciliation disabled");
        return;
    }

    let state = Arc::clone(state);
    tokio::spawn(async move {
        match state.reconciler.reconcile_all().await {
            Ok(report) => state.metrics.record_reconcile(report),
            Err(e) => tracing::error!("Startup reconciliation failed: {}", e),
        }
    });
}

/// Pull a missing bundle in the background
pub fn trigger_hydration(state: &Arc<ServerState>, id: BundleId) {
    state.metrics.record_hydration_started();

    let state = Arc::clone(state);
    tokio::spawn(async move {
        match state.hydrator.hydrate(id).await {
            // The hydrator logs the pull itself
            Ok(_) => state.metrics.record_hydration_completed(),
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(bundle_id = %id, "Hydration failed, next request retries: {}", e);
                } else {
                    tracing::error!(bundle_id = %id, "Failed to hydrate bundle: {}", e);
                }
                state.metrics.record_hydration_failed();
            }
        }
    });
}

/// Mirror a freshly ingested bundle to the remote store in the background
pub fn spawn_upload(state: &Arc<ServerState>, id: BundleId) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        match upload_bundle(&state.store, state.remote.as_ref(), id).await {
            Ok(_) => state.metrics.record_remote_upload(),
            Err(e) => {
                tracing::warn!(bundle_id = %id, "Failed to mirror bundle to remote: {}", e);
                state.metrics.record_remote_upload_error();
            }
        }
    });
}
