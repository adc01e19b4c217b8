// src/server/metrics.rs
//! Server metrics tracking
//!
//! Atomic counters for play requests, uploads and background sync work,
//! exposed through the admin stats endpoint.

use crate::sync::ReconcileReport;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Server metrics collector
#[derive(Default)]
pub struct ServerMetrics {
    /// Play requests (index and assets)
    requests_total: AtomicU64,
    /// Served from the local store
    hits: AtomicU64,
    /// Bundle not present locally
    misses: AtomicU64,
    /// Hydrations spawned by misses
    hydrations_started: AtomicU64,
    hydrations_completed: AtomicU64,
    hydrations_failed: AtomicU64,
    /// Game archives accepted
    bundles_ingested: AtomicU64,
    /// Game archives refused (bad container, traversal)
    uploads_rejected: AtomicU64,
    /// Archive bytes received
    bytes_received: AtomicU64,
    /// Background bundle mirrors to the remote store
    remote_uploads: AtomicU64,
    remote_upload_errors: AtomicU64,
    misc_uploads: AtomicU64,
    misc_served: AtomicU64,
    last_reconcile: RwLock<Option<ReconcileReport>>,
    /// Server start time
    start_time: std::sync::OnceLock<Instant>,
}

impl ServerMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        let metrics = Self::default();
        let _ = metrics.start_time.set(Instant::now());
        metrics
    }

    pub fn record_hit(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hydration_started(&self) {
        self.hydrations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hydration_completed(&self) {
        self.hydrations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hydration_failed(&self) {
        self.hydrations_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted archive of `bytes` bytes
    pub fn record_ingest(&self, bytes: u64) {
        self.bundles_ingested.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_upload_rejected(&self) {
        self.uploads_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_upload(&self) {
        self.remote_uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_upload_error(&self) {
        self.remote_upload_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_misc_upload(&self) {
        self.misc_uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_misc_served(&self) {
        self.misc_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Keep the outcome of the latest reconciliation run
    pub fn record_reconcile(&self, report: ReconcileReport) {
        *self.last_reconcile.write() = Some(report);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self
            .start_time
            .get()
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);

        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let bytes_received = self.bytes_received.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            hits,
            misses,
            hit_rate,
            hydrations_started: self.hydrations_started.load(Ordering::Relaxed),
            hydrations_completed: self.hydrations_completed.load(Ordering::Relaxed),
            hydrations_failed: self.hydrations_failed.load(Ordering::Relaxed),
            bundles_ingested: self.bundles_ingested.load(Ordering::Relaxed),
            uploads_rejected: self.uploads_rejected.load(Ordering::Relaxed),
            bytes_received,
            bytes_received_human: human_bytes(bytes_received),
            remote_uploads: self.remote_uploads.load(Ordering::Relaxed),
            remote_upload_errors: self.remote_upload_errors.load(Ordering::Relaxed),
            misc_uploads: self.misc_uploads.load(Ordering::Relaxed),
            misc_served: self.misc_served.load(Ordering::Relaxed),
            last_reconcile: self.last_reconcile.read().clone(),
            uptime_secs: uptime.as_secs(),
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub hits: u64,
    pub misses: u64,
    /// Hit rate percentage
    pub hit_rate: f64,
    pub hydrations_started: u64,
    pub hydrations_completed: u64,
    pub hydrations_failed: u64,
    pub bundles_ingested: u64,
    pub uploads_rejected: u64,
    pub bytes_received: u64,
    /// Human-readable bytes received
    pub bytes_received_human: String,
    pub remote_uploads: u64,
    pub remote_upload_errors: u64,
    pub misc_uploads: u64,
    pub misc_served: u64,
    /// `None` until the first reconciliation finishes
    pub last_reconcile: Option<ReconcileReport>,
    /// Server uptime in seconds
    pub uptime_secs: u64,
}

/// Format bytes as human-readable string
fn human_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
