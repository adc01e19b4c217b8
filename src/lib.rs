// src/lib.rs

//! Arcade game bundle host
//!
//! Accepts zipped game builds, unpacks them into a local bundle store, and
//! keeps that store in step with a remote object store (Cloudflare R2).
//!
//! # Architecture
//!
//! - Ingestion: untrusted zips are validated entry by entry and extracted
//!   into a staging directory, published by rename only when complete
//! - Bundle store: one directory per bundle id; its existence means "local"
//! - Remote mirror: `games/<id>/<path>` keys, `index.html` marks completeness
//! - Sync: bulk reconciliation at startup, single-flight hydration on miss
//! - Server: axum HTTP surface (feature `server`)

pub mod archive;
pub mod bundle;
mod error;
pub mod filesystem;
pub mod remote;
pub mod sync;

#[cfg(feature = "server")]
pub mod server;

pub use bundle::{BundleId, RemoteObjectKey};
pub use error::{Error, Result};
pub use filesystem::{BundleDirectory, BundleStore};
pub use remote::{MemoryStore, R2Store, RemoteConfig, RemoteStore};
pub use sync::{HydrateOutcome, Hydrator, ReconcileReport, Reconciler, SyncConfig};
