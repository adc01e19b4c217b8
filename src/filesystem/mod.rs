// src/filesystem/mod.rs

//! Filesystem operations for arcade
//!
//! This module provides:
//! - Path containment for untrusted relative paths (zip entries, request paths, remote keys)
//! - The local bundle store, one directory per bundle, published atomically

pub mod path;
mod store;

pub use store::{BundleDirectory, BundleStore};
