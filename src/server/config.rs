// src/server/config.rs
//! Configuration file parsing for the arcade server
//!
//! Supports TOML configuration files with the following sections:
//! - [server] - Bind address, public URL, CORS
//! - [storage] - Bundle store root, upload size limits
//! - [remote] - R2 / S3-compatible bucket and credentials
//! - [sync] - Startup reconciliation and download parallelism
//!
//! A handful of environment variables override the file once at startup:
//! `R2_BUCKET`, `R2_ACCOUNT_ID`, `R2_ENDPOINT` and `DEBUG_ENV`.

use crate::remote::RemoteConfig;
use crate::server::ServerConfig;
use crate::sync::{DEFAULT_DOWNLOAD_CONCURRENCY, SyncConfig};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
pub struct ArcadeConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerSection,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSection,

    /// Remote mirror settings
    #[serde(default)]
    pub remote: RemoteSection,

    /// Sync settings
    #[serde(default)]
    pub sync: SyncSection,
}

/// Server configuration section
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Public API bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Base URL prepended to misc-file links (empty = relative links)
    #[serde(default)]
    pub public_url: String,

    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: String::new(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3001".to_string()
}

/// Storage configuration section
#[derive(Debug, Deserialize)]
pub struct StorageSection {
    /// Directory holding one subdirectory per bundle
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Largest accepted game archive (e.g., "100MB")
    #[serde(default = "default_max_game_upload")]
    pub max_game_upload: String,

    /// Largest accepted misc file (e.g., "50MB")
    #[serde(default = "default_max_misc_upload")]
    pub max_misc_upload: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            max_game_upload: default_max_game_upload(),
            max_misc_upload: default_max_misc_upload(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./games")
}

fn default_max_game_upload() -> String {
    "100MB".to_string()
}

fn default_max_misc_upload() -> String {
    "50MB".to_string()
}

/// Remote mirror configuration section
#[derive(Debug, Deserialize)]
pub struct RemoteSection {
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Cloudflare account id (selects the R2 endpoint)
    #[serde(default)]
    pub account_id: Option<String>,

    /// Custom S3-compatible endpoint, overrides `account_id`
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    /// Name of the env var holding the access key id
    #[serde(default = "default_access_key_env")]
    pub access_key_env: String,

    /// Name of the env var holding the secret access key
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            account_id: None,
            endpoint: None,
            region: default_region(),
            access_key_env: default_access_key_env(),
            secret_key_env: default_secret_key_env(),
        }
    }
}

fn default_bucket() -> String {
    "shiba-arcade".to_string()
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_access_key_env() -> String {
    "R2_ACCESS_KEY_ID".to_string()
}

fn default_secret_key_env() -> String {
    "R2_SECRET_ACCESS_KEY".to_string()
}

/// Sync configuration section
#[derive(Debug, Deserialize)]
pub struct SyncSection {
    /// Skip startup reconciliation (local development)
    #[serde(default)]
    pub offline: bool,

    /// Parallel object downloads per bundle
    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            offline: false,
            download_concurrency: default_download_concurrency(),
        }
    }
}

fn default_download_concurrency() -> usize {
    DEFAULT_DOWNLOAD_CONCURRENCY
}

impl ArcadeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ArcadeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load `path` if given and present, else defaults; then apply
    /// environment overrides and validate
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::load(path)?,
            Some(path) => {
                tracing::info!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bucket) = lookup("R2_BUCKET") {
            // An empty bucket falls back to the default, not to ""
            self.remote.bucket = if bucket.trim().is_empty() {
                default_bucket()
            } else {
                bucket
            };
        }
        if let Some(account_id) = lookup("R2_ACCOUNT_ID").filter(|v| !v.is_empty()) {
            self.remote.account_id = Some(account_id);
        }
        if let Some(endpoint) = lookup("R2_ENDPOINT").filter(|v| !v.is_empty()) {
            self.remote.endpoint = Some(endpoint);
        }
        if lookup("DEBUG_ENV").as_deref() == Some("true") {
            self.sync.offline = true;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid server.bind address: {}", self.server.bind))?;

        if parse_size(&self.storage.max_game_upload)? == 0 {
            anyhow::bail!("storage.max_game_upload must be greater than zero");
        }
        if parse_size(&self.storage.max_misc_upload)? == 0 {
            anyhow::bail!("storage.max_misc_upload must be greater than zero");
        }

        if self.remote.bucket.is_empty() {
            anyhow::bail!("remote.bucket must not be empty");
        }
        if !self.sync.offline && self.remote.account_id.is_none() && self.remote.endpoint.is_none()
        {
            anyhow::bail!(
                "remote.account_id or remote.endpoint is required unless sync.offline is set"
            );
        }

        if self.sync.download_concurrency == 0 {
            anyhow::bail!("sync.download_concurrency must be at least 1");
        }

        Ok(())
    }

    /// Remote connection settings, with credentials read from the
    /// configured environment variables
    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            bucket: self.remote.bucket.clone(),
            account_id: self.remote.account_id.clone(),
            endpoint: self.remote.endpoint.clone(),
            region: self.remote.region.clone(),
            access_key: std::env::var(&self.remote.access_key_env).ok(),
            secret_key: std::env::var(&self.remote.secret_key_env).ok(),
        }
    }

    /// Whether a remote target is configured at all
    pub fn has_remote_target(&self) -> bool {
        self.remote.account_id.is_some() || self.remote.endpoint.is_some()
    }

    /// Convert to the internal ServerConfig structure
    pub fn to_server_config(&self) -> Result<ServerConfig> {
        let bind_addr = self.server.bind.parse()?;

        Ok(ServerConfig {
            bind_addr,
            storage_root: self.storage.root.clone(),
            public_url: self.server.public_url.trim_end_matches('/').to_string(),
            cors_allowed_origins: self.server.cors_origins.clone(),
            max_game_upload: usize::try_from(parse_size(&self.storage.max_game_upload)?)?,
            max_misc_upload: usize::try_from(parse_size(&self.storage.max_misc_upload)?)?,
            sync: SyncConfig {
                offline: self.sync.offline,
                download_concurrency: self.sync.download_concurrency,
            },
        })
    }
}

/// Parse a human-readable size string (e.g., "100MB", "1GB", "512KB")
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("GB") {
        (n, 1024u64 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1024u64 * 1024)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1024u64)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1u64)
    } else {
        // Assume bytes
        (s.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid size number: {}", num_str))?;

    if num < 0.0 {
        anyhow::bail!("Size must not be negative: {}", s);
    }

    Ok((num * multiplier as f64) as u64)
}
