//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so an embedding application can start with
//! zero configuration.

use std::path::PathBuf;

use parlor_shared::constants::MAX_UPLOAD_SIZE;

/// Which document store backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local store, lost on exit.
    Memory,
    /// SQLite file in `data_dir` (or the platform data directory).
    Sqlite,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(format!("unknown store backend {other:?}")),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    /// Env: `PARLOR_LOG`
    /// Default: `parlor_client=debug,parlor_store=info,warn`
    pub log_filter: String,

    /// Document store backend.
    /// Env: `PARLOR_STORE` (`memory` | `sqlite`)
    /// Default: `sqlite`
    pub store_backend: StoreBackend,

    /// Directory for the SQLite database.
    /// Env: `PARLOR_DATA_DIR`
    /// Default: none (platform data directory).
    pub data_dir: Option<PathBuf>,

    /// Directory where uploaded images are written.
    /// Env: `PARLOR_BLOB_DIR`
    /// Default: `./blobs`
    pub blob_dir: PathBuf,

    /// Maximum image upload size in bytes.
    /// Env: `PARLOR_MAX_UPLOAD_BYTES`
    /// Default: 50 MiB
    pub max_upload_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_filter: "parlor_client=debug,parlor_store=info,warn".to_string(),
            store_backend: StoreBackend::Sqlite,
            data_dir: None,
            blob_dir: PathBuf::from("./blobs"),
            max_upload_bytes: MAX_UPLOAD_SIZE,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(filter) = lookup("PARLOR_LOG") {
            if !filter.trim().is_empty() {
                config.log_filter = filter;
            }
        }

        if let Some(value) = lookup("PARLOR_STORE") {
            match value.parse::<StoreBackend>() {
                Ok(backend) => config.store_backend = backend,
                Err(e) => {
                    tracing::warn!(value = %value, error = %e, "Invalid PARLOR_STORE, using default");
                }
            }
        }

        if let Some(dir) = lookup("PARLOR_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(dir) = lookup("PARLOR_BLOB_DIR") {
            if !dir.is_empty() {
                config.blob_dir = PathBuf::from(dir);
            }
        }

        if let Some(value) = lookup("PARLOR_MAX_UPLOAD_BYTES") {
            match value.parse::<usize>() {
                Ok(n) if n > 0 => config.max_upload_bytes = n,
                _ => {
                    tracing::warn!(value = %value, "Invalid PARLOR_MAX_UPLOAD_BYTES, using default");
                }
            }
        }

        config
    }
}
