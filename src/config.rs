//! Configuration module for Imagebox.

use serde::Deserialize;
use std::path::Path;

use crate::{ImageboxError, Result};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins (empty = any origin).
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum request body size in megabytes.
    #[serde(default = "default_max_request_size")]
    pub max_request_size_mb: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5182
}

fn default_max_request_size() -> u64 {
    64
}

const MIB: u64 = 1024 * 1024;

impl ServerConfig {
    /// Request body limit in bytes, saturating on absurd values.
    pub fn max_request_size_bytes(&self) -> u64 {
        self.max_request_size_mb.saturating_mul(MIB)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
            max_request_size_mb: default_max_request_size(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/imagebox.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Image storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the uploaded files.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    /// URL prefix under which stored files are served.
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
}

fn default_upload_dir() -> String {
    "data/uploads".to_string()
}

fn default_public_prefix() -> String {
    "/uploads".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            public_prefix: default_public_prefix(),
        }
    }
}

/// Upload limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of images stored at once.
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    /// Maximum size of a single file in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    /// Allowed file extensions (lowercase, without dot).
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Memory ceiling for a single decode, in megabytes.
    #[serde(default = "default_decode_max_alloc")]
    pub decode_max_alloc_mb: u64,
}

fn default_max_images() -> usize {
    10
}

fn default_max_file_size() -> u64 {
    3 * 1024 * 1024 // 3MB
}

fn default_allowed_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_decode_max_alloc() -> u64 {
    256
}

impl LimitsConfig {
    /// Decoder memory ceiling in bytes.
    pub fn decode_max_alloc_bytes(&self) -> u64 {
        self.decode_max_alloc_mb.saturating_mul(MIB)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_images: default_max_images(),
            max_file_size_bytes: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
            decode_max_alloc_mb: default_decode_max_alloc(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/imagebox.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upload limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ImageboxError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ImageboxError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `IMAGEBOX_DATABASE_PATH`: Override the database file path
    /// - `IMAGEBOX_UPLOAD_DIR`: Override the upload directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("IMAGEBOX_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(dir) = std::env::var("IMAGEBOX_UPLOAD_DIR") {
            if !dir.is_empty() {
                self.storage.upload_dir = dir;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_images == 0 {
            return Err(ImageboxError::Config(
                "limits.max_images must be greater than zero".to_string(),
            ));
        }
        if self.limits.max_file_size_bytes == 0 {
            return Err(ImageboxError::Config(
                "limits.max_file_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.limits.allowed_extensions.is_empty() {
            return Err(ImageboxError::Config(
                "limits.allowed_extensions must list at least one extension".to_string(),
            ));
        }
        if !self.storage.public_prefix.starts_with('/') {
            return Err(ImageboxError::Config(format!(
                "storage.public_prefix must start with '/', got {:?}",
                self.storage.public_prefix
            )));
        }
        if self.limits.decode_max_alloc_mb == 0 {
            return Err(ImageboxError::Config(
                "limits.decode_max_alloc_mb must be greater than zero".to_string(),
            ));
        }
        if self.server.max_request_size_bytes() < self.limits.max_file_size_bytes {
            return Err(ImageboxError::Config(
                "server.max_request_size_mb is smaller than limits.max_file_size_bytes"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
