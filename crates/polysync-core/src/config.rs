//! Configuration module for polysync.
//!
//! Transfer, HTTP, logging and database settings loaded from one YAML file,
//! plus the persisted adapter instances. Every section has defaults, so a
//! partial file is enough.
//!
//! Credentials are never part of this file; adapters look them up in the OS
//! keyring by adapter id.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::registry::PersistedAdapter;

const MIB: u64 = 1024 * 1024;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for polysync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transfer: TransferConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    /// Adapter instances, rebuilt through the adapter registry.
    pub adapters: Vec<PersistedAdapter>,
}

/// Chunked transfer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Size of each multipart upload part, in bytes.
    pub part_size_bytes: u64,
    /// Size of each ranged download request, in bytes.
    pub fragment_size_bytes: u64,
    /// Files of at least this size go through a multipart session.
    pub multipart_threshold_bytes: u64,
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// Entry database settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/polysync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("polysync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            part_size_bytes: 8 * MIB,
            fragment_size_bytes: 4 * MIB,
            multipart_threshold_bytes: 8 * MIB,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            user_agent: format!("polysync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("polysync")
                .join("entries.db"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"transfer.part_size_bytes"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- transfer ---
        if self.transfer.part_size_bytes == 0 {
            errors.push(ValidationError {
                field: "transfer.part_size_bytes".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.transfer.fragment_size_bytes == 0 {
            errors.push(ValidationError {
                field: "transfer.fragment_size_bytes".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.transfer.multipart_threshold_bytes < self.transfer.part_size_bytes {
            errors.push(ValidationError {
                field: "transfer.multipart_threshold_bytes".into(),
                message: format!(
                    "multipart_threshold_bytes ({}) must not be below part_size_bytes ({})",
                    self.transfer.multipart_threshold_bytes, self.transfer.part_size_bytes
                ),
            });
        }

        // --- http ---
        if self.http.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "http.request_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.http.user_agent.trim().is_empty() {
            errors.push(ValidationError {
                field: "http.user_agent".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- database ---
        if self.database.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "database.path".into(),
                message: "must not be empty".into(),
            });
        }

        // --- adapters ---
        for (index, adapter) in self.adapters.iter().enumerate() {
            if adapter.name.trim().is_empty() {
                errors.push(ValidationError {
                    field: format!("adapters[{index}].name"),
                    message: "must not be empty".into(),
                });
            }
            let duplicate = self.adapters[..index]
                .iter()
                .any(|other| other.id == adapter.id);
            if duplicate {
                errors.push(ValidationError {
                    field: format!("adapters[{index}].id"),
                    message: format!("duplicate adapter id {}", adapter.id),
                });
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Programmatic [`Config`] construction, mostly for tests and embedders.
///
/// # Example
///
/// ```rust,no_run
/// use polysync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .part_size_bytes(16 * 1024 * 1024)
///     .multipart_threshold_bytes(32 * 1024 * 1024)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- transfer ---

    pub fn part_size_bytes(mut self, bytes: u64) -> Self {
        self.config.transfer.part_size_bytes = bytes;
        self
    }

    pub fn fragment_size_bytes(mut self, bytes: u64) -> Self {
        self.config.transfer.fragment_size_bytes = bytes;
        self
    }

    pub fn multipart_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.transfer.multipart_threshold_bytes = bytes;
        self
    }

    // --- http ---

    pub fn request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.http.request_timeout_secs = seconds;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.http.user_agent = user_agent.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- database ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    // --- adapters ---

    pub fn adapter(mut self, adapter: PersistedAdapter) -> Self {
        self.config.adapters.push(adapter);
        self
    }

    // --- build ---

    pub fn build(self) -> Config {
        self.config
    }

    /// Like [`build`](Self::build), but rejects an invalid result.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
