//! BibLink Configuration Management
//!
//! Handles configuration from environment variables and TOML files,
//! with sensible defaults for pipeline cadence and HTTP timeouts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::{RepositoryEndpoint, ReplacementRules, SimilaritySelector, ToleranceThresholds};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Repository providing the subjects of the links
    pub source_a: RepositoryEndpoint,

    /// Repository providing the objects of the links
    pub source_b: RepositoryEndpoint,

    /// Repository the matched records are saved into
    pub destination: RepositoryEndpoint,

    /// Batch size and logging cadence
    pub pipeline: PipelineSettings,

    /// HTTP client timeouts
    pub http: HttpConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Per-source string replacement rules
    pub rules: SourceRules,

    /// Title similarity parameters for link acceptance
    pub similarity: SimilaritySelector,

    /// Title/year tolerance for link acceptance
    pub tolerance: ToleranceThresholds,

    /// Auxiliary download pool settings
    pub download: DownloadSettings,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError { path, message },
            other => other,
        })
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        apply_credentials_env(&mut self.source_a, "BIBLINK_SOURCE_A");
        apply_credentials_env(&mut self.source_b, "BIBLINK_SOURCE_B");
        apply_credentials_env(&mut self.destination, "BIBLINK_DESTINATION");

        if let Ok(url) = std::env::var("BIBLINK_DESTINATION_SCHEMA_URL") {
            self.destination.schema_url = url;
        }

        if let Ok(size) = std::env::var("BIBLINK_INSERT_BATCH_SIZE") {
            self.pipeline.insert_batch_size =
                size.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "BIBLINK_INSERT_BATCH_SIZE".to_string(),
                    value: size,
                })?;
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        self.pipeline.validate()
    }
}

fn apply_credentials_env(endpoint: &mut RepositoryEndpoint, prefix: &str) {
    let user = std::env::var(format!("{prefix}_USER")).ok();
    let pass = std::env::var(format!("{prefix}_PASS")).ok();

    if user.is_none() && pass.is_none() {
        return;
    }

    let credentials = endpoint.credentials.get_or_insert_with(Default::default);
    if let Some(user) = user {
        credentials.username = user;
    }
    if let Some(pass) = pass {
        credentials.password = pass;
    }
}

/// Batch size and progress-logging cadence of the extraction pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Records collected before a batch is written in one transaction
    pub insert_batch_size: usize,

    /// Rows streamed between two extraction progress messages
    pub extract_message_records: usize,

    /// Records inserted between two insertion progress messages
    pub insert_message_records: usize,
}

impl PipelineSettings {
    /// Reject zero batch sizes and cadences
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("pipeline.insert_batch_size", self.insert_batch_size),
            ("pipeline.extract_message_records", self.extract_message_records),
            ("pipeline.insert_message_records", self.insert_message_records),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            insert_batch_size: 1000,
            extract_message_records: 25_000,
            insert_message_records: 5_000,
        }
    }
}

/// HTTP client configuration for repository servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds (queries over large repositories are slow)
    pub read_timeout_secs: u64,

    /// Quads buffered in a transaction before they are sent
    pub transaction_chunk_size: usize,
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            read_timeout_secs: 3600,
            transaction_chunk_size: 5_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Replacement rules for each source repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceRules {
    pub source_a: ReplacementRules,
    pub source_b: ReplacementRules,
}

/// Settings of the bounded, retrying download pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Maximum downloads running at once
    pub concurrency: usize,

    /// Attempts per file, including the first
    pub attempt_count: u32,

    /// Pause after a failed attempt, in milliseconds
    pub delay_between_attempts_ms: u64,

    /// Failed files tolerated in one batch before later batches are skipped
    pub max_allowed_consecutive_errors: usize,

    pub connect_timeout_secs: u64,

    pub read_timeout_secs: u64,
}

impl DownloadSettings {
    pub fn delay_between_attempts(&self) -> Duration {
        Duration::from_millis(self.delay_between_attempts_ms)
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            attempt_count: 3,
            delay_between_attempts_ms: 1_000,
            max_allowed_consecutive_errors: 10,
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
