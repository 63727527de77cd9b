//! Configuration loading
//!
//! Bootstrap configuration comes from one TOML file with per-field
//! defaults. The file path is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. `SHORTS_CONFIG` environment variable
//! 3. `<config dir>/shorts-creator/config.toml`
//! 4. `./config.toml` (fallback)
//!
//! A missing file is not fatal: defaults are used. [`TomlConfig::load`]
//! runs before tracing is installed, so it reports the [`ConfigSource`]
//! for the binary to log afterwards.
//! Secrets may be supplied through environment variables, which override
//! the file (see [`TomlConfig::apply_env_overrides`]).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "SHORTS_CONFIG";

/// Top-level configuration shared by both binaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub scraper: ScraperConfig,

    #[serde(default)]
    pub evaluator: EvaluatorConfig,
}

/// Where the loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl ConfigSource {
    /// Log the source; call once tracing is initialized
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigSource::Defaults => warn!("No config file found, using built-in defaults"),
        }
    }
}

/// Record store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Postgres,
}

impl std::str::FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            other => Err(Error::Config(format!("Unsupported database type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: Backend,

    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// PostgreSQL connection string (required for the postgres backend)
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: default_db_path(),
            url: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default)]
    pub subreddits: Vec<String>,

    /// Minimum formatted content length in characters
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,

    /// Look-back window when `--hours` is not given
    #[serde(default = "default_hours")]
    pub hours: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// OAuth application credentials (optional; public listings are used without them)
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            subreddits: Vec::new(),
            min_content_length: default_min_content_length(),
            hours: default_hours(),
            user_agent: default_user_agent(),
            requests_per_second: default_requests_per_second(),
            client_id: None,
            client_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens_per_batch")]
    pub max_tokens_per_batch: usize,

    #[serde(default = "default_max_items_per_batch")]
    pub max_items_per_batch: usize,

    #[serde(default = "default_batch_delay_secs")]
    pub batch_delay_secs: u64,

    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl EvaluatorConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            max_tokens_per_batch: default_max_tokens_per_batch(),
            max_items_per_batch: default_max_items_per_batch(),
            batch_delay_secs: default_batch_delay_secs(),
            max_consecutive_failures: default_max_consecutive_failures(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./stories.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_min_content_length() -> usize {
    100
}

fn default_hours() -> u32 {
    24
}

fn default_user_agent() -> String {
    format!("shorts-creator/{}", env!("CARGO_PKG_VERSION"))
}

fn default_requests_per_second() -> u32 {
    1
}

fn default_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens_per_batch() -> usize {
    50_000
}

fn default_max_items_per_batch() -> usize {
    20
}

fn default_batch_delay_secs() -> u64 {
    4
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl TomlConfig {
    /// Parse a config file that must exist
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML {}: {}", path.display(), e)))
    }

    /// Resolve the config path and load it, falling back to defaults if absent
    ///
    /// An explicit `--config` path that does not exist is an error; the
    /// implicit locations degrade to defaults.
    pub fn load(cli_arg: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let path = match cli_arg {
            Some(path) => Some(path.to_path_buf()),
            None => resolve_config_path(),
        };
        Self::load_from(path)
    }

    fn load_from(path: Option<PathBuf>) -> Result<(Self, ConfigSource)> {
        match path {
            Some(path) => Ok((Self::from_file(&path)?, ConfigSource::File(path))),
            None => Ok((Self::default(), ConfigSource::Defaults)),
        }
    }

    /// Apply environment overrides for connection parameters and secrets
    ///
    /// Reads `DB_TYPE`, `DB_PATH`, `DB_STRING`, `GEMINI_API_KEY`,
    /// `REDDIT_CLIENT_ID`, `REDDIT_CLIENT_SECRET`, `REDDIT_USER_AGENT`
    /// and `SHORTS_LOG_LEVEL`. Called once at startup by the binaries.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_non_empty("DB_TYPE") {
            self.database.backend = v.parse()?;
        }
        if let Some(v) = env_non_empty("DB_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = env_non_empty("DB_STRING") {
            self.database.url = Some(v);
        }
        if let Some(v) = env_non_empty("GEMINI_API_KEY") {
            self.evaluator.api_key = Some(v);
        }
        if let Some(v) = env_non_empty("REDDIT_CLIENT_ID") {
            self.scraper.client_id = Some(v);
        }
        if let Some(v) = env_non_empty("REDDIT_CLIENT_SECRET") {
            self.scraper.client_secret = Some(v);
        }
        if let Some(v) = env_non_empty("REDDIT_USER_AGENT") {
            self.scraper.user_agent = v;
        }
        if let Some(v) = env_non_empty("SHORTS_LOG_LEVEL") {
            self.logging.level = v;
        }
        Ok(())
    }

    /// Check cross-field constraints the type system does not capture
    pub fn validate(&self) -> Result<()> {
        if self.database.backend == Backend::Postgres && self.database.url.is_none() {
            return Err(Error::Config(
                "PostgreSQL backend requires database.url (or DB_STRING)".to_string(),
            ));
        }
        if self.evaluator.max_items_per_batch == 0 {
            return Err(Error::Config("evaluator.max_items_per_batch must be at least 1".to_string()));
        }
        if self.evaluator.max_tokens_per_batch == 0 {
            return Err(Error::Config("evaluator.max_tokens_per_batch must be at least 1".to_string()));
        }
        if self.evaluator.max_consecutive_failures == 0 {
            return Err(Error::Config(
                "evaluator.max_consecutive_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Find the config file from the environment or the platform config directory
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(path) = env_non_empty(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    if let Some(path) = dirs::config_dir().map(|d| d.join("shorts-creator").join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }

    let local = PathBuf::from("config.toml");
    if local.exists() {
        return Some(local);
    }

    None
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
