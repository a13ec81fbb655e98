//! Configuration for the author reporting tool

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt};

use crate::constants;

// =============================================================================
// File-based Configuration (config.toml)
// =============================================================================

/// Configuration loaded from config.toml
///
/// The `[envato]` section is only needed by commands that call the API.
#[derive(Debug, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub envato: Option<EnvatoConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Marketplace API access
#[derive(Debug, Clone, Deserialize)]
pub struct EnvatoConfig {
    /// Personal token with statement and earnings permissions
    pub token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first attempt of a call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Statement pages fetched before giving up on a window
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

/// Report cache location
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_base_url() -> String {
    constants::ENVATO_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    constants::DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    constants::DEFAULT_MAX_RETRIES
}

fn default_max_pages() -> u32 {
    constants::DEFAULT_MAX_PAGES
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(constants::DEFAULT_CACHE_PATH),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// The `[envato]` section, required for report commands
    pub fn require_envato(&self) -> Result<&EnvatoConfig> {
        self.envato.as_ref().context(
            "Missing [envato] section in config.toml.\n\
             Add one with token = \"<your personal token>\" to build reports.",
        )
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| {
            "Failed to parse config.toml. Check for:\n\
             - Missing required fields (envato.token when [envato] is present)\n\
             - Invalid TOML syntax (missing quotes, brackets, etc.)\n\
             - Incorrect data types (strings vs numbers)"
        })
    }
}

impl EnvatoConfig {
    /// Token with all but the last four characters hidden, for safe logging
    pub fn masked_token(&self) -> String {
        let count = self.token.chars().count();
        if count <= 4 {
            return "****".to_string();
        }
        let tail: String = self.token.chars().skip(count - 4).collect();
        format!("****{}", tail)
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber. `RUST_LOG` overrides the configured level.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).with_writer(std::io::stderr).init();
            }
            _ => {
                fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = FileConfig::parse("[envato]\ntoken = \"abc123\"\n").unwrap();
        let envato = config.require_envato().unwrap();
        assert_eq!(envato.token, "abc123");
        assert_eq!(envato.base_url, constants::ENVATO_API_BASE);
        assert_eq!(envato.timeout_secs, constants::DEFAULT_TIMEOUT_SECS);
        assert_eq!(envato.max_retries, constants::DEFAULT_MAX_RETRIES);
        assert_eq!(envato.max_pages, constants::DEFAULT_MAX_PAGES);
        assert_eq!(config.cache.path, PathBuf::from(constants::DEFAULT_CACHE_PATH));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_full_config() {
        let config = FileConfig::parse(
            r#"
            [envato]
            token = "secret"
            base_url = "http://localhost:8080"
            timeout_secs = 5
            max_retries = 1
            max_pages = 20

            [cache]
            path = "/tmp/reports.db"

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();
        let envato = config.require_envato().unwrap();
        assert_eq!(envato.base_url, "http://localhost:8080");
        assert_eq!(envato.max_pages, 20);
        assert_eq!(config.cache.path, PathBuf::from("/tmp/reports.db"));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_missing_token_is_an_error() {
        assert!(FileConfig::parse("[envato]\nbase_url = \"x\"\n").is_err());
    }

    #[test]
    fn test_cache_only_config_without_envato_section() {
        let config = FileConfig::parse("[cache]\npath = \"/tmp/reports.db\"\n").unwrap();
        assert!(config.envato.is_none());
        assert_eq!(config.cache.path, PathBuf::from("/tmp/reports.db"));

        let err = config.require_envato().unwrap_err();
        assert!(err.to_string().contains("Missing [envato] section"));
        assert!(FileConfig::parse("").unwrap().require_envato().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileConfig::load(&dir.path().join("config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_masked_token() {
        let config = FileConfig::parse("[envato]\ntoken = \"abcdef123456\"\n").unwrap();
        assert_eq!(config.require_envato().unwrap().masked_token(), "****3456");

        let config = FileConfig::parse("[envato]\ntoken = \"abc\"\n").unwrap();
        assert_eq!(config.require_envato().unwrap().masked_token(), "****");
    }
}
