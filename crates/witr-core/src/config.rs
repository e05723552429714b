//! Configuration system for witr
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard paths)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Validation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete witr configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WitrConfig {
    pub witr: GeneralSettings,

    pub discover: DiscoverSettings,

    pub enrich: EnrichSettings,

    pub classify: ClassifySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

/// Process discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverSettings {
    /// Search-utility names whose processes never count as matches
    pub search_tools: Vec<String>,
}

impl Default for DiscoverSettings {
    fn default() -> Self {
        Self {
            search_tools: vec!["grep".to_string()],
        }
    }
}

/// Context enrichment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichSettings {
    /// Root of the per-process filesystem
    pub proc_root: PathBuf,

    /// Ask the init system which unit owns the process
    pub service_lookup: bool,

    /// Walk up from the working directory looking for a git repository
    pub git_lookup: bool,

    /// Maximum number of processes enriched concurrently
    pub workers: usize,
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            service_lookup: true,
            git_lookup: true,
            workers: 4,
        }
    }
}

/// Task classification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifySettings {
    /// Project manifest file name looked up in the working directory
    pub manifest_file: String,
}

impl Default for ClassifySettings {
    fn default() -> Self {
        Self {
            manifest_file: "package.json".to_string(),
        }
    }
}

/// Locates, loads and validates [`WitrConfig`]
pub struct ConfigLoader {
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration: file (if any), then env overrides, then validation
    pub fn load(&self) -> ConfigResult<WitrConfig> {
        let mut config = match self.find_config_file()? {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                self.load_from_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                WitrConfig::default()
            }
        };

        self.apply_env_overrides(&mut config);
        self.validate(&config)?;

        Ok(config)
    }

    /// An explicit CLI path must exist; the other locations are optional
    fn find_config_file(&self) -> ConfigResult<Option<PathBuf>> {
        // 1. CLI --config flag
        if let Some(path) = &self.cli_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.clone()));
            }
            return Ok(Some(path.clone()));
        }

        // 2. WITR_CONFIG environment variable
        if let Ok(env_path) = std::env::var("WITR_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok(Some(path));
            }
            warn!("WITR_CONFIG path does not exist: {}", env_path);
        }

        // 3. ~/.config/witr/config.toml
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Ok(Some(path));
            }
        }

        // 4. /etc/witr/config.toml
        let path = PathBuf::from("/etc/witr/config.toml");
        if path.exists() {
            return Ok(Some(path));
        }

        Ok(None)
    }

    fn load_from_file(&self, path: &Path) -> ConfigResult<WitrConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: WitrConfig = toml::from_str(&content)?;
        Ok(config)
    }

    fn apply_env_overrides(&self, config: &mut WitrConfig) {
        self.apply_overrides(config, |key| std::env::var(key).ok());
    }

    fn apply_overrides(&self, config: &mut WitrConfig, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("WITR_LOG_LEVEL") {
            config.witr.log_level = val;
        }
        if let Some(val) = var("WITR_PROC_ROOT") {
            config.enrich.proc_root = PathBuf::from(val);
        }
        if let Some(val) = var("WITR_SERVICE_LOOKUP") {
            config.enrich.service_lookup = val.parse().unwrap_or(config.enrich.service_lookup);
        }
        if let Some(val) = var("WITR_GIT_LOOKUP") {
            config.enrich.git_lookup = val.parse().unwrap_or(config.enrich.git_lookup);
        }
        if let Some(val) = var("WITR_WORKERS") {
            if let Ok(workers) = val.parse() {
                config.enrich.workers = workers;
            }
        }
    }

    fn validate(&self, config: &WitrConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.witr.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.witr.log_level, valid_levels
            )));
        }

        if config.discover.search_tools.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "discover.search_tools cannot contain blank entries".to_string(),
            ));
        }

        if config.enrich.workers == 0 {
            return Err(ConfigError::ValidationError(
                "enrich.workers must be at least 1".to_string(),
            ));
        }

        if config.enrich.proc_root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "enrich.proc_root cannot be empty".to_string(),
            ));
        }

        if config.classify.manifest_file.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "classify.manifest_file cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the default config file path for the current user
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("witr").join("config.toml"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

mod dirs {
    use std::path::PathBuf;

    /// The user's config directory
    pub fn config_dir() -> Option<PathBuf> {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}
