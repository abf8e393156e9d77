pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Environment variable naming an optional YAML file loaded underneath the environment.
pub const CONFIG_FILE_ENV: &str = "PROXY_CONFIG";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for environment variable {name}: {value:?}")]
    Env { name: &'static str, value: String },
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Listener and runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub runtime_worker_threads: Option<usize>,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            runtime_worker_threads: None,
        }
    }
}

/// The OpenAI-compatible backend every request is forwarded to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model ids exposed by `/api/tags`. Empty means every backend model.
    #[serde(default)]
    pub allowed_models: Vec<String>,
    #[serde(default = "default_models_timeout_secs")]
    pub models_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_models_timeout_secs() -> u64 {
    10
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            allowed_models: Vec::new(),
            models_timeout_secs: default_models_timeout_secs(),
        }
    }
}

impl BackendConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, allowed_models: Vec<String>) -> Self {
        Self {
            base_url: base_url.into(),
            allowed_models,
            ..Self::default()
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_reported_version")]
    pub reported_version: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_reported_version() -> String {
    "0.6.0".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            reported_version: default_reported_version(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl AppConfig {
    /// Apply environment overrides on top of the current values.
    ///
    /// `lookup` abstracts `std::env::var` so tests can feed a fixed table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] when a numeric variable does not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // A variable set to blank counts as unset, except for the allow-list.
        let present = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let port_var = present("PROXY_PORT")
            .map(|value| ("PROXY_PORT", value))
            .or_else(|| present("PORT").map(|value| ("PORT", value)));
        if let Some((name, value)) = port_var {
            self.server.port = parse_env(name, &value)?;
        }
        if let Some(host) = present("PROXY_HOST") {
            self.server.host = host;
        }
        if let Some(base_url) = present("OPENAI_API_BASE_URL") {
            self.backend.base_url = base_url;
        }
        if let Some(allowed) = lookup("OPENAI_ALLOWED_MODELS") {
            self.backend.allowed_models = parse_allowed_models(&allowed);
        }
        if let Some(value) = present("PROXY_MODELS_TIMEOUT_SECS") {
            self.backend.models_timeout_secs = parse_env("PROXY_MODELS_TIMEOUT_SECS", &value)?;
        }
        if let Some(level) = present("LOG_LEVEL") {
            self.features.log_level = level;
        }
        if let Some(version) = present("PROXY_REPORTED_VERSION") {
            self.features.reported_version = version;
        }
        self.normalize();
        Ok(())
    }

    fn normalize(&mut self) {
        let trimmed_len = self.backend.base_url.trim_end_matches('/').len();
        self.backend.base_url.truncate(trimmed_len);
        self.backend.allowed_models = self
            .backend
            .allowed_models
            .iter()
            .map(|model| model.trim())
            .filter(|model| !model.is_empty())
            .map(str::to_owned)
            .collect();
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        name,
        value: value.to_owned(),
    })
}

/// Split a comma-separated allow-list, trimming entries and dropping blanks.
#[must_use]
pub fn parse_allowed_models(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Load configuration: defaults, then the YAML file named by `PROXY_CONFIG`
/// (when set), then environment overrides. The result is validated.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, [`ConfigError::Env`] for unparseable variables, or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let mut config = match std::env::var(CONFIG_FILE_ENV) {
        Ok(path) if !path.trim().is_empty() => load_config_file(path.trim())?,
        _ => AppConfig::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Parse a YAML config file without applying environment overrides.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] or [`ConfigError::Yaml`].
pub fn load_config_file(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&contents)?;
    Ok(config)
}
