use std::collections::HashSet;

use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_backend_config(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.port == 0 {
        return Err(validation_err("server.port must be greater than 0"));
    }
    if server.host.trim().is_empty() {
        return Err(validation_err("server.host cannot be empty"));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_backend_config(config: &AppConfig) -> Result<(), ConfigError> {
    let backend = &config.backend;
    if !backend.base_url.starts_with("http://") && !backend.base_url.starts_with("https://") {
        return Err(validation_err(format!(
            "backend.base_url must start with http:// or https:// (got '{}')",
            backend.base_url
        )));
    }
    if url::Url::parse(&backend.base_url).is_err() {
        return Err(validation_err(format!(
            "backend.base_url is not a valid URL: '{}'",
            backend.base_url
        )));
    }
    if backend.models_timeout_secs == 0 {
        return Err(validation_err(
            "backend.models_timeout_secs must be greater than 0",
        ));
    }

    let mut seen = HashSet::new();
    for model in &backend.allowed_models {
        if model.trim().is_empty() {
            return Err(validation_err("backend.allowed_models contains an empty id"));
        }
        if !seen.insert(model.as_str()) {
            tracing::warn!(model = %model, "duplicate entry in backend.allowed_models");
        }
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
