use super::{AdapterConfig, ConfigError};

/// Validate the full adapter config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AdapterConfig) -> Result<(), ConfigError> {
    validate_backend_config(config)?;
    validate_model_config(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| validation_err(format!("{field} is not a valid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(validation_err(format!(
            "{field} must use http or https, got '{other}'"
        ))),
    }
}

fn validate_backend_config(config: &AdapterConfig) -> Result<(), ConfigError> {
    let backend = &config.backend;
    validate_http_url("backend.base_url", &backend.base_url)?;
    if backend.timeout == 0 {
        return Err(validation_err("backend.timeout must be greater than 0"));
    }
    if backend.connect_timeout == 0 {
        return Err(validation_err(
            "backend.connect_timeout must be greater than 0",
        ));
    }
    if backend.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "backend.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if backend.provider_name.trim().is_empty() {
        return Err(validation_err("backend.provider_name cannot be empty"));
    }
    if let Some(proxy) = backend.proxy.as_deref() {
        validate_http_url("backend.proxy", proxy)?;
    }
    for name in backend.headers.keys() {
        if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(validation_err(format!(
                "backend.headers contains invalid header name '{name}'"
            )));
        }
    }
    Ok(())
}

fn validate_model_config(config: &AdapterConfig) -> Result<(), ConfigError> {
    if config.model.id.trim().is_empty() {
        return Err(validation_err("model.id cannot be empty"));
    }
    if let Some(effort) = config.model.reasoning_effort.as_deref() {
        let valid = ["minimal", "low", "medium", "high"];
        if !valid.contains(&effort) {
            return Err(validation_err(format!(
                "model.reasoning_effort must be one of {valid:?}"
            )));
        }
    }
    Ok(())
}

fn validate_log_level(config: &AdapterConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.logging.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
