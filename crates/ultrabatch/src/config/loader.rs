use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| format!("{} at {}", e, e.instance_path()))
        .collect();

    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub(crate) fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    let base_url = config.job_service.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(invalid(format!(
            "job_service.base_url must be an http(s) URL, got '{}'",
            base_url
        )));
    }

    if config.job_service.request_timeout_secs == 0 || config.job_service.connect_timeout_secs == 0
    {
        return Err(invalid("job_service timeouts must be greater than zero"));
    }

    if config.upload.max_files == 0 {
        return Err(invalid("upload.max_files must be greater than zero"));
    }
    if config.upload.max_concurrency == 0 {
        return Err(invalid("upload.max_concurrency must be greater than zero"));
    }
    if config.upload.timeout_secs == 0 {
        return Err(invalid("upload.timeout_secs must be greater than zero"));
    }

    let polling = &config.polling;
    if polling.interval_secs == 0 || polling.request_timeout_secs == 0 {
        return Err(invalid(
            "polling.interval_secs and polling.request_timeout_secs must be greater than zero",
        ));
    }
    if !polling.backoff_multiplier.is_finite() || polling.backoff_multiplier < 1.0 {
        return Err(invalid("polling.backoff_multiplier must be >= 1.0"));
    }
    if polling.max_interval_secs < polling.interval_secs {
        return Err(invalid(
            "polling.max_interval_secs must not be smaller than polling.interval_secs",
        ));
    }
    if polling.max_consecutive_failures == Some(0) {
        return Err(invalid("polling.max_consecutive_failures must be at least 1"));
    }

    if config.display.batch_size == 0 {
        return Err(invalid("display.batch_size must be greater than zero"));
    }

    if tracing_subscriber::EnvFilter::try_new(&config.logging.level).is_err() {
        return Err(invalid(format!(
            "logging.level '{}' is not a valid filter directive",
            config.logging.level
        )));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}
