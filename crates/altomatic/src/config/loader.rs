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

    let errors: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: errors.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.provider.model.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "provider.model must not be empty".to_string(),
        });
    }

    if !(1..=16).contains(&config.batch.worker_count) {
        return Err(ConfigError::Validation {
            message: format!(
                "batch.worker_count must be between 1 and 16, got {}",
                config.batch.worker_count
            ),
        });
    }

    if config.retry.initial_backoff_ms == 0 {
        return Err(ConfigError::Validation {
            message: "retry.initial_backoff_ms must be greater than 0".to_string(),
        });
    }

    if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
        return Err(ConfigError::Validation {
            message: format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                config.retry.initial_backoff_ms, config.retry.max_backoff_ms
            ),
        });
    }

    for url in [&config.provider.base_url, &config.provider.proxy]
        .into_iter()
        .flatten()
    {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation {
                message: format!("URL must start with http:// or https://: {}", url),
            });
        }
    }

    for (key, template) in &config.prompts {
        if template.template.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("Prompt template '{}' is empty", key),
            });
        }
    }

    Ok(())
}
