//! API credential resolution from multiple sources.
//!
//! Credentials can come from a direct config value (quick local testing),
//! a file path (Docker secrets pattern), or an environment variable
//! (CI/production), resolved in that priority order.

use std::fs;
use std::path::Path;

use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No credential source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read credential from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a credential from the first available source:
/// direct value, then file contents, then environment variable.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&Path>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Ok(SecretString::from(trimmed.to_string()));
        }
    }

    if let Some(path) = file_path {
        let contents = fs::read_to_string(path).map_err(|source| SecretError::FileReadError {
            path: path.display().to_string(),
            source,
        })?;
        return Ok(SecretString::from(contents.trim().to_string()));
    }

    if let Some(name) = env_var {
        return match std::env::var(name) {
            Ok(value) => Ok(SecretString::from(value)),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}
