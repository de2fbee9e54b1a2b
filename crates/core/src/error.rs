//! Core error types for domop operations.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for domop operations.
#[derive(Debug, Error)]
pub enum Error {
    // I/O errors
    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    // Parsing errors
    #[error("JSON parse error: {reason}")]
    JsonParseFailed { reason: String },

    #[error("YAML parse error: {reason}")]
    YamlParseFailed { reason: String },

    #[error("TOML parse error: {reason}")]
    TomlParseFailed { reason: String },

    #[error("unsupported file format for '{path}' (expected .toml, .yaml, .yml or .json)")]
    UnsupportedFormat { path: PathBuf },

    // Configuration errors
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("invalid environment override {name}={value}: {reason}")]
    InvalidEnvOverride {
        name: String,
        value: String,
        reason: String,
    },
}

impl Error {
    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse_failed(reason: impl Into<String>) -> Self {
        Self::JsonParseFailed {
            reason: reason.into(),
        }
    }

    /// Create a YAML parse error.
    pub fn yaml_parse_failed(reason: impl Into<String>) -> Self {
        Self::YamlParseFailed {
            reason: reason.into(),
        }
    }

    /// Create a TOML parse error.
    pub fn toml_parse_failed(reason: impl Into<String>) -> Self {
        Self::TomlParseFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid environment override error.
    pub fn invalid_env_override(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidEnvOverride {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = Error::invalid_config("workers", "must be greater than zero");
        assert!(err.to_string().contains("workers"));
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_env_override_display() {
        let err = Error::invalid_env_override("DOMOP_WORKERS", "many", "not a number");
        let text = err.to_string();
        assert!(text.contains("DOMOP_WORKERS=many"));
    }
}
