//! Operator configuration.
//!
//! Configuration is layered: built-in defaults, then an optional TOML or YAML
//! file, then `DOMOP_*` environment overrides. The result is validated before
//! any subsystem sees it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "DOMOP_";

/// Retry settings for remote calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum attempts per call, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Upper bound for the exponential backoff.
    pub max_backoff_ms: u64,
    /// Whether a breached call deadline is retried.
    pub retry_on_timeout: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            retry_on_timeout: true,
        }
    }
}

/// Settings for the validating webhook the operator registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Namespace of the webhook service.
    pub namespace: String,
    /// Name of the webhook service.
    pub service_name: String,
    /// HTTPS port of the webhook service.
    pub port: u16,
    /// Base64-encoded certificate used as CA bundle.
    pub certificate_data: Option<String>,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            service_name: "domop-webhook-svc".to_string(),
            port: 8084,
            certificate_data: None,
        }
    }
}

/// Top-level operator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Number of scheduler workers.
    pub workers: usize,
    /// Deadline for each remote call.
    pub call_timeout_ms: u64,
    /// Tracing filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Retry settings.
    pub retry: RetrySettings,
    /// Webhook settings.
    pub webhook: WebhookSettings,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            call_timeout_ms: 10_000,
            log_filter: "info".to_string(),
            retry: RetrySettings::default(),
            webhook: WebhookSettings::default(),
        }
    }
}

impl OperatorConfig {
    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TomlParseFailed`] if the text is not valid TOML for
    /// this schema.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::toml_parse_failed(e.to_string()))
    }

    /// Parse a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::YamlParseFailed`] if the text is not valid YAML for
    /// this schema.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::yaml_parse_failed(e.to_string()))
    }

    /// Load a configuration file, choosing the parser by extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has an unknown extension
    /// or fails to parse.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            Some("json") => {
                serde_json::from_str(&text).map_err(|e| Error::json_parse_failed(e.to_string()))
            }
            _ => Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Apply `DOMOP_*` overrides from the given variables.
    ///
    /// Unknown variables are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEnvOverride`] when a recognised variable
    /// cannot be parsed.
    pub fn apply_env_overrides<I, K, V>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in vars {
            let (name, value) = (name.as_ref(), value.as_ref());
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match key {
                "WORKERS" => self.workers = parse_env(name, value)?,
                "CALL_TIMEOUT_MS" => self.call_timeout_ms = parse_env(name, value)?,
                "MAX_ATTEMPTS" => self.retry.max_attempts = parse_env(name, value)?,
                "INITIAL_BACKOFF_MS" => self.retry.initial_backoff_ms = parse_env(name, value)?,
                "MAX_BACKOFF_MS" => self.retry.max_backoff_ms = parse_env(name, value)?,
                "RETRY_ON_TIMEOUT" => self.retry.retry_on_timeout = parse_env(name, value)?,
                "WEBHOOK_NAMESPACE" => self.webhook.namespace = value.to_string(),
                "WEBHOOK_SERVICE" => self.webhook.service_name = value.to_string(),
                "WEBHOOK_PORT" => self.webhook.port = parse_env(name, value)?,
                "LOG_FILTER" => self.log_filter = value.to_string(),
                _ => tracing::debug!(variable = name, "Ignoring unknown override"),
            }
        }
        Ok(self)
    }

    /// Check invariants the scheduler and retry policy rely on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending key.
    pub fn validate(self) -> Result<Self> {
        if self.workers == 0 {
            return Err(Error::invalid_config("workers", "must be greater than zero"));
        }
        if self.call_timeout_ms == 0 {
            return Err(Error::invalid_config(
                "call_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::invalid_config(
                "retry.max_attempts",
                "must be greater than zero",
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(Error::invalid_config(
                "retry.initial_backoff_ms",
                "must not exceed retry.max_backoff_ms",
            ));
        }
        if self.webhook.namespace.trim().is_empty() {
            return Err(Error::invalid_config("webhook.namespace", "must not be empty"));
        }
        Ok(self)
    }

    /// Load defaults, an optional file and the process environment, then validate.
    ///
    /// # Errors
    ///
    /// Propagates file, parse, override and validation errors.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.apply_env_overrides(std::env::vars())?.validate()
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| Error::invalid_env_override(name, value, e.to_string()))
}
