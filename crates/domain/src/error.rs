//! Error types for domain configuration.

use thiserror::Error;

/// Result type alias for domain operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Domain configuration errors.
///
/// These are configuration errors: they abort the computation for the
/// affected server or cluster and are never retried.
#[derive(Debug, Error)]
pub enum Error {
    /// The domain declares a startup control outside the known set.
    #[error("illegal startup control: '{value}'")]
    IllegalStartupControl { value: String },

    /// The resource's apiVersion has no matching builder.
    #[error("unsupported domain apiVersion: '{api_version}'")]
    UnsupportedApiVersion { api_version: String },

    /// Loading or parsing the resource failed.
    #[error(transparent)]
    Load(#[from] domop_core::Error),
}

impl Error {
    /// Create an illegal startup control error.
    pub fn illegal_startup_control(value: impl Into<String>) -> Self {
        Self::IllegalStartupControl {
            value: value.into(),
        }
    }

    /// Create an unsupported apiVersion error.
    pub fn unsupported_api_version(api_version: impl Into<String>) -> Self {
        Self::UnsupportedApiVersion {
            api_version: api_version.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_startup_control_display() {
        let err = Error::illegal_startup_control("SOMETIMES");
        assert_eq!(err.to_string(), "illegal startup control: 'SOMETIMES'");
    }

    #[test]
    fn test_load_error_wraps_core_error() {
        let err = Error::from(domop_core::Error::yaml_parse_failed("bad indent"));
        assert!(err.to_string().contains("bad indent"));
    }
}
