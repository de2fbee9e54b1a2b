//! Startup control modes and server start policies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which servers of a domain the operator starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StartupControl {
    /// Start nothing.
    None,
    /// Start every server.
    All,
    /// Start only the admin server.
    Admin,
    /// Start the admin server and servers or clusters with explicit startup entries.
    Specified,
    /// Like `Specified`, but every clustered server may be started on demand.
    #[default]
    Auto,
}

impl StartupControl {
    /// All modes, in declaration order.
    pub const ALL_MODES: [Self; 5] = [
        Self::None,
        Self::All,
        Self::Admin,
        Self::Specified,
        Self::Auto,
    ];

    /// Wire spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::All => "ALL",
            Self::Admin => "ADMIN",
            Self::Specified => "SPECIFIED",
            Self::Auto => "AUTO",
        }
    }
}

impl fmt::Display for StartupControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StartupControl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Self::None),
            "ALL" => Ok(Self::All),
            "ADMIN" => Ok(Self::Admin),
            "SPECIFIED" => Ok(Self::Specified),
            "AUTO" => Ok(Self::Auto),
            other => Err(Error::illegal_startup_control(other)),
        }
    }
}

/// Whether and when a server is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StartPolicy {
    /// Always running.
    Always,
    /// Never started.
    Never,
    /// Started when the cluster needs more replicas.
    IfNeeded,
}

impl StartPolicy {
    /// Wire spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "ALWAYS",
            Self::Never => "NEVER",
            Self::IfNeeded => "IF_NEEDED",
        }
    }
}

impl fmt::Display for StartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_modes() {
        for mode in StartupControl::ALL_MODES {
            assert_eq!(mode.as_str().parse::<StartupControl>().ok(), Some(mode));
        }
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert!(matches!(
            "auto".parse::<StartupControl>(),
            Err(Error::IllegalStartupControl { .. })
        ));
    }

    #[test]
    fn test_default_mode_is_auto() {
        assert_eq!(StartupControl::default(), StartupControl::Auto);
    }

    #[test]
    fn test_start_policy_serializes_screaming_case() {
        let json = serde_json::to_string(&StartPolicy::IfNeeded).ok();
        assert_eq!(json.as_deref(), Some("\"IF_NEEDED\""));
    }
}
