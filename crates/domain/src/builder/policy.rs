//! Start-policy decision tables.

use crate::startup::{StartPolicy, StartupControl};

/// Start policy of a server outside any cluster.
pub const fn non_clustered_start_policy(
    control: StartupControl,
    is_admin_server: bool,
    has_server_startup: bool,
) -> StartPolicy {
    match control {
        StartupControl::None => StartPolicy::Never,
        StartupControl::All => StartPolicy::Always,
        StartupControl::Admin if is_admin_server => StartPolicy::Always,
        StartupControl::Admin => StartPolicy::Never,
        StartupControl::Specified | StartupControl::Auto
            if is_admin_server || has_server_startup =>
        {
            StartPolicy::Always
        }
        StartupControl::Specified | StartupControl::Auto => StartPolicy::Never,
    }
}

/// Start policy of a server inside a cluster.
pub const fn clustered_start_policy(
    control: StartupControl,
    is_admin_server: bool,
    has_cluster_startup: bool,
    has_server_startup: bool,
) -> StartPolicy {
    match control {
        StartupControl::None => StartPolicy::Never,
        StartupControl::All => StartPolicy::Always,
        StartupControl::Admin if is_admin_server => StartPolicy::Always,
        StartupControl::Admin => StartPolicy::Never,
        StartupControl::Specified | StartupControl::Auto
            if is_admin_server || has_server_startup =>
        {
            StartPolicy::Always
        }
        StartupControl::Specified if has_cluster_startup => StartPolicy::IfNeeded,
        StartupControl::Specified => StartPolicy::Never,
        StartupControl::Auto => StartPolicy::IfNeeded,
    }
}
