//! Utility functions

use serde::{Deserialize, Serialize};

/// Version information for the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Split a tool option string on whitespace, dropping empty pieces.
///
/// Board descriptors carry flasher options and the flash sub-command as one
/// space-separated string; the spawned process wants them as separate
/// arguments.
pub fn split_opts(options: &str) -> Vec<String> {
    options.split_whitespace().map(str::to_string).collect()
}
