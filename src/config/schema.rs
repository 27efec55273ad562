//! Configuration schema for Boxer
//!
//! Configuration is stored at `~/.config/boxer/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build behaviour
    pub build: BuildConfig,

    /// Cache store settings
    pub cache: CacheConfig,

    /// Container runtime settings
    pub runtime: RuntimeConfig,
}

/// Build settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Skip cache lookups, forcing every step to execute
    pub no_cache: bool,

    /// Keep recording cache entries while `no_cache` is set
    pub write_cache_when_disabled: bool,

    /// Deadline for a single in-container command in seconds (0 = none)
    pub step_timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            no_cache: false,
            write_cache_when_disabled: true,
            step_timeout_secs: 0,
        }
    }
}

/// Cache store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache file location (defaults to the user cache directory)
    pub path: Option<PathBuf>,
}

/// Container runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime CLI to drive ("podman" or "docker")
    pub binary: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: "podman".to_string(),
        }
    }
}
