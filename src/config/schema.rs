//! Configuration schema for cairn
//!
//! Configuration is stored at `~/.config/cairn/config.toml`

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Container engine settings
    pub engine: EngineConfig,

    /// Build session settings
    pub build: BuildConfig,

    /// Export container settings
    pub exports: ExportsConfig,

    /// Registry credentials
    pub registry: RegistryConfig,
}

impl Config {
    /// Reject values that parse but cannot be used
    pub fn validate(&self) -> Result<(), String> {
        if self.build.probe_timeout_secs == 0 {
            return Err("build.probe_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Container engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine CLI binary ("docker" or "podman")
    pub binary: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }
}

/// Build session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Reuse existing layers when their configuration matches
    pub utilize_cache: bool,

    /// Ceiling for a whole cache probe, in seconds
    pub probe_timeout_secs: u64,

    /// Prefix for session-private files written into the build context
    pub tmp_prefix: String,
}

impl BuildConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            utilize_cache: true,
            probe_timeout_secs: 10,
            tmp_prefix: ".cairn_tmp".to_string(),
        }
    }
}

/// Export container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportsConfig {
    /// Data transfer image used by the export container
    pub rsync_image: String,

    /// Volume exposing the rsync binaries
    pub rsync_volume: String,

    /// Volume collecting exported artifacts
    pub exports_volume: String,
}

impl Default for ExportsConfig {
    fn default() -> Self {
        Self {
            rsync_image: "grammarly/rsync-static:1".to_string(),
            rsync_volume: "/opt/rsync/bin".to_string(),
            exports_volume: "/.cairn_exports".to_string(),
        }
    }
}

/// Registry credentials forwarded to build, pull and push
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub server_address: Option<String>,
}
