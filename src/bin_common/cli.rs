//! CLI utilities for binaries
//!
//! Handles configuration path resolution and command line arguments
//! for the binary executables.

use std::path::PathBuf;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Probe configuration (config/realtime.yaml)
    Probe,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Probe => "config/realtime.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable name for this config type
    pub fn env_var_name(&self) -> &str {
        match self {
            ConfigType::Probe => "REALTIME_CONFIG_PATH",
            ConfigType::Custom(_) => "REALTIME_CONFIG_PATH",
        }
    }
}

/// Load configuration path from environment or use default
///
/// A `Custom` path always wins over the environment.
///
/// # Examples
/// ```
/// use collab_realtime::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Custom("probe.yaml".into()));
/// assert_eq!(path.to_str(), Some("probe.yaml"));
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    if let ConfigType::Custom(path) = &config_type {
        return PathBuf::from(path);
    }
    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}
