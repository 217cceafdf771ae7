//! Collaboration Realtime Client - Main Library
//!
//! Thin application layer over the `realtime-channel` workspace library.
//!
//! ## Architecture
//!
//! - **realtime_channel**: Resilient channel client (re-exported from workspace)
//! - **config**: YAML + environment configuration for binaries
//! - **bin_common**: Common utilities for binary executables (CLI, logging)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use collab_realtime::bin_common::{load_config_from_env, ConfigType};
//! use collab_realtime::config::ProbeConfig;
//! ```

// Re-export workspace libraries for convenience
pub use realtime_channel;

pub mod config;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod logging;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use logging::init_tracing_with_level;
}
