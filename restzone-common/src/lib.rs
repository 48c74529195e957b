//! Restzone Common - shared plumbing for the rest-zone scanner services.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.restzone/config.json` + env overrides)
//! - The unified error type and a context extension trait
//! - Logging setup with noise filtering
//! - Small filesystem helpers shared by the storage and archive layers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;

pub use config::{
    Config, DetectorConfig, ObservabilityConfig, ProviderConfig, ScanConfig, StorageConfig,
};
pub use error::{Error, Result};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, DetectorConfig, ScanConfig};
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::logging::init_logging;
}
