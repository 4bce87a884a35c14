//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        /// Path of the file that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A height parameter is out of order with a height it must not precede
    #[error("Invalid height ordering: {earlier} must not be above {later}")]
    InvalidHeightOrdering {
        /// Name of the parameter that must come first
        earlier: &'static str,
        /// Name of the parameter that must not precede it
        later: &'static str,
    },

    /// A bound parameter that must be positive is zero
    #[error("Invalid bound: {0} must be positive")]
    InvalidBound(&'static str),

    /// An amount parameter that must not be negative is negative
    #[error("Invalid amount: {0} must not be negative")]
    InvalidAmount(&'static str),
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
