//! CLI error type.

use espat_driver::{DriverError, ErrorCode};
use thiserror::Error;

/// Errors reported by the `espat` tool.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading the config file or talking to the bridge failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid YAML for [`CliConfig`](crate::CliConfig).
    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// The driver could not be built.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A driver operation failed with the latched error.
    #[error("{op} failed: {error}")]
    Operation {
        /// Operation name.
        op: &'static str,
        /// Error latched by the driver.
        error: ErrorCode,
    },

    /// The metrics exporter could not start.
    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;
