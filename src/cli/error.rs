//! CLI error types and conversions

use crate::config::ConfigError;
use crate::logging::ExportError;
use crate::metrics::MetricsError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Session configuration rejected
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Log export failed
    #[error("export error: {0}")]
    ExportError(#[from] ExportError),

    /// Metrics exporter could not start
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Writing output failed
    #[error("I/O error: {0}")]
    IoError(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
