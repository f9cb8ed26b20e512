//! Error types for the exporter process.

use std::path::PathBuf;

/// Configuration loading and validation errors.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("no config file found, tried: {}", .0.join(", "))]
    NotFound(Vec<String>),

    #[error("error reading config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// All errors that can stop the exporter.
#[derive(thiserror::Error, Debug)]
pub enum ExporterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("pipeline setup failed: {0}")]
    Build(#[from] supla_core::BuildError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

pub type ExporterResult<T> = Result<T, ExporterError>;
