//! Error types for the source receiver

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised at the media-source boundary.
///
/// These are never thrown across the node boundary: the connection manager
/// stores them and the host polls them through the node status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The media library is unusable. Permanent for the node's lifetime.
    #[error("Could not initialize the media library: {0}")]
    Initialization(String),

    /// The named source was found but binding to it failed.
    #[error("Could not connect to {0}.")]
    ConnectionFailed(String),

    /// Reserved for collaborators with hard format limits (video resolution).
    #[error("Unsupported format: {0}")]
    FormatUnsupported(String),

    /// A fault raised while evaluating a cycle, converted into local state.
    #[error("An error occurred with the media source: {0}")]
    Runtime(String),

    #[error("Failed to spawn capture thread: {0}")]
    ThreadSpawn(String),
}

impl SourceError {
    /// Permanent errors keep the node non-functional.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SourceError::Initialization(_))
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
