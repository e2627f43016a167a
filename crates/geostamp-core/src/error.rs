//! Error types for the geostamp pipeline.
//!
//! Structural misuse of the pipeline API (adding stages too late, starting an
//! empty pipeline) is reported to the caller. Per-unit failures (decode,
//! encode, geocode) are caught and logged inside the stage that hit them and
//! never cross a stage boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for geostamp operations.
#[derive(Error, Debug)]
pub enum GeostampError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Pipeline errors: structural misuse first, then per-unit failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage was added, or start was called, after the pipeline started
    #[error("Pipeline '{0}' has already been started")]
    AlreadyStarted(String),

    /// Start was called on a pipeline without stages
    #[error("Pipeline '{0}' has no stages")]
    NoStages(String),

    /// Two stages in one pipeline share a name
    #[error("Pipeline already has a stage named '{0}'")]
    DuplicateStage(String),

    /// A stage failed to initialize during start
    #[error("Stage '{stage}' failed to initialize: {message}")]
    StageInit { stage: String, message: String },

    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Image encoding or writing failed
    #[error("Encode error for {path}: {message}")]
    Encode { path: PathBuf, message: String },

    /// Reverse-geocode lookup failed
    #[error("Geocode error: {message}")]
    Geocode {
        message: String,
        status_code: Option<u16>,
    },

    /// Operation timed out
    #[error("Timeout in {stage} after {timeout_ms}ms")]
    Timeout { stage: String, timeout_ms: u64 },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Convenience type alias for geostamp results.
pub type Result<T> = std::result::Result<T, GeostampError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
