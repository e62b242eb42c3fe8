//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use thiserror::Error;

/// Errors that abort decoding of a single uploaded file
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to parse labels: {0}")]
    InvalidLabels(String),

    #[error("failed to decompress profile: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("invalid profile data: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("failed to read archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("invalid dump format: {0}")]
    InvalidFormat(String),
}

/// Errors raised while parsing or validating a filter query
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("only one search term is supported, found '{0}' and '{1}'")]
    MultipleTerms(String, String),

    #[error("invalid wait constraint '{0}'")]
    InvalidWait(String),

    #[error("conflicting wait constraints: {0}")]
    ConflictingWait(String),

    #[error("empty value for '{0}'")]
    EmptyValue(String),
}

/// Errors that can occur while loading settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid pattern in settings: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}
