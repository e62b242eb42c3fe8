//! Utility modules for configuration, settings and error handling.

pub mod config;
pub mod error;
pub mod settings;

// Re-export commonly used error types for convenience
pub use error::{DecodeError, OutputError, QueryError, SettingsError};
pub use settings::{load_settings, NameExtractionRule, Settings};
