//! Configuration Error Types
//!
//! Errors raised while loading settings or the worker fleet. All of them are
//! fatal and are reported before the first batch runs.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// The fleet has no workers to schedule
    #[error("Worker fleet is empty")]
    EmptyFleet,

    /// The same identity appears more than once
    #[error("Duplicate worker identity '{identity}' (first seen at entry {first}, again at entry {second})")]
    DuplicateWorker {
        identity: String,
        first: usize,
        second: usize,
    },

    /// A worker record could not be parsed
    #[error("Invalid worker record at line {line}: {reason}")]
    InvalidWorkerRecord { line: usize, reason: String },

    /// An egress endpoint could not be parsed or is unsupported
    #[error("Invalid egress endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// File I/O errors during configuration loading
    #[error("Failed to read configuration file '{file_path}': {error}")]
    FileReadError { file_path: String, error: String },

    /// Parse errors for configuration or worker files
    #[error("Parse error for file {file_path}: {reason}")]
    ParseError { file_path: String, reason: String },

    /// Layered configuration sources could not be merged
    #[error("Failed to load layered configuration: {error}")]
    SourceError { error: String },

    /// Configuration file not found at the requested location
    #[error("Configuration file not found: {path:?}")]
    ConfigFileNotFound { path: PathBuf },
}

impl ConfigurationError {
    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }

    /// Create an invalid worker record error
    pub fn invalid_record(line: usize, reason: impl Into<String>) -> Self {
        Self::InvalidWorkerRecord {
            line,
            reason: reason.into(),
        }
    }

    /// Create a file read error
    pub fn file_read_error<P: Into<String>, E: std::fmt::Display>(file_path: P, error: E) -> Self {
        Self::FileReadError {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }

    /// Create a parse error
    pub fn parse_error<P: Into<String>, E: std::fmt::Display>(file_path: P, reason: E) -> Self {
        Self::ParseError {
            file_path: file_path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        Self::SourceError {
            error: error.to_string(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_field() {
        let err = ConfigurationError::invalid_value("batch_size", 0, "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "Invalid value '0' for field 'batch_size': must be greater than zero"
        );

        let err = ConfigurationError::invalid_record(4, "missing egress endpoint");
        assert!(err.to_string().contains("line 4"));
    }
}
