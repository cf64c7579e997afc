//! Error types and handling for Triton
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.
//!
//! Note that the VE.Bus protocol path itself does not propagate errors:
//! request-level failures surface as [`crate::vebus::RequestStatus`] values
//! and exhausted retries, never as `Err`.

use thiserror::Error;

/// Result type alias for Triton operations
pub type Result<T> = std::result::Result<T, TritonError>;

/// Main error type for Triton
#[derive(Debug, Error)]
pub enum TritonError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serial port errors
    #[error("Serial error: {message}")]
    Serial { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl TritonError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        TritonError::Config {
            message: message.into(),
        }
    }

    /// Create a new serial error
    pub fn serial<S: Into<String>>(message: S) -> Self {
        TritonError::Serial {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        TritonError::Io {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        TritonError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        TritonError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for TritonError {
    fn from(err: std::io::Error) -> Self {
        TritonError::io(err.to_string())
    }
}

impl From<serialport::Error> for TritonError {
    fn from(err: serialport::Error) -> Self {
        TritonError::serial(err.to_string())
    }
}

impl From<serde_yaml::Error> for TritonError {
    fn from(err: serde_yaml::Error) -> Self {
        TritonError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TritonError {
    fn from(err: serde_json::Error) -> Self {
        TritonError::Serialization {
            message: err.to_string(),
        }
    }
}
