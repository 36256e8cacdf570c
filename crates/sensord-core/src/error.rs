//! Error types for sensord.
//!
//! Per-request failures (unknown category, provider faults) are recovered
//! inside the session loop and never surface here to callers; the variants
//! below that reach a caller are the startup/lifecycle and client-side ones.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sensord.
#[derive(Debug, Error)]
pub enum SensordError {
    // Transport errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to bind {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(std::time::Duration),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Wire validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Telemetry errors
    #[error("Unknown telemetry category: {name}")]
    UnknownCategory { name: String },

    #[error("Telemetry provider failure: {message}")]
    Provider { message: String },

    // Lifecycle errors
    #[error("Server is already running")]
    AlreadyRunning,
}

/// Result type alias for sensord operations.
pub type Result<T> = std::result::Result<T, SensordError>;

// Conversion implementations for common error types

impl From<std::io::Error> for SensordError {
    fn from(err: std::io::Error) -> Self {
        SensordError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SensordError {
    fn from(err: serde_json::Error) -> Self {
        SensordError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SensordError {
    /// Create a provider failure with a free-form description.
    pub fn provider(message: impl Into<String>) -> Self {
        SensordError::Provider {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_category_display_names_the_token() {
        let err = SensordError::UnknownCategory {
            name: "disk".into(),
        };
        assert!(err.to_string().contains("disk"));
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        let err: SensordError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone").into();
        match err {
            SensordError::Io { source, .. } => assert!(source.is_some()),
            other => panic!("Expected Io, got: {:?}", other),
        }
    }
}
