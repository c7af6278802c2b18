//! Error types for the core crate
//!
//! This module provides a consolidated error type for the core crate,
//! covering query compilation, challenge construction and session handling.

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum OrbisError {
    /// Missing or unusable configuration (table, model, resources, nodes)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input that does not match the expected shape or schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// Query compilation error
    #[error("Query compilation error: {0}")]
    Compile(String),

    /// Invalid, expired or mismatched session
    #[error("Session error: {0}")]
    Session(String),

    /// Chain that is not supported for the requested operation
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 decoding error
    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Hex decoding error
    #[error("Hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrbisError {
    /// Whether this error invalidates the currently held session
    pub fn is_session_error(&self) -> bool {
        matches!(self, OrbisError::Session(_))
    }
}

/// Result type for the core crate
pub type Result<T> = std::result::Result<T, OrbisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: OrbisError = json_err.into();
        match err {
            OrbisError::Json(_) => {}
            _ => panic!("Expected Json variant"),
        }

        let hex_err = hex::decode("zz").unwrap_err();
        let err: OrbisError = hex_err.into();
        assert!(matches!(err, OrbisError::Hex(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "orbis.json");
        let err: OrbisError = io_err.into();
        assert!(matches!(err, OrbisError::Io(_)));
    }

    #[test]
    fn test_error_display() {
        let err = OrbisError::Compile("Invalid aggregate function MAX".to_string());
        assert_eq!(err.to_string(), "Query compilation error: Invalid aggregate function MAX");

        let err = OrbisError::Configuration("Missing table".to_string());
        assert_eq!(err.to_string(), "Configuration error: Missing table");

        assert!(OrbisError::Session("x".into()).is_session_error());
        assert!(!OrbisError::Validation("x".into()).is_session_error());
    }
}
