//! Error types for the client crate

use orbis_core::OrbisError;
use serde_json::Value;
use thiserror::Error;

/// Client error type
#[derive(Error, Debug)]
pub enum ClientError {
    /// Error raised by the core crate
    #[error(transparent)]
    Core(#[from] OrbisError),

    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The node answered with a failure status
    #[error("Node error ({status}): {message}")]
    Node {
        /// HTTP or envelope status
        status: u16,
        /// Error message returned by the node
        message: String,
    },

    /// Wallet provider failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// Document store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Failure while running a query, with the attempted query
    #[error("Query {query} failed: {source}")]
    Query {
        /// JSON query that was sent
        query: Value,
        /// Underlying failure
        source: Box<ClientError>,
    },

    /// The operation requires an authenticated session
    #[error("No active session: {0}")]
    NoSession(String),
}

impl ClientError {
    /// Whether this error invalidated the held session
    pub fn is_session_error(&self) -> bool {
        match self {
            ClientError::Core(err) => err.is_session_error(),
            ClientError::Query { source, .. } => source.is_session_error(),
            _ => false,
        }
    }
}

/// Result type for the client crate
pub type Result<T> = std::result::Result<T, ClientError>;
