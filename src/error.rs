//! Error types for httptap

use std::io;
use thiserror::Error;

/// Result type for httptap operations
pub type Result<T> = std::result::Result<T, TapError>;

/// Errors that can occur while capturing traffic
#[derive(Debug, Error)]
pub enum TapError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request could not be constructed (bad method, URI, or header)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The underlying transport failed; surfaced to the caller unchanged
    #[error("Transport error: {0}")]
    Transport(String),

    /// A body write carried a text encoding that did not decode
    #[error("Invalid {encoding} payload: {reason}")]
    Decode {
        /// Name of the encoding that failed to decode
        encoding: &'static str,
        /// Decoder error message
        reason: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
