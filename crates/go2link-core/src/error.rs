//! Error types for go2link core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    /// Envelope could not be serialized
    #[error("encode error: {0}")]
    EncodeError(String),

    /// Frame is not a valid envelope
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Frame contains no bytes
    #[error("empty frame")]
    EmptyFrame,
}

