//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A message could not be encoded.
    #[error("failed to encode message: {message}")]
    Encode {
        /// Underlying encoder message.
        message: String,
    },

    /// A message could not be decoded.
    #[error("failed to decode message: {message}")]
    Decode {
        /// Underlying decoder message.
        message: String,
    },
}
