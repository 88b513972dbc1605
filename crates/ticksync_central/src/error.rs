//! Error types for the central node.

use thiserror::Error;
use ticksync_protocol::ProtocolError;

/// Result type for central operations.
pub type CentralResult<T> = Result<T, CentralError>;

/// Errors that can occur in the central node.
#[derive(Error, Debug)]
pub enum CentralError {
    /// Invalid request format or content.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The session id was never issued.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// The session was already ended or marked errored.
    #[error("session {session_id} is {status}")]
    SessionNotActive {
        /// Session.
        session_id: String,
        /// Current status.
        status: String,
    },

    /// A pull page was requested before `initiate_pull`.
    #[error("pull was not initiated for session {0}")]
    PullNotInitiated(String),

    /// Protocol version mismatch.
    #[error("protocol version mismatch: {0}")]
    ProtocolMismatch(String),

    /// Request or response body could not be (de)serialized.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// No handler for the path.
    #[error("no such endpoint: {0}")]
    NotFound(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CentralError {
    /// Returns true if the caller is at fault (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CentralError::InvalidRequest(_)
                | CentralError::UnknownSession(_)
                | CentralError::SessionNotActive { .. }
                | CentralError::PullNotInitiated(_)
                | CentralError::ProtocolMismatch(_)
                | CentralError::Codec(_)
                | CentralError::NotFound(_)
        )
    }

    /// Returns true if the central node is at fault (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, CentralError::Internal(_))
    }
}
