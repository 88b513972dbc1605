//! Error types for the sync engine.

use std::fmt;
use thiserror::Error;
use ticksync_protocol::ProtocolError;
use ticksync_store::{StoreError, Tick};

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Broad failure class, used for logging and operator reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid or disabled configuration. Raised before any network or
    /// transaction work.
    Configuration,
    /// Calling the central node failed.
    Transport,
    /// Local rows changed after the push snapshot would be overwritten.
    Conflict,
    /// Local storage failed.
    Storage,
    /// A message from central was malformed.
    Protocol,
    /// The engine could not run at all.
    Internal,
}

impl ErrorCategory {
    /// Returns a stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Transport => "transport",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Storage => "storage",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local row that changed after the push snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictingRecord {
    /// Entity type.
    pub record_type: String,
    /// Primary key.
    pub record_id: String,
    /// Tick of the local row.
    pub local_tick: Tick,
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Sync is switched off.
    #[error("sync is disabled by configuration")]
    Disabled,

    /// A configuration value is out of range.
    #[error("invalid sync configuration: {message}")]
    InvalidConfig {
        /// What is wrong.
        message: String,
    },

    /// A model declares a sync direction that cannot be used here.
    #[error("model {record_type} has unsupported sync direction {direction:?}")]
    InvalidSyncDirection {
        /// Entity type.
        record_type: String,
        /// The offending direction.
        direction: String,
    },

    /// A model depends on an entity type that is not registered.
    #[error("model {record_type} depends on unknown model {depends_on}")]
    UnknownDependency {
        /// Entity type.
        record_type: String,
        /// The missing dependency.
        depends_on: String,
    },

    /// A model was registered twice.
    #[error("model {record_type} is registered more than once")]
    DuplicateModel {
        /// Entity type.
        record_type: String,
    },

    /// The dependency graph has a cycle.
    #[error("model dependency cycle among {record_types:?}")]
    DependencyCycle {
        /// Models that could not be ordered.
        record_types: Vec<String>,
    },

    /// A model manifest could not be parsed.
    #[error("invalid model manifest: {message}")]
    Manifest {
        /// Parser message.
        message: String,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the next scheduled run may succeed.
        retryable: bool,
    },

    /// Central rejected the request.
    #[error("central error: {0}")]
    ServerError(String),

    /// Wire message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An incoming record is internally inconsistent.
    #[error("malformed incoming record {record_type}/{record_id}: {reason}")]
    MalformedRecord {
        /// Entity type.
        record_type: String,
        /// Primary key.
        record_id: String,
        /// What is wrong.
        reason: String,
    },

    /// Pulled records would overwrite rows changed after the push snapshot.
    #[error(
        "{} pulled record(s) were updated locally after the push snapshot at tick {snapshot_tick}",
        records.len()
    )]
    UpdatedAfterPushSnapshot {
        /// Tick the push snapshot was taken at.
        snapshot_tick: Tick,
        /// Offending rows.
        records: Vec<ConflictingRecord>,
    },

    /// Local storage error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Staging was used before its table was created.
    #[error("no staging table for session {session_id}")]
    StagingTableMissing {
        /// Session the table belongs to.
        session_id: String,
    },

    /// The background worker could not be started.
    #[error("failed to start sync worker: {0}")]
    Worker(#[from] std::io::Error),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns the failure class.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Disabled
            | SyncError::InvalidConfig { .. }
            | SyncError::InvalidSyncDirection { .. }
            | SyncError::UnknownDependency { .. }
            | SyncError::DuplicateModel { .. }
            | SyncError::DependencyCycle { .. }
            | SyncError::Manifest { .. } => ErrorCategory::Configuration,
            SyncError::Transport { .. } | SyncError::ServerError(_) => ErrorCategory::Transport,
            SyncError::Protocol(_) | SyncError::MalformedRecord { .. } => ErrorCategory::Protocol,
            SyncError::UpdatedAfterPushSnapshot { .. } => ErrorCategory::Conflict,
            SyncError::Store(_) | SyncError::StagingTableMissing { .. } => ErrorCategory::Storage,
            SyncError::Worker(_) => ErrorCategory::Internal,
        }
    }

    /// Returns true if a later run may succeed without intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::ServerError(_) | SyncError::UpdatedAfterPushSnapshot { .. } => true,
            _ => false,
        }
    }
}
