//! Protocol messages for the central RPC surface.
//!
//! Every call after `startSyncSession` carries the session id as its
//! correlation token.

use crate::change::ChangeRecord;
use crate::codec::WireMessage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Central-issued identifier of one sync attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a session id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request to open a sync session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSessionRequest {
    /// Requesting node.
    pub device_id: String,
    /// Protocol version spoken by the node.
    pub protocol_version: u16,
}

/// Why central did not open a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueStatus {
    /// Too many sessions are open; try again later.
    WaitingInQueue,
    /// This device already has a session in progress.
    ActiveSync,
}

/// Answer to [`StartSessionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StartSessionResponse {
    /// A session was opened.
    Started {
        /// Correlation token for the rest of the run.
        session_id: SessionId,
        /// Central tick when the session started.
        started_at_tick: i64,
    },
    /// No session was opened.
    Queued {
        /// Reason.
        status: QueueStatus,
    },
}

/// Request to prepare the incoming change set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiatePullRequest {
    /// Session.
    pub session_id: SessionId,
    /// Facility's last fully applied central tick.
    pub since: i64,
}

/// Size and upper bound of a prepared pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullMetadata {
    /// Number of records to pull.
    pub total_to_pull: u64,
    /// Central tick the pull covers up to.
    pub pull_until: i64,
}

/// Request for one page of incoming changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Session.
    pub session_id: SessionId,
    /// Index of the first record of the page.
    pub offset: u64,
    /// Maximum records in the page.
    pub limit: u32,
}

/// One page of incoming changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Records, empty once the pull is exhausted.
    pub records: Vec<ChangeRecord>,
}

/// One batch of outgoing changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Session.
    pub session_id: SessionId,
    /// Records.
    pub records: Vec<ChangeRecord>,
}

/// Acknowledgement of a push batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAck {
    /// Records accepted from the batch.
    pub accepted: u64,
}

/// A request that only names a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Session.
    pub session_id: SessionId,
}

/// Report that the facility abandoned a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkErroredRequest {
    /// Session.
    pub session_id: SessionId,
    /// Failure description.
    pub message: String,
}

/// Empty acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ack {}

impl WireMessage for StartSessionRequest {}
impl WireMessage for StartSessionResponse {}
impl WireMessage for InitiatePullRequest {}
impl WireMessage for PullMetadata {}
impl WireMessage for PullRequest {}
impl WireMessage for PullResponse {}
impl WireMessage for PushRequest {}
impl WireMessage for PushAck {}
impl WireMessage for SessionRequest {}
impl WireMessage for MarkErroredRequest {}
impl WireMessage for Ack {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{ChangeDirection, ChangelogOperation, ChangelogRecord};
    use serde_json::json;

    #[test]
    fn start_session_variants_roundtrip() {
        let started = StartSessionResponse::Started {
            session_id: SessionId::new("s-1"),
            started_at_tick: 13,
        };
        assert_eq!(
            StartSessionResponse::decode(&started.encode().unwrap()).unwrap(),
            started
        );

        let queued = StartSessionResponse::Queued {
            status: QueueStatus::WaitingInQueue,
        };
        assert_eq!(
            StartSessionResponse::decode(&queued.encode().unwrap()).unwrap(),
            queued
        );
    }

    #[test]
    fn push_request_carries_changelog() {
        let data = json!({"id": "r1", "code": "X", "count": 3})
            .as_object()
            .cloned()
            .unwrap();
        let mut record =
            ChangeRecord::upsert(ChangeDirection::Outgoing, "reference_data", "r1", data.clone());
        record.changelog_records.push(ChangelogRecord {
            id: "log-1".into(),
            table_name: "reference_data".into(),
            record_id: "r1".into(),
            tick: 4,
            operation: ChangelogOperation::Insert,
            data,
        });
        let request = PushRequest {
            session_id: SessionId::new("s-1"),
            records: vec![
                record,
                ChangeRecord::deleted(ChangeDirection::Outgoing, "reference_data", "r2"),
            ],
        };

        let decoded = PushRequest::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn session_id_is_transparent_on_the_wire() {
        let value = serde_json::to_value(SessionRequest {
            session_id: SessionId::new("abc"),
        })
        .unwrap();
        assert_eq!(value, json!({"session_id": "abc"}));
    }
}
