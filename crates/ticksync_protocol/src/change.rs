//! Change records.

use serde::{Deserialize, Serialize};

/// Column values of a replicated row.
pub type RecordData = serde_json::Map<String, serde_json::Value>;

/// Which way a change travels relative to the facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeDirection {
    /// Facility to central.
    Outgoing,
    /// Central to facility.
    Incoming,
}

/// Kind of mutation a changelog record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangelogOperation {
    /// Row created.
    Insert,
    /// Row changed.
    Update,
    /// Row soft-deleted.
    Delete,
    /// Row restored after soft delete.
    Restore,
}

/// Provenance attached to an outgoing change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogRecord {
    /// Changelog entry id.
    pub id: String,
    /// Table of the row.
    pub table_name: String,
    /// Primary key of the row.
    pub record_id: String,
    /// Tick the mutation was stamped with on the facility.
    pub tick: i64,
    /// Kind of mutation.
    pub operation: ChangelogOperation,
    /// Column values after the mutation.
    pub data: RecordData,
}

/// One row-level change.
///
/// `data` never contains the tick stamp or the deleted flag, and is `None`
/// whenever `is_deleted` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// Direction of travel.
    pub direction: ChangeDirection,
    /// Entity type (table name).
    pub record_type: String,
    /// Primary key.
    pub record_id: String,
    /// Whether the row is soft-deleted.
    pub is_deleted: bool,
    /// Column values, absent for deletions.
    pub data: Option<RecordData>,
    /// Changelog entries for this row, outgoing only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changelog_records: Vec<ChangelogRecord>,
}

impl ChangeRecord {
    /// Creates a live-row change.
    #[must_use]
    pub fn upsert(
        direction: ChangeDirection,
        record_type: impl Into<String>,
        record_id: impl Into<String>,
        data: RecordData,
    ) -> Self {
        Self {
            direction,
            record_type: record_type.into(),
            record_id: record_id.into(),
            is_deleted: false,
            data: Some(data),
            changelog_records: Vec::new(),
        }
    }

    /// Creates a deletion.
    #[must_use]
    pub fn deleted(
        direction: ChangeDirection,
        record_type: impl Into<String>,
        record_id: impl Into<String>,
    ) -> Self {
        Self {
            direction,
            record_type: record_type.into(),
            record_id: record_id.into(),
            is_deleted: true,
            data: None,
            changelog_records: Vec::new(),
        }
    }

    /// Returns the same change travelling the other way.
    #[must_use]
    pub fn with_direction(mut self, direction: ChangeDirection) -> Self {
        self.direction = direction;
        self
    }
}
