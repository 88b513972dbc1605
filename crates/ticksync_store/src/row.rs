//! Row model for synced tables.

use crate::types::Tick;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column values of a row, keyed by field name.
pub type Fields = serde_json::Map<String, Value>;

/// A committed row version as seen by a transaction.
///
/// `data` holds the user-visible columns (including `id`). The tick stamp
/// and the soft-delete flag are bookkeeping kept outside `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Primary key.
    pub id: String,
    /// Column values.
    pub data: Fields,
    /// Tick the row was last written at.
    pub tick: Tick,
    /// Soft-delete flag.
    pub is_deleted: bool,
}

impl Row {
    /// Returns a single column value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// How a pending write gets its tick stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStamp {
    /// Stamp with the `currentTick` fact as of commit.
    AtCommit,
    /// Stamp with a fixed tick.
    Fixed(Tick),
}

/// A row write with explicit control over stamping and deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct RowWrite {
    /// Primary key.
    pub id: String,
    /// New column values. `None` keeps the existing values.
    pub data: Option<Fields>,
    /// Soft-delete flag after the write.
    pub is_deleted: bool,
    /// Tick stamp policy.
    pub stamp: TickStamp,
}

impl RowWrite {
    /// An upsert stamped at commit.
    #[must_use]
    pub fn upsert(id: impl Into<String>, data: Fields) -> Self {
        Self {
            id: id.into(),
            data: Some(data),
            is_deleted: false,
            stamp: TickStamp::AtCommit,
        }
    }

    /// A soft delete stamped at commit, keeping the current column values.
    #[must_use]
    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: None,
            is_deleted: true,
            stamp: TickStamp::AtCommit,
        }
    }

    /// Overrides the stamp policy.
    #[must_use]
    pub fn stamped(mut self, stamp: TickStamp) -> Self {
        self.stamp = stamp;
        self
    }
}
