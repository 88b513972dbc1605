//! Changelog entries written by the commit path.

use crate::row::Fields;
use crate::types::Tick;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    /// Row did not exist before.
    Insert,
    /// Live row changed.
    Update,
    /// Row was soft-deleted.
    Delete,
    /// Soft-deleted row became live again.
    Restore,
}

/// An append-only record of one committed row mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier.
    pub id: Uuid,
    /// Table the row belongs to.
    pub table_name: String,
    /// Primary key of the row.
    pub record_id: String,
    /// Tick the row was stamped with by this mutation.
    pub tick: Tick,
    /// Kind of mutation.
    pub operation: AuditOperation,
    /// Soft-delete flag after the mutation.
    pub is_deleted: bool,
    /// Column values after the mutation.
    pub data: Fields,
}

/// An entry recorded inside an open transaction, completed at commit.
#[derive(Debug, Clone)]
pub(crate) struct PendingAudit {
    pub table_name: String,
    pub record_id: String,
    pub operation: AuditOperation,
    pub is_deleted: bool,
    pub data: Fields,
    pub fixed_tick: Option<Tick>,
}

impl PendingAudit {
    pub(crate) fn complete(self, commit_tick: Tick) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            table_name: self.table_name,
            record_id: self.record_id,
            tick: self.fixed_tick.unwrap_or(commit_tick),
            operation: self.operation,
            is_deleted: self.is_deleted,
            data: self.data,
        }
    }
}

/// Classifies a write given the row state before it.
pub(crate) fn classify(previous_deleted: Option<bool>, is_deleted: bool) -> AuditOperation {
    match (previous_deleted, is_deleted) {
        (None, _) => AuditOperation::Insert,
        (Some(_), true) => AuditOperation::Delete,
        (Some(true), false) => AuditOperation::Restore,
        (Some(false), false) => AuditOperation::Update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_transitions() {
        assert_eq!(classify(None, false), AuditOperation::Insert);
        assert_eq!(classify(Some(false), false), AuditOperation::Update);
        assert_eq!(classify(Some(false), true), AuditOperation::Delete);
        assert_eq!(classify(Some(true), false), AuditOperation::Restore);
    }

    #[test]
    fn fixed_tick_wins_over_commit_tick() {
        let pending = PendingAudit {
            table_name: "reference_data".into(),
            record_id: "r1".into(),
            operation: AuditOperation::Insert,
            is_deleted: false,
            data: Fields::new(),
            fixed_tick: Some(Tick::new(3)),
        };
        assert_eq!(pending.complete(Tick::new(9)).tick, Tick::new(3));
    }
}
