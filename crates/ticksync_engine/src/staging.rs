//! Per-run staging for outgoing and incoming change sets.
//!
//! Staging is discarded and recreated at the start of every run, so a run
//! never sees leftovers from an interrupted one.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use ticksync_protocol::{ChangeRecord, SessionId};

#[derive(Debug, Default)]
struct StagingTables {
    generation: u64,
    outgoing: Vec<ChangeRecord>,
    incoming: HashMap<SessionId, Vec<ChangeRecord>>,
}

/// Scratch storage for one sync run.
#[derive(Debug, Default)]
pub struct StagingSchema {
    inner: RwLock<StagingTables>,
}

impl StagingSchema {
    /// Creates empty staging.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything staged and starts a new generation.
    pub fn reset(&self) {
        let mut tables = self.inner.write();
        let generation = tables.generation + 1;
        *tables = StagingTables {
            generation,
            ..StagingTables::default()
        };
    }

    /// Number of resets so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Replaces the staged outgoing set.
    pub fn stage_outgoing(&self, records: Vec<ChangeRecord>) {
        self.inner.write().outgoing = records;
    }

    /// Number of staged outgoing records.
    #[must_use]
    pub fn outgoing_len(&self) -> usize {
        self.inner.read().outgoing.len()
    }

    /// Reads a slice of the staged outgoing set.
    #[must_use]
    pub fn outgoing_page(&self, offset: usize, limit: usize) -> Vec<ChangeRecord> {
        let tables = self.inner.read();
        tables
            .outgoing
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Creates the incoming table for a session, emptying any existing one.
    pub fn create_incoming_table(&self, session_id: &SessionId) {
        self.inner
            .write()
            .incoming
            .insert(session_id.clone(), Vec::new());
    }

    /// Appends pulled records to a session's incoming table.
    ///
    /// # Errors
    ///
    /// Returns `StagingTableMissing` if the table was never created.
    pub fn insert_incoming(&self, session_id: &SessionId, records: Vec<ChangeRecord>) -> SyncResult<()> {
        let mut tables = self.inner.write();
        let table = tables
            .incoming
            .get_mut(session_id)
            .ok_or_else(|| missing(session_id))?;
        table.extend(records);
        Ok(())
    }

    /// Returns a session's incoming records in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `StagingTableMissing` if the table was never created.
    pub fn incoming(&self, session_id: &SessionId) -> SyncResult<Vec<ChangeRecord>> {
        self.inner
            .read()
            .incoming
            .get(session_id)
            .cloned()
            .ok_or_else(|| missing(session_id))
    }

    /// Drops a session's incoming table.
    pub fn drop_incoming_table(&self, session_id: &SessionId) {
        self.inner.write().incoming.remove(session_id);
    }
}

fn missing(session_id: &SessionId) -> SyncError {
    SyncError::StagingTableMissing {
        session_id: session_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticksync_protocol::ChangeDirection;

    fn deletion(id: &str) -> ChangeRecord {
        ChangeRecord::deleted(ChangeDirection::Incoming, "patients", id)
    }

    #[test]
    fn incoming_requires_a_table() {
        let staging = StagingSchema::new();
        let session = SessionId::new("s1");
        assert!(matches!(
            staging.insert_incoming(&session, vec![deletion("a")]),
            Err(SyncError::StagingTableMissing { .. })
        ));

        staging.create_incoming_table(&session);
        staging.insert_incoming(&session, vec![deletion("a")]).unwrap();
        staging.insert_incoming(&session, vec![deletion("b")]).unwrap();
        let ids: Vec<_> = staging
            .incoming(&session)
            .unwrap()
            .into_iter()
            .map(|r| r.record_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        staging.drop_incoming_table(&session);
        assert!(staging.incoming(&session).is_err());
    }

    #[test]
    fn reset_discards_leftovers() {
        let staging = StagingSchema::new();
        let session = SessionId::new("s1");
        staging.stage_outgoing(vec![deletion("a"), deletion("b"), deletion("c")]);
        staging.create_incoming_table(&session);
        assert_eq!(staging.outgoing_page(1, 5).len(), 2);

        staging.reset();
        assert_eq!(staging.generation(), 1);
        assert_eq!(staging.outgoing_len(), 0);
        assert!(staging.incoming(&session).is_err());
    }
}
