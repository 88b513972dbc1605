//! Snapshot read transactions.

use crate::audit::AuditEntry;
use crate::error::{StoreError, StoreResult};
use crate::row::Row;
use crate::store::Store;
use crate::types::{SequenceNumber, Tick, TransactionId};

/// A read-only view of the store as of the moment the transaction began.
///
/// Commits that finish after `begin_read()` returned are invisible, even
/// if the writing transaction started earlier. Commits that finished
/// before are visible.
pub struct ReadTransaction<'a> {
    store: &'a Store,
    id: TransactionId,
    snapshot: SequenceNumber,
}

impl<'a> ReadTransaction<'a> {
    pub(crate) fn new(store: &'a Store, id: TransactionId, snapshot: SequenceNumber) -> Self {
        Self {
            store,
            id,
            snapshot,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the snapshot sequence number.
    #[must_use]
    pub fn snapshot(&self) -> SequenceNumber {
        self.snapshot
    }

    /// Reads a row by primary key, including soft-deleted rows.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist at this snapshot.
    pub fn get(&self, table: &str, id: &str) -> StoreResult<Option<Row>> {
        let state = self.store.state().read();
        let rows = state
            .table(table)
            .ok_or_else(|| StoreError::table_not_found(table))?;
        Ok(rows.get_at(id, self.snapshot).cloned())
    }

    /// Reads one page of rows whose tick is strictly greater than `since`.
    ///
    /// Rows come back in primary-key order, starting after `after`. A page
    /// shorter than `limit` is the last one.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    pub fn changed_since(
        &self,
        table: &str,
        since: Tick,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<Row>> {
        let state = self.store.state().read();
        let rows = state
            .table(table)
            .ok_or_else(|| StoreError::table_not_found(table))?;
        Ok(rows.page_at(self.snapshot, Some(since), after, limit))
    }

    /// Reads one page of all rows, in primary-key order.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    pub fn scan(&self, table: &str, after: Option<&str>, limit: usize) -> StoreResult<Vec<Row>> {
        let state = self.store.state().read();
        let rows = state
            .table(table)
            .ok_or_else(|| StoreError::table_not_found(table))?;
        Ok(rows.page_at(self.snapshot, None, after, limit))
    }

    /// Counts rows visible in a table, including soft-deleted rows.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    pub fn count(&self, table: &str) -> StoreResult<usize> {
        let state = self.store.state().read();
        let rows = state
            .table(table)
            .ok_or_else(|| StoreError::table_not_found(table))?;
        Ok(rows.count_at(self.snapshot))
    }

    /// Reads a fact as of this snapshot.
    #[must_use]
    pub fn fact(&self, key: &str) -> Option<String> {
        self.store.state().read().fact_at(key, self.snapshot).cloned()
    }

    /// Returns changelog entries with `tick >= min_tick`, in commit order.
    #[must_use]
    pub fn changelog_since(&self, min_tick: Tick) -> Vec<AuditEntry> {
        self.store
            .state()
            .read()
            .changelog_at(self.snapshot)
            .iter()
            .filter(|(_, entry)| entry.tick >= min_tick)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Returns every changelog entry for one row, in commit order.
    #[must_use]
    pub fn changelog_for(&self, table: &str, record_id: &str) -> Vec<AuditEntry> {
        self.store
            .state()
            .read()
            .changelog_at(self.snapshot)
            .iter()
            .filter(|(_, entry)| entry.table_name == table && entry.record_id == record_id)
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}
