//! Single-writer write transactions.

use super::WriteContext;
use crate::audit::{classify, PendingAudit};
use crate::error::{StoreError, StoreResult};
use crate::facts::CURRENT_TICK;
use crate::log::{CommitRecord, CommittedRow};
use crate::row::{Fields, Row, RowWrite, TickStamp};
use crate::store::Store;
use crate::types::{SequenceNumber, Tick, TransactionId};
use parking_lot::MutexGuard;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
struct PendingRow {
    table: String,
    id: String,
    data: Fields,
    is_deleted: bool,
    stamp: TickStamp,
}

/// A write transaction holding the store's exclusive write lock.
///
/// Writes are buffered and become visible atomically at
/// [`commit`](Self::commit). Dropping the transaction without committing
/// discards them.
///
/// Row writes to synced tables are stamped with the `currentTick` fact as
/// seen at commit time (including a value set earlier in this same
/// transaction), unless the write carries a fixed stamp.
pub struct WriteTransaction<'a> {
    store: &'a Store,
    _guard: MutexGuard<'a, ()>,
    id: TransactionId,
    snapshot: SequenceNumber,
    context: WriteContext,
    tables: Vec<String>,
    rows: Vec<PendingRow>,
    row_index: HashMap<(String, String), usize>,
    facts: BTreeMap<String, String>,
    audit: Vec<PendingAudit>,
}

impl<'a> WriteTransaction<'a> {
    pub(crate) fn new(
        store: &'a Store,
        guard: MutexGuard<'a, ()>,
        id: TransactionId,
        snapshot: SequenceNumber,
    ) -> Self {
        Self {
            store,
            _guard: guard,
            id,
            snapshot,
            context: WriteContext::default(),
            tables: Vec::new(),
            rows: Vec::new(),
            row_index: HashMap::new(),
            facts: BTreeMap::new(),
            audit: Vec::new(),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the write context of this transaction.
    #[must_use]
    pub fn context(&self) -> WriteContext {
        self.context
    }

    /// Suppresses changelog capture for the rest of this transaction.
    pub fn pause_audit(&mut self) {
        self.context.audit_paused = true;
    }

    /// Creates a table if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTableName` unless the name is non-empty ASCII
    /// alphanumerics and underscores.
    pub fn create_table(&mut self, name: &str) -> StoreResult<()> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(StoreError::InvalidTableName {
                name: name.to_string(),
            });
        }
        if !self.has_table(name) {
            self.tables.push(name.to_string());
        }
        Ok(())
    }

    /// Returns true if the table exists or was created in this transaction.
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t == name) || self.store.state().read().table(name).is_some()
    }

    /// Reads a row, seeing this transaction's own writes.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    pub fn get(&self, table: &str, id: &str) -> StoreResult<Option<Row>> {
        if !self.has_table(table) {
            return Err(StoreError::table_not_found(table));
        }

        if let Some(&index) = self.row_index.get(&(table.to_string(), id.to_string())) {
            let pending = &self.rows[index];
            let tick = match pending.stamp {
                TickStamp::AtCommit => self.commit_tick()?,
                TickStamp::Fixed(tick) => tick,
            };
            return Ok(Some(Row {
                id: pending.id.clone(),
                data: pending.data.clone(),
                tick,
                is_deleted: pending.is_deleted,
            }));
        }

        Ok(self
            .store
            .state()
            .read()
            .table(table)
            .and_then(|rows| rows.get_latest(id))
            .cloned())
    }

    /// Inserts or replaces a row, clearing its deleted flag.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    pub fn put(&mut self, table: &str, id: &str, data: Fields) -> StoreResult<()> {
        self.write(table, RowWrite::upsert(id, data)).map(|_| ())
    }

    /// Soft-deletes a row. Returns false if the row does not exist.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    pub fn soft_delete(&mut self, table: &str, id: &str) -> StoreResult<bool> {
        self.write(table, RowWrite::delete(id))
    }

    /// Applies a row write. Returns false if nothing was written, which
    /// happens only for a write without data to a row that does not exist.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    pub fn write(&mut self, table: &str, write: RowWrite) -> StoreResult<bool> {
        let previous = self.get(table, &write.id)?;

        let mut data = match (write.data, &previous) {
            (Some(data), _) => data,
            (None, Some(previous)) => previous.data.clone(),
            (None, None) => return Ok(false),
        };
        data.insert("id".to_string(), Value::String(write.id.clone()));

        if !self.context.audit_paused {
            self.audit.push(PendingAudit {
                table_name: table.to_string(),
                record_id: write.id.clone(),
                operation: classify(previous.map(|p| p.is_deleted), write.is_deleted),
                is_deleted: write.is_deleted,
                data: data.clone(),
                fixed_tick: match write.stamp {
                    TickStamp::AtCommit => None,
                    TickStamp::Fixed(tick) => Some(tick),
                },
            });
        }

        let key = (table.to_string(), write.id.clone());
        let pending = PendingRow {
            table: table.to_string(),
            id: write.id,
            data,
            is_deleted: write.is_deleted,
            stamp: write.stamp,
        };
        match self.row_index.get(&key) {
            Some(&index) => self.rows[index] = pending,
            None => {
                self.row_index.insert(key, self.rows.len());
                self.rows.push(pending);
            }
        }

        Ok(true)
    }

    /// Reads a fact, seeing this transaction's own writes.
    #[must_use]
    pub fn fact(&self, key: &str) -> Option<String> {
        self.facts
            .get(key)
            .cloned()
            .or_else(|| self.store.state().read().fact_latest(key).cloned())
    }

    /// Sets a fact.
    pub fn set_fact(&mut self, key: &str, value: impl Into<String>) {
        self.facts.insert(key.to_string(), value.into());
    }

    /// Adds `by` to a numeric fact (absent counts as zero) and returns
    /// the new value.
    ///
    /// # Errors
    ///
    /// Returns `NonNumericFact` if the stored value is not an integer.
    pub fn increment_fact(&mut self, key: &str, by: i64) -> StoreResult<i64> {
        let current = match self.fact(key) {
            Some(value) => value
                .trim()
                .parse::<i64>()
                .map_err(|_| StoreError::NonNumericFact {
                    key: key.to_string(),
                    value: value.clone(),
                })?,
            None => 0,
        };
        let next = current.saturating_add(by);
        self.set_fact(key, next.to_string());
        Ok(next)
    }

    /// The tick row writes would be stamped with if committed now.
    ///
    /// # Errors
    ///
    /// Returns `NonNumericFact` if `currentTick` is corrupt.
    pub fn commit_tick(&self) -> StoreResult<Tick> {
        match self.fact(CURRENT_TICK) {
            Some(value) => value.parse().map_err(|_| StoreError::NonNumericFact {
                key: CURRENT_TICK.to_string(),
                value,
            }),
            None => Ok(Tick::new(0)),
        }
    }

    /// Commits all buffered writes atomically and durably.
    ///
    /// Returns the commit's sequence number. A transaction with no writes
    /// commits nothing and returns its snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit log cannot be written; the store is
    /// left unchanged in that case.
    pub fn commit(self) -> StoreResult<SequenceNumber> {
        if self.tables.is_empty() && self.rows.is_empty() && self.facts.is_empty() {
            return Ok(self.snapshot);
        }

        let tick = self.commit_tick()?;
        let audit_on = self.store.audit_enabled();
        let seq = self.store.committed_seq().next();

        let rows = self
            .rows
            .into_iter()
            .map(|pending| CommittedRow {
                table: pending.table,
                row: Row {
                    id: pending.id,
                    data: pending.data,
                    tick: match pending.stamp {
                        TickStamp::AtCommit => tick,
                        TickStamp::Fixed(fixed) => fixed,
                    },
                    is_deleted: pending.is_deleted,
                },
            })
            .collect();

        let changelog = if audit_on {
            self.audit
                .into_iter()
                .map(|pending| pending.complete(tick))
                .collect()
        } else {
            Vec::new()
        };

        let record = CommitRecord {
            seq,
            txid: self.id,
            tables: self.tables,
            rows,
            facts: self.facts.into_iter().collect(),
            changelog,
        };

        self.store.install(record)?;
        Ok(seq)
    }

    /// Discards all buffered writes and releases the write lock.
    pub fn rollback(self) {}
}
