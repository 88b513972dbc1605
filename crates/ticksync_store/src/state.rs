//! Versioned in-memory state shared by all transactions.

use crate::audit::AuditEntry;
use crate::log::CommitRecord;
use crate::row::Row;
use crate::types::{SequenceNumber, Tick};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// All committed versions of one value, oldest first.
#[derive(Debug, Clone)]
pub(crate) struct VersionChain<T> {
    versions: Vec<(SequenceNumber, T)>,
}

impl<T> Default for VersionChain<T> {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
        }
    }
}

impl<T> VersionChain<T> {
    /// Newest version committed at or before `snapshot`.
    pub(crate) fn visible_at(&self, snapshot: SequenceNumber) -> Option<&T> {
        self.versions
            .iter()
            .rev()
            .find(|(seq, _)| *seq <= snapshot)
            .map(|(_, value)| value)
    }

    pub(crate) fn latest(&self) -> Option<&T> {
        self.versions.last().map(|(_, value)| value)
    }

    fn push(&mut self, seq: SequenceNumber, value: T) {
        self.versions.push((seq, value));
    }
}

/// Rows of one table keyed by primary key.
#[derive(Debug, Default)]
pub(crate) struct Table {
    rows: BTreeMap<String, VersionChain<Row>>,
}

impl Table {
    pub(crate) fn get_at(&self, id: &str, snapshot: SequenceNumber) -> Option<&Row> {
        self.rows.get(id).and_then(|chain| chain.visible_at(snapshot))
    }

    pub(crate) fn get_latest(&self, id: &str) -> Option<&Row> {
        self.rows.get(id).and_then(VersionChain::latest)
    }

    /// Up to `limit` rows visible at `snapshot` with key greater than
    /// `after` and tick greater than `since`, in key order.
    pub(crate) fn page_at(
        &self,
        snapshot: SequenceNumber,
        since: Option<Tick>,
        after: Option<&str>,
        limit: usize,
    ) -> Vec<Row> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        self.rows
            .range::<str, _>((lower, Bound::Unbounded))
            .filter_map(|(_, chain)| chain.visible_at(snapshot))
            .filter(|row| since.map_or(true, |since| row.tick > since))
            .take(limit)
            .cloned()
            .collect()
    }

    pub(crate) fn count_at(&self, snapshot: SequenceNumber) -> usize {
        self.rows
            .values()
            .filter(|chain| chain.visible_at(snapshot).is_some())
            .count()
    }
}

/// Committed tables, facts and changelog.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub tables: HashMap<String, Table>,
    pub facts: BTreeMap<String, VersionChain<String>>,
    changelog: Vec<(SequenceNumber, AuditEntry)>,
}

impl StoreState {
    pub(crate) fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub(crate) fn fact_at(&self, key: &str, snapshot: SequenceNumber) -> Option<&String> {
        self.facts.get(key).and_then(|chain| chain.visible_at(snapshot))
    }

    pub(crate) fn fact_latest(&self, key: &str) -> Option<&String> {
        self.facts.get(key).and_then(VersionChain::latest)
    }

    /// Changelog entries committed at or before `snapshot`, in commit order.
    pub(crate) fn changelog_at(&self, snapshot: SequenceNumber) -> &[(SequenceNumber, AuditEntry)] {
        let end = self.changelog.partition_point(|(seq, _)| *seq <= snapshot);
        &self.changelog[..end]
    }

    /// Installs a commit. Records must be applied in sequence order.
    pub(crate) fn apply(&mut self, record: CommitRecord) {
        let seq = record.seq;
        for name in record.tables {
            self.tables.entry(name).or_default();
        }
        for committed in record.rows {
            self.tables
                .entry(committed.table)
                .or_default()
                .rows
                .entry(committed.row.id.clone())
                .or_default()
                .push(seq, committed.row);
        }
        for (key, value) in record.facts {
            self.facts.entry(key).or_default().push(seq, value);
        }
        self.changelog
            .extend(record.changelog.into_iter().map(|entry| (seq, entry)));
    }
}
