//! Central record store.
//!
//! Holds the latest version of every synced row, stamped with the central
//! clock. The clock is a tick-tock counter: each bump advances it by two and
//! hands out the odd value below the new even value, so a tick handed to one
//! caller is never observed as "current" by another.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use ticksync_protocol::{ChangeDirection, ChangeRecord, ChangelogRecord, RecordData, SessionId};

/// Result of a clock bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickTock {
    /// Value handed to the caller.
    pub tick: i64,
    /// New clock value.
    pub tock: i64,
}

/// A stored row version.
#[derive(Debug, Clone, PartialEq)]
pub struct CentralRecord {
    /// The row, without changelog entries.
    pub record: ChangeRecord,
    /// Central tick the version was written at.
    pub tick: i64,
    /// Session that pushed the version, `None` for central-side edits.
    pub pushed_by: Option<SessionId>,
}

/// Records changed in a tick window, in pull order.
#[derive(Debug, Clone, Default)]
pub struct PullSnapshot {
    /// Upper bound of the window.
    pub pull_until: i64,
    /// Records ordered by (tick, type, id).
    pub records: Vec<ChangeRecord>,
}

/// In-memory record store with a logical clock.
#[derive(Debug)]
pub struct CentralRecords {
    /// Current clock value. Held while writing so snapshots never miss a
    /// version stamped below their bound.
    clock: Mutex<i64>,
    records: RwLock<BTreeMap<(String, String), CentralRecord>>,
    changelog: RwLock<Vec<ChangelogRecord>>,
}

impl CentralRecords {
    /// Creates an empty store with the clock at `initial_tick`.
    pub fn new(initial_tick: i64) -> Self {
        Self {
            clock: Mutex::new(initial_tick),
            records: RwLock::new(BTreeMap::new()),
            changelog: RwLock::new(Vec::new()),
        }
    }

    /// Returns the current clock value.
    pub fn tick(&self) -> i64 {
        *self.clock.lock()
    }

    /// Advances the clock.
    pub fn tick_tock(&self) -> TickTock {
        let mut clock = self.clock.lock();
        Self::bump(&mut clock)
    }

    fn bump(clock: &mut i64) -> TickTock {
        let tock = *clock + 2;
        *clock = tock;
        TickTock {
            tick: tock - 1,
            tock,
        }
    }

    /// Stores `records` under one fresh tick and returns it.
    ///
    /// Changelog entries are split off into the central changelog.
    pub fn persist(&self, records: Vec<ChangeRecord>, pushed_by: Option<&SessionId>) -> i64 {
        let mut clock = self.clock.lock();
        let TickTock { tick, .. } = Self::bump(&mut clock);

        let mut stored = self.records.write();
        let mut changelog = self.changelog.write();
        for mut record in records {
            changelog.append(&mut record.changelog_records);
            let key = (record.record_type.clone(), record.record_id.clone());
            stored.insert(
                key,
                CentralRecord {
                    record,
                    tick,
                    pushed_by: pushed_by.cloned(),
                },
            );
        }
        tick
    }

    /// Writes a live row from the central side.
    pub fn upsert(&self, record_type: &str, record_id: &str, data: RecordData) -> i64 {
        let record = ChangeRecord::upsert(ChangeDirection::Incoming, record_type, record_id, data);
        self.persist(vec![record], None)
    }

    /// Soft-deletes a row from the central side.
    pub fn delete(&self, record_type: &str, record_id: &str) -> i64 {
        let record = ChangeRecord::deleted(ChangeDirection::Incoming, record_type, record_id);
        self.persist(vec![record], None)
    }

    /// Bumps the clock and collects every record with
    /// `since < tick <= pull_until`, leaving out what `exclude` pushed.
    pub fn snapshot_since(&self, since: i64, exclude: Option<&SessionId>) -> PullSnapshot {
        let mut clock = self.clock.lock();
        let TickTock { tick: pull_until, .. } = Self::bump(&mut clock);

        let stored = self.records.read();
        let mut matching: Vec<&CentralRecord> = stored
            .values()
            .filter(|r| r.tick > since && r.tick <= pull_until)
            .filter(|r| exclude.is_none() || r.pushed_by.as_ref() != exclude)
            .collect();
        matching.sort_by(|a, b| {
            (a.tick, &a.record.record_type, &a.record.record_id).cmp(&(
                b.tick,
                &b.record.record_type,
                &b.record.record_id,
            ))
        });

        let records = matching
            .into_iter()
            .map(|r| r.record.clone().with_direction(ChangeDirection::Incoming))
            .collect();
        PullSnapshot {
            pull_until,
            records,
        }
    }

    /// Returns the stored version of a row.
    pub fn get(&self, record_type: &str, record_id: &str) -> Option<CentralRecord> {
        self.records
            .read()
            .get(&(record_type.to_string(), record_id.to_string()))
            .cloned()
    }

    /// Returns the number of stored rows.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns changelog entries received for a row, oldest first.
    pub fn changelog_for(&self, table_name: &str, record_id: &str) -> Vec<ChangelogRecord> {
        self.changelog
            .read()
            .iter()
            .filter(|c| c.table_name == table_name && c.record_id == record_id)
            .cloned()
            .collect()
    }

    /// Returns the number of changelog entries received.
    pub fn changelog_len(&self) -> usize {
        self.changelog.read().len()
    }
}

impl Default for CentralRecords {
    fn default() -> Self {
        Self::new(0)
    }
}
