//! Changelog attachment and audit pausing.

use crate::error::SyncResult;
use std::collections::HashMap;
use ticksync_protocol::{ChangeRecord, ChangelogOperation, ChangelogRecord};
use ticksync_store::{AuditEntry, AuditOperation, Store, Tick, WriteTransaction};

/// Options for [`attach_changelog_to_snapshot_records`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangelogOptions {
    /// Entries stamped before this tick are left out.
    pub min_source_tick: Tick,
}

/// Attaches each record's changelog entries with `tick >= min_source_tick`.
///
/// Records with no matching entries get an empty list. Only reads.
///
/// # Errors
///
/// Infallible against the in-process store; kept fallible for backends
/// that read lazily.
pub fn attach_changelog_to_snapshot_records(
    store: &Store,
    records: Vec<ChangeRecord>,
    options: ChangelogOptions,
) -> SyncResult<Vec<ChangeRecord>> {
    let read = store.begin_read();
    let mut by_row: HashMap<(String, String), Vec<ChangelogRecord>> = HashMap::new();
    for entry in read.changelog_since(options.min_source_tick) {
        by_row
            .entry((entry.table_name.clone(), entry.record_id.clone()))
            .or_default()
            .push(to_wire(entry));
    }

    Ok(records
        .into_iter()
        .map(|mut record| {
            record.changelog_records = by_row
                .remove(&(record.record_type.clone(), record.record_id.clone()))
                .unwrap_or_default();
            record
        })
        .collect())
}

/// Suppresses changelog entries for the rest of this transaction.
///
/// Scoped to `txn`: concurrent transactions keep auditing, and the next
/// transaction starts unpaused.
pub fn pause_audit(txn: &mut WriteTransaction<'_>) {
    txn.pause_audit();
}

fn to_wire(entry: AuditEntry) -> ChangelogRecord {
    ChangelogRecord {
        id: entry.id.to_string(),
        table_name: entry.table_name,
        record_id: entry.record_id,
        tick: entry.tick.as_i64(),
        operation: match entry.operation {
            AuditOperation::Insert => ChangelogOperation::Insert,
            AuditOperation::Update => ChangelogOperation::Update,
            AuditOperation::Delete => ChangelogOperation::Delete,
            AuditOperation::Restore => ChangelogOperation::Restore,
        },
        data: entry.data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ticksync_protocol::ChangeDirection;
    use ticksync_store::{Fields, CURRENT_TICK};

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn seeded_store() -> Store {
        let store = Store::open_in_memory();
        store.ensure_table("patients").unwrap();
        store
            .transaction(|txn| {
                txn.set_fact(CURRENT_TICK, "2");
                txn.put("patients", "p1", fields(json!({"name": "Ana"})))
            })
            .unwrap();
        store
            .transaction(|txn| {
                txn.set_fact(CURRENT_TICK, "4");
                txn.put("patients", "p1", fields(json!({"name": "Ana B"})))
            })
            .unwrap();
        store
    }

    fn record(id: &str) -> ChangeRecord {
        ChangeRecord::upsert(ChangeDirection::Outgoing, "patients", id, Fields::new())
    }

    #[test]
    fn attaches_entries_at_or_after_min_tick() {
        let store = seeded_store();

        let all = attach_changelog_to_snapshot_records(
            &store,
            vec![record("p1")],
            ChangelogOptions {
                min_source_tick: Tick::new(2),
            },
        )
        .unwrap();
        let ops: Vec<_> = all[0]
            .changelog_records
            .iter()
            .map(|c| (c.operation, c.tick))
            .collect();
        assert_eq!(
            ops,
            vec![(ChangelogOperation::Insert, 2), (ChangelogOperation::Update, 4)]
        );

        let recent = attach_changelog_to_snapshot_records(
            &store,
            vec![record("p1")],
            ChangelogOptions {
                min_source_tick: Tick::new(3),
            },
        )
        .unwrap();
        assert_eq!(recent[0].changelog_records.len(), 1);
        assert_eq!(recent[0].changelog_records[0].data["name"], json!("Ana B"));
    }

    #[test]
    fn records_without_entries_get_an_empty_list() {
        let store = seeded_store();
        let out = attach_changelog_to_snapshot_records(
            &store,
            vec![record("p9")],
            ChangelogOptions {
                min_source_tick: Tick::NEVER,
            },
        )
        .unwrap();
        assert!(out[0].changelog_records.is_empty());
        assert_eq!(out[0].record_id, "p9");
    }

    #[test]
    fn paused_writes_leave_no_entries() {
        let store = Store::open_in_memory();
        store.ensure_table("patients").unwrap();
        store
            .transaction(|txn| {
                pause_audit(txn);
                txn.put("patients", "p1", Fields::new())
            })
            .unwrap();
        store
            .transaction(|txn| txn.put("patients", "p2", Fields::new()))
            .unwrap();

        let read = store.begin_read();
        assert!(read.changelog_for("patients", "p1").is_empty());
        assert_eq!(read.changelog_for("patients", "p2").len(), 1);
    }
}
