//! Transactions.
//!
//! - [`ReadTransaction`] fixes a snapshot at begin and never blocks.
//! - [`WriteTransaction`] holds the store's single-writer lock for its
//!   whole lifetime and carries a [`WriteContext`].

mod read;
mod write;

pub use read::ReadTransaction;
pub use write::WriteTransaction;

/// Per-transaction write settings.
///
/// Owned by one [`WriteTransaction`] and discarded with it, so nothing set
/// here can leak into another transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteContext {
    /// When set, row writes made from now on are not recorded in the
    /// changelog. Writes made before the flag was set stay recorded.
    pub audit_paused: bool,
}

#[cfg(test)]
mod tests {
    use crate::audit::AuditOperation;
    use crate::config::StoreConfig;
    use crate::facts::CURRENT_TICK;
    use crate::row::{Fields, RowWrite, TickStamp};
    use crate::store::Store;
    use crate::types::Tick;
    use serde_json::json;
    use std::sync::{mpsc, Arc, Barrier};
    use std::thread;

    const TABLE: &str = "reference_data";

    fn store() -> Arc<Store> {
        let store = Store::open_in_memory();
        store.ensure_table(TABLE).unwrap();
        Arc::new(store)
    }

    fn data(code: &str) -> Fields {
        json!({ "code": code }).as_object().cloned().unwrap()
    }

    #[test]
    fn commit_before_snapshot_is_visible() {
        let store = store();
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store.transaction(|txn| txn.put(TABLE, "early", data("E"))).unwrap();
            })
        };
        writer.join().unwrap();

        let snapshot = store.begin_read();
        assert!(snapshot.get(TABLE, "early").unwrap().is_some());
    }

    #[test]
    fn commit_after_snapshot_is_invisible_even_if_writer_began_first() {
        let store = store();
        let began = Arc::new(Barrier::new(2));
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let writer = {
            let store = Arc::clone(&store);
            let began = Arc::clone(&began);
            thread::spawn(move || {
                let mut txn = store.begin_write();
                txn.put(TABLE, "late", data("L")).unwrap();
                began.wait();
                release_rx.recv().unwrap();
                txn.commit().unwrap();
            })
        };

        began.wait();
        let snapshot = store.begin_read();
        release_tx.send(()).unwrap();
        writer.join().unwrap();

        assert!(snapshot.get(TABLE, "late").unwrap().is_none());
        assert!(store.begin_read().get(TABLE, "late").unwrap().is_some());
    }

    #[test]
    fn rows_are_stamped_with_tick_at_commit() {
        let store = store();
        store.set_fact(CURRENT_TICK, "7").unwrap();

        let mut txn = store.begin_write();
        txn.put(TABLE, "a", data("A")).unwrap();
        txn.set_fact(CURRENT_TICK, "9");
        txn.commit().unwrap();

        let row = store.begin_read().get(TABLE, "a").unwrap().unwrap();
        assert_eq!(row.tick, Tick::new(9));
        assert_eq!(row.field("id"), Some(&json!("a")));
    }

    #[test]
    fn fixed_stamp_overrides_current_tick() {
        let store = store();
        store.set_fact(CURRENT_TICK, "7").unwrap();

        store
            .transaction(|txn| {
                txn.write(
                    TABLE,
                    RowWrite::upsert("pulled", data("P"))
                        .stamped(TickStamp::Fixed(Tick::INCOMING_FROM_CENTRAL)),
                )
            })
            .unwrap();

        let row = store.begin_read().get(TABLE, "pulled").unwrap().unwrap();
        assert_eq!(row.tick, Tick::INCOMING_FROM_CENTRAL);
    }

    #[test]
    fn soft_delete_keeps_data_and_flags_row() {
        let store = store();
        store.transaction(|txn| txn.put(TABLE, "a", data("A"))).unwrap();

        let deleted = store.transaction(|txn| txn.soft_delete(TABLE, "a")).unwrap();
        assert!(deleted);
        let missing = store.transaction(|txn| txn.soft_delete(TABLE, "zz")).unwrap();
        assert!(!missing);

        let row = store.begin_read().get(TABLE, "a").unwrap().unwrap();
        assert!(row.is_deleted);
        assert_eq!(row.field("code"), Some(&json!("A")));
    }

    #[test]
    fn each_write_is_audited_once() {
        let store = store();
        store.transaction(|txn| txn.put(TABLE, "a", data("A"))).unwrap();
        store.transaction(|txn| txn.put(TABLE, "a", data("B"))).unwrap();
        store.transaction(|txn| txn.soft_delete(TABLE, "a")).unwrap();

        let entries = store.begin_read().changelog_for(TABLE, "a");
        let ops: Vec<_> = entries.iter().map(|e| e.operation).collect();
        assert_eq!(
            ops,
            [
                AuditOperation::Insert,
                AuditOperation::Update,
                AuditOperation::Delete
            ]
        );
    }

    #[test]
    fn pause_applies_to_later_writes_in_same_transaction_only() {
        let store = store();

        let mut txn = store.begin_write();
        txn.put(TABLE, "before", data("B")).unwrap();
        txn.pause_audit();
        assert!(txn.context().audit_paused);
        txn.put(TABLE, "after", data("A")).unwrap();
        txn.commit().unwrap();

        let read = store.begin_read();
        assert_eq!(read.changelog_for(TABLE, "before").len(), 1);
        assert!(read.changelog_for(TABLE, "after").is_empty());

        let txn = store.begin_write();
        assert!(!txn.context().audit_paused);
        drop(txn);

        store.transaction(|txn| txn.put(TABLE, "next", data("N"))).unwrap();
        assert_eq!(store.begin_read().changelog_for(TABLE, "next").len(), 1);
    }

    #[test]
    fn global_switch_disables_capture() {
        let store = Store::open_in_memory_with(StoreConfig::new().with_audit_changes(false));
        store.ensure_table(TABLE).unwrap();
        store.transaction(|txn| txn.put(TABLE, "a", data("A"))).unwrap();
        assert!(store.begin_read().changelog_since(Tick::NEVER).is_empty());

        store.set_audit_enabled(true);
        store.transaction(|txn| txn.put(TABLE, "b", data("B"))).unwrap();
        assert_eq!(store.begin_read().changelog_since(Tick::NEVER).len(), 1);
    }

    #[test]
    fn rollback_discards_writes() {
        let store = store();
        let mut txn = store.begin_write();
        txn.put(TABLE, "a", data("A")).unwrap();
        assert!(txn.get(TABLE, "a").unwrap().is_some());
        txn.rollback();

        assert!(store.begin_read().get(TABLE, "a").unwrap().is_none());
    }
}

#[cfg(test)]
mod proptests {
    use crate::facts::CURRENT_TICK;
    use crate::row::Fields;
    use crate::store::Store;
    use crate::types::Tick;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    const TABLE: &str = "reference_data";

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Every row carries the `currentTick` of its last commit, and
        /// `changed_since` returns exactly the rows above the given tick.
        #[test]
        fn rows_carry_commit_tick(commits in prop::collection::vec((0i64..20, 0usize..6), 1..40)) {
            let store = Store::open_in_memory();
            store.ensure_table(TABLE).unwrap();

            let mut expected: BTreeMap<String, Tick> = BTreeMap::new();
            for (tick, id) in &commits {
                let id = format!("row-{id}");
                store
                    .transaction(|txn| {
                        txn.set_fact(CURRENT_TICK, tick.to_string());
                        txn.put(TABLE, &id, Fields::new())
                    })
                    .unwrap();
                expected.insert(id, Tick::new(*tick));
            }

            let read = store.begin_read();
            for (id, tick) in &expected {
                prop_assert_eq!(read.get(TABLE, id).unwrap().unwrap().tick, *tick);
            }
            for since in -1i64..20 {
                let since = Tick::new(since);
                let changed: Vec<String> = read
                    .changed_since(TABLE, since, None, usize::MAX)
                    .unwrap()
                    .into_iter()
                    .map(|row| row.id)
                    .collect();
                let wanted: Vec<String> = expected
                    .iter()
                    .filter(|(_, tick)| **tick > since)
                    .map(|(id, _)| id.clone())
                    .collect();
                prop_assert_eq!(changed, wanted);
            }
        }
    }
}
