//! Integration tests for the sync engine against the central node.

use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use ticksync_central::{CentralConfig, SessionStatus};
use ticksync_engine::{
    snapshot_outgoing_changes, snapshot_outgoing_changes_in, CentralCall, CentralServer,
    MockCentral, SyncConfig, SyncCoordinator, SyncError, SyncRunOutcome, SyncScheduler,
};
use ticksync_protocol::{
    ChangeDirection, ChangeRecord, QueueStatus, StartSessionRequest, StartSessionResponse,
    PROTOCOL_VERSION,
};
use ticksync_store::{Store, Tick, LAST_SUCCESSFUL_SYNC_PULL, LAST_SUCCESSFUL_SYNC_PUSH};
use ticksync_testkit::prelude::*;

fn assert_ticks_bounded(store: &Store) {
    let current = store.current_tick().unwrap();
    let read = store.begin_read();
    for table in store.table_names() {
        for row in read.scan(&table, None, usize::MAX).unwrap() {
            assert!(
                row.tick <= current,
                "{table}/{} has tick {} above currentTick {current}",
                row.id,
                row.tick
            );
        }
    }
}

/// Pull and push watermarks, in that order.
fn watermarks(store: &Store) -> (Tick, Tick) {
    (
        store.get_tick(LAST_SUCCESSFUL_SYNC_PULL).unwrap(),
        store.get_tick(LAST_SUCCESSFUL_SYNC_PUSH).unwrap(),
    )
}

#[test]
fn reference_data_round_trip_between_facilities() {
    let mut harness = SyncHarness::new();
    harness.add_facility("clinic-a");
    harness.add_facility("clinic-b");
    let a = harness.facility(0);
    let b = harness.facility(1);

    // 1. A creates reference data and pushes it
    a.put(
        models::REFERENCE_DATA,
        "village-1",
        json!({ "type": "village", "name": "Kinondoni" }),
    );
    let report = a.sync();
    assert_eq!(report.pushed, 1);
    assert_eq!(report.pulled, 0);

    // 2. B pulls it
    let report = b.sync();
    assert_eq!(report.pulled, 1);
    let row = b.row(models::REFERENCE_DATA, "village-1").unwrap();
    assert_eq!(row.field("name"), Some(&json!("Kinondoni")));
    assert_eq!(row.tick, Tick::INCOMING_FROM_CENTRAL);

    // 3. B edits it and pushes; B does not get its own push back
    b.put(
        models::REFERENCE_DATA,
        "village-1",
        json!({ "type": "village", "name": "Kinondoni Mjini" }),
    );
    let report = b.sync();
    assert_eq!(report.pushed, 1);
    assert_eq!(report.pulled, 0);

    // 4. A pulls the edit and pushes nothing
    let report = a.sync();
    assert_eq!(report.pushed, 0);
    assert_eq!(report.pulled, 1);
    let row = a.row(models::REFERENCE_DATA, "village-1").unwrap();
    assert_eq!(row.field("name"), Some(&json!("Kinondoni Mjini")));

    // 5. A deletes it; B sees the deletion
    a.delete(models::REFERENCE_DATA, "village-1");
    a.sync();
    b.sync();
    assert!(b.row(models::REFERENCE_DATA, "village-1").unwrap().is_deleted);

    assert_ticks_bounded(a.store());
    assert_ticks_bounded(b.store());
    assert_eq!(harness.central().active_sessions(), 0);
}

#[test]
fn repeated_sync_without_writes_is_idle() {
    let mut harness = SyncHarness::new();
    harness.add_facility("clinic");
    let facility = harness.facility(0);
    facility.put(models::PATIENT, "p1", json!({ "name": "Amina" }));

    assert_eq!(facility.sync().pushed, 1);
    let second = facility.sync();
    assert_eq!(second.pushed, 0);
    assert_eq!(second.pulled, 0);
}

#[test]
fn sync_directions_are_honoured() {
    let mut harness = SyncHarness::new();
    harness.put_central(models::FACILITY, "f1", json!({ "name": "Clinic" }));
    harness.put_central(models::SURVEY_RESPONSE, "s-central", json!({ "answer": 1 }));
    harness.add_facility("clinic");
    let facility = harness.facility(0);

    facility.put(models::SURVEY_RESPONSE, "s1", json!({ "answer": 4 }));
    facility.put(models::LOCAL_SETTING, "theme", json!({ "value": "dark" }));
    let report = facility.sync();

    assert_eq!(report.pushed, 1);
    let central = harness.central();
    assert!(central.record(models::SURVEY_RESPONSE, "s1").is_some());
    assert!(central.record(models::LOCAL_SETTING, "theme").is_none());

    assert!(facility.row(models::FACILITY, "f1").is_some());
    assert!(facility.row(models::SURVEY_RESPONSE, "s-central").is_none());
}

#[test]
fn pulled_rows_carry_no_changelog_and_are_not_pushed_back() {
    let mut harness = SyncHarness::new();
    harness.put_central(models::REFERENCE_DATA, "r1", json!({ "code": "C" }));
    harness.add_facility("clinic");
    let facility = harness.facility(0);
    facility.put(models::REFERENCE_DATA, "local", json!({ "code": "L" }));

    facility.sync();
    let read = facility.store().begin_read();
    assert_eq!(read.changelog_for(models::REFERENCE_DATA, "r1").len(), 0);
    assert_eq!(read.changelog_for(models::REFERENCE_DATA, "local").len(), 1);

    // The pulled row is not captured as an outgoing change.
    let outgoing = snapshot_outgoing_changes(
        facility.store(),
        facility.coordinator().registry().outgoing_models(),
        Tick::NEVER,
        100,
    )
    .unwrap();
    let ids: Vec<_> = outgoing.iter().map(|r| r.record_id.as_str()).collect();
    assert_eq!(ids, vec!["local"]);
}

#[test]
fn pushed_changelog_reaches_central() {
    let mut harness = SyncHarness::new();
    harness.add_facility("clinic");
    let facility = harness.facility(0);
    facility.put(models::PATIENT, "p1", json!({ "name": "Amina" }));
    facility.put(models::PATIENT, "p1", json!({ "name": "Amina Juma" }));

    facility.sync();
    let changelog = harness.central().changelog_for(models::PATIENT, "p1");
    assert_eq!(changelog.len(), 2);
    assert_eq!(changelog[1].data.get("name"), Some(&json!("Amina Juma")));
}

#[test]
fn capture_is_idempotent_and_isolated() {
    let store = scenarios::populated_store(20);
    let registry = models::reference_data_registry();
    let outgoing = registry.outgoing_models();

    let first = snapshot_outgoing_changes(&store, outgoing.iter().copied(), Tick::NEVER, 7).unwrap();
    let second =
        snapshot_outgoing_changes(&store, outgoing.iter().copied(), Tick::NEVER, 7).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 20);

    let read = store.begin_read();
    store.put(models::REFERENCE_DATA, "late", json!({ "code": "late" }));
    let isolated = snapshot_outgoing_changes_in(&read, &outgoing, Tick::NEVER, 7).unwrap();
    assert_eq!(isolated.len(), 20);
    assert!(isolated.iter().all(|r| r.direction == ChangeDirection::Outgoing));
}

#[test]
fn queued_session_leaves_watermarks_alone() {
    let mut harness = SyncHarness::with_config(CentralConfig::new().with_max_concurrent_sessions(1));
    let blocker = harness
        .central()
        .start_sync_session(&StartSessionRequest {
            device_id: "other-facility".into(),
            protocol_version: PROTOCOL_VERSION,
        })
        .unwrap();
    assert!(matches!(blocker, StartSessionResponse::Started { .. }));

    harness.add_facility("clinic");
    let facility = harness.facility(0);
    facility.put(models::REFERENCE_DATA, "r1", json!({ "code": "A" }));
    let outcome = facility.try_sync().unwrap();

    assert_eq!(
        outcome,
        SyncRunOutcome::Queued {
            status: QueueStatus::WaitingInQueue
        }
    );
    let store = facility.store();
    assert_eq!(store.get_tick(LAST_SUCCESSFUL_SYNC_PUSH).unwrap(), Tick::NEVER);
    assert_eq!(store.get_tick(LAST_SUCCESSFUL_SYNC_PULL).unwrap(), Tick::NEVER);
    assert_eq!(facility.coordinator().stats().runs_queued, 1);
}

#[test]
fn local_edit_during_session_aborts_the_pull() {
    let store = Arc::new(Store::open_in_memory());
    let central = Arc::new(MockCentral::new());
    let coordinator = SyncCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&central),
        models::reference_data_registry(),
        SyncConfig::default(),
    )
    .unwrap();
    store
        .transaction(|txn| txn.put(models::REFERENCE_DATA, "r1", fields(json!({ "v": 1 }))))
        .unwrap();

    central.set_incoming(vec![ChangeRecord::upsert(
        ChangeDirection::Incoming,
        models::REFERENCE_DATA,
        "r1",
        fields(json!({ "v": "central" })),
    )]);
    let writer = Arc::clone(&store);
    central.on_initiate_pull(move || {
        writer
            .transaction(|txn| txn.put(models::REFERENCE_DATA, "r1", fields(json!({ "v": 2 }))))
            .unwrap();
    });

    let err = coordinator.run_sync().unwrap_err();
    match err {
        SyncError::UpdatedAfterPushSnapshot { records, .. } => {
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].record_id, "r1");
        }
        other => panic!("expected a conflict, got {other}"),
    }

    let row = store.begin_read().get(models::REFERENCE_DATA, "r1").unwrap().unwrap();
    assert_eq!(row.field("v"), Some(&json!(2)));
    assert_eq!(store.get_tick(LAST_SUCCESSFUL_SYNC_PULL).unwrap(), Tick::NEVER);
    assert_eq!(central.errored_sessions().len(), 1);
    assert_eq!(central.call_count(CentralCall::EndSyncSession), 0);
}

#[test]
fn disabled_sync_never_reaches_central() {
    let mut harness = SyncHarness::new();
    harness.add_facility_with("clinic", models::registry(), SyncConfig::disabled());
    let facility = harness.facility(0);
    facility.put(models::REFERENCE_DATA, "r1", json!({ "code": "A" }));

    assert!(matches!(facility.try_sync(), Err(SyncError::Disabled)));
    assert!(harness.central().record(models::REFERENCE_DATA, "r1").is_none());
    assert_eq!(harness.central().tick(), 0);
}

#[test]
fn failed_session_is_reported_to_central() {
    let mut harness = SyncHarness::new();
    harness.add_facility("clinic");
    let facility = harness.facility(0);

    // An incoming live record without data is rejected during apply.
    let session = match harness
        .central()
        .start_sync_session(&StartSessionRequest {
            device_id: "seed".into(),
            protocol_version: PROTOCOL_VERSION,
        })
        .unwrap()
    {
        StartSessionResponse::Started { session_id, .. } => session_id,
        other => panic!("unexpected {other:?}"),
    };
    let mut broken = ChangeRecord::deleted(ChangeDirection::Outgoing, models::PATIENT, "p1");
    broken.is_deleted = false;
    harness
        .central()
        .records()
        .persist(vec![broken], Some(&session));

    let err = facility.try_sync().unwrap_err();
    assert!(matches!(err, SyncError::MalformedRecord { .. }));

    let stats = facility.coordinator().stats();
    assert_eq!(stats.runs_failed, 1);
    assert!(stats.last_error.is_some());
    assert_eq!(harness.central().active_sessions(), 1);
    assert!(facility.row(models::PATIENT, "p1").is_none());
}

#[test]
fn triggered_runs_complete_in_background() {
    let mut harness = SyncHarness::new();
    harness.add_facility("clinic");
    let facility = harness.facility(0);
    facility.put(models::REFERENCE_DATA, "r1", json!({ "code": "A" }));

    facility.coordinator().trigger_sync("test").unwrap();
    assert!(facility.coordinator().wait_until_idle(Duration::from_secs(10)));
    assert_eq!(facility.coordinator().stats().runs_completed, 1);
    assert!(harness.central().record(models::REFERENCE_DATA, "r1").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn scheduler_drives_sync() {
    let mut harness = SyncHarness::new();
    harness.add_facility("clinic");
    let facility = harness.facility(0);
    facility.put(models::REFERENCE_DATA, "r1", json!({ "code": "A" }));
    let coordinator = facility.coordinator().clone();

    let scheduler =
        SyncScheduler::spawn_with_interval(coordinator.clone(), Duration::from_millis(20)).unwrap();
    let mut completed = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if coordinator.stats().runs_completed > 0 {
            completed = true;
            break;
        }
    }
    scheduler.shutdown().await;
    assert!(coordinator.wait_until_idle(Duration::from_secs(10)));

    assert!(completed);
    assert!(harness.central().record(models::REFERENCE_DATA, "r1").is_some());
}

#[test]
fn central_sessions_close_after_runs() {
    let mut harness = SyncHarness::new();
    harness.add_facility("clinic");
    let facility = harness.facility(0);
    let report = facility.sync();
    assert_eq!(
        harness.central().session_status(&report.session_id),
        Some(SessionStatus::Completed)
    );
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn facilities_converge(steps in prop::collection::vec((row_operation_strategy(), any::<bool>()), 1..30)) {
        let mut harness = SyncHarness::new();
        harness.add_facility_with("a", models::reference_data_registry(), SyncConfig::default());
        harness.add_facility_with("b", models::reference_data_registry(), SyncConfig::default());
        let a = harness.facility(0);
        let b = harness.facility(1);

        let mut previous_tick = a.current_tick();
        let mut previous_marks = watermarks(a.store());
        for (operation, sync_after) in &steps {
            match operation {
                RowOperation::Put { id, data } => {
                    a.put(models::REFERENCE_DATA, id, serde_json::Value::Object(data.clone()));
                }
                RowOperation::Delete { id } => {
                    a.store()
                        .transaction(|txn| txn.soft_delete(models::REFERENCE_DATA, id))
                        .unwrap();
                }
            }
            if *sync_after {
                a.sync();
                let current = a.current_tick();
                prop_assert!(current > previous_tick);
                previous_tick = current;

                let (pull, push) = watermarks(a.store());
                prop_assert!(pull >= previous_marks.0 && pull <= current);
                prop_assert!(push >= previous_marks.1 && push <= current);
                previous_marks = (pull, push);
            }
        }
        a.sync();
        b.sync();

        assert_ticks_bounded(a.store());
        assert_ticks_bounded(b.store());
        for (operation, _) in &steps {
            let id = operation.id();
            let Some(source) = a.row(models::REFERENCE_DATA, id) else {
                continue;
            };
            let replica = b.row(models::REFERENCE_DATA, id);
            if source.is_deleted {
                prop_assert!(replica.map_or(true, |r| r.is_deleted));
            } else {
                let replica = replica.unwrap();
                prop_assert!(!replica.is_deleted);
                prop_assert_eq!(&replica.data, &source.data);
            }
        }
    }
}
