//! Cross-crate integration test helpers.
//!
//! A [`SyncHarness`] wires one central node to any number of facilities.
//! Each facility talks to central through the HTTP transport over an
//! in-process loopback, so every run exercises the CBOR wire format.

use crate::fixtures::{fields, models, TestStore};
use serde_json::Value;
use std::sync::Arc;
use ticksync_central::{CentralConfig, CentralNode};
use ticksync_engine::{
    HttpCentralServer, LoopbackClient, ModelRegistry, SyncConfig, SyncCoordinator, SyncReport,
    SyncResult, SyncRunOutcome,
};
use ticksync_store::{Row, Store, Tick};

/// Transport a harness facility uses to reach central.
pub type LoopbackCentral = HttpCentralServer<LoopbackClient<Arc<CentralNode>>>;

/// Base URL facilities are configured with.
pub const CENTRAL_URL: &str = "http://central.test";

/// One facility: a store and the coordinator syncing it.
pub struct TestFacility {
    /// Name given at creation.
    pub name: String,
    store: TestStore,
    coordinator: SyncCoordinator<LoopbackCentral>,
}

impl TestFacility {
    /// Returns the facility store.
    pub fn store(&self) -> &Arc<Store> {
        self.coordinator.store()
    }

    /// Returns the coordinator.
    pub fn coordinator(&self) -> &SyncCoordinator<LoopbackCentral> {
        &self.coordinator
    }

    /// Writes a live row locally.
    pub fn put(&self, table: &str, id: &str, value: Value) {
        self.store.put(table, id, value);
    }

    /// Soft-deletes a row locally.
    pub fn delete(&self, table: &str, id: &str) {
        self.store.delete(table, id);
    }

    /// Reads a row.
    pub fn row(&self, table: &str, id: &str) -> Option<Row> {
        self.store.row(table, id)
    }

    /// Returns the local `currentTick`.
    pub fn current_tick(&self) -> Tick {
        self.store.current_tick().expect("Failed to read current tick")
    }

    /// Runs one sync.
    pub fn try_sync(&self) -> SyncResult<SyncRunOutcome> {
        self.coordinator.run_sync()
    }

    /// Runs one sync and returns its report.
    ///
    /// # Panics
    ///
    /// Panics if the run fails or central queues it.
    pub fn sync(&self) -> SyncReport {
        match self.try_sync() {
            Ok(SyncRunOutcome::Completed(report)) => report,
            Ok(SyncRunOutcome::Queued { status }) => {
                panic!("{}: sync was queued ({status:?})", self.name)
            }
            Err(err) => panic!("{}: sync failed: {err}", self.name),
        }
    }
}

/// A central node and the facilities syncing with it.
pub struct SyncHarness {
    central: Arc<CentralNode>,
    facilities: Vec<TestFacility>,
}

impl SyncHarness {
    /// Creates a harness with a default central node.
    pub fn new() -> Self {
        Self::with_config(CentralConfig::default())
    }

    /// Creates a harness with a configured central node.
    pub fn with_config(config: CentralConfig) -> Self {
        Self {
            central: Arc::new(CentralNode::new(config)),
            facilities: Vec::new(),
        }
    }

    /// Returns the central node.
    pub fn central(&self) -> &Arc<CentralNode> {
        &self.central
    }

    /// Adds a facility syncing [`models::registry`] with default settings.
    pub fn add_facility(&mut self, name: &str) -> &TestFacility {
        self.add_facility_with(name, models::registry(), SyncConfig::default())
    }

    /// Adds a facility with its own registry and sync settings.
    pub fn add_facility_with(
        &mut self,
        name: &str,
        registry: ModelRegistry,
        config: SyncConfig,
    ) -> &TestFacility {
        let store = TestStore::memory();
        let transport = HttpCentralServer::new(
            CENTRAL_URL,
            LoopbackClient::new(Arc::clone(&self.central)),
        );
        let coordinator =
            SyncCoordinator::new(store.shared(), Arc::new(transport), registry, config)
                .expect("Failed to create coordinator");
        self.facilities.push(TestFacility {
            name: name.to_string(),
            store,
            coordinator,
        });
        let index = self.facilities.len() - 1;
        &self.facilities[index]
    }

    /// Returns the facility added at `index`.
    pub fn facility(&self, index: usize) -> &TestFacility {
        &self.facilities[index]
    }

    /// Returns the number of facilities.
    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    /// Returns true if no facility was added.
    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    /// Writes a row on the central side.
    pub fn put_central(&self, table: &str, id: &str, value: Value) -> i64 {
        self.central.records().upsert(table, id, fields(value))
    }

    /// Soft-deletes a row on the central side.
    pub fn delete_central(&self, table: &str, id: &str) -> i64 {
        self.central.records().delete(table, id)
    }

    /// Syncs every facility once, in creation order.
    pub fn sync_all(&self) -> Vec<SyncReport> {
        self.facilities.iter().map(TestFacility::sync).collect()
    }
}

impl Default for SyncHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn facility_push_reaches_central() {
        let mut harness = SyncHarness::new();
        let facility = harness.add_facility("clinic");
        facility.put(models::REFERENCE_DATA, "r1", json!({ "code": "A" }));

        let report = facility.sync();
        assert_eq!(report.pushed, 1);
        assert!(harness.central().record(models::REFERENCE_DATA, "r1").is_some());
    }

    #[test]
    fn central_row_reaches_facility() {
        let mut harness = SyncHarness::new();
        harness.put_central(models::FACILITY, "f1", json!({ "name": "Clinic" }));
        let facility = harness.add_facility("clinic");

        let report = facility.sync();
        assert_eq!(report.pulled, 1);
        let row = facility.row(models::FACILITY, "f1").unwrap();
        assert_eq!(row.tick, Tick::INCOMING_FROM_CENTRAL);
    }

    #[test]
    fn sync_all_runs_every_facility() {
        let mut harness = SyncHarness::new();
        harness.add_facility("a");
        harness.add_facility("b");
        assert_eq!(harness.sync_all().len(), 2);
        assert_eq!(harness.central().active_sessions(), 0);
    }
}
