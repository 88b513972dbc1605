//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores, the
//! model registry most tests sync, and common data scenarios.

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use ticksync_engine::{ModelDef, ModelRegistry, SyncDirection};
use ticksync_store::{Fields, Row, Store, StoreConfig};

/// Model names used by [`models::registry`].
pub mod models {
    use super::*;

    /// Pulled from central only.
    pub const FACILITY: &str = "facility";
    /// Shared lookup data, edited on both sides.
    pub const REFERENCE_DATA: &str = "reference_data";
    /// Edited on both sides; refers to reference data.
    pub const PATIENT: &str = "patient";
    /// Edited on both sides; refers to patients and facilities.
    pub const ENCOUNTER: &str = "encounter";
    /// Captured on the facility and pushed only.
    pub const SURVEY_RESPONSE: &str = "survey_response";
    /// Never synced.
    pub const LOCAL_SETTING: &str = "local_setting";

    /// Returns a registry covering every sync direction.
    pub fn registry() -> ModelRegistry {
        ModelRegistry::new([
            ModelDef::new(ENCOUNTER, SyncDirection::Bidirectional).depends_on([PATIENT, FACILITY]),
            ModelDef::new(SURVEY_RESPONSE, SyncDirection::OutgoingOnly).depends_on([ENCOUNTER]),
            ModelDef::new(PATIENT, SyncDirection::Bidirectional).depends_on([REFERENCE_DATA]),
            ModelDef::new(FACILITY, SyncDirection::IncomingOnly),
            ModelDef::new(REFERENCE_DATA, SyncDirection::Bidirectional),
            ModelDef::new(LOCAL_SETTING, SyncDirection::None),
        ])
        .expect("test registry is valid")
    }

    /// Returns a registry with only `reference_data`.
    pub fn reference_data_registry() -> ModelRegistry {
        ModelRegistry::new([ModelDef::new(REFERENCE_DATA, SyncDirection::Bidirectional)])
            .expect("test registry is valid")
    }
}

/// Builds a column map from a JSON object literal.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A test store with automatic cleanup.
pub struct TestStore {
    store: Arc<Store>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self::memory_with(StoreConfig::default())
    }

    /// Creates a new in-memory test store with `config`.
    pub fn memory_with(config: StoreConfig) -> Self {
        Self {
            store: Arc::new(Store::open_in_memory_with(config)),
            temp_dir: None,
        }
    }

    /// Creates a new file-backed test store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Store::open(temp_dir.path(), StoreConfig::default())
            .expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if file-backed, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Returns a shared handle to the store.
    pub fn shared(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// Creates the table and writes a live row, stamped at commit.
    pub fn put(&self, table: &str, id: &str, value: Value) {
        self.store.ensure_table(table).expect("Failed to create table");
        self.store
            .transaction(|txn| txn.put(table, id, fields(value)))
            .expect("Failed to put row");
    }

    /// Soft-deletes a row.
    pub fn delete(&self, table: &str, id: &str) {
        self.store
            .transaction(|txn| txn.soft_delete(table, id))
            .expect("Failed to delete row");
    }

    /// Reads a row from the latest committed state.
    pub fn row(&self, table: &str, id: &str) -> Option<Row> {
        self.store
            .begin_read()
            .get(table, id)
            .expect("Failed to read row")
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```
/// use ticksync_testkit::with_temp_store;
///
/// with_temp_store(|store| {
///     store.ensure_table("reference_data").unwrap();
///     assert!(store.has_table("reference_data"));
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store)
}

/// Runs a test with a temporary file-backed store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store
        .path()
        .expect("File store should have a path")
        .to_path_buf();
    f(&test_store, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use serde_json::json;

    /// Creates a store with `count` reference data rows, committed one per
    /// transaction.
    pub fn populated_store(count: usize) -> TestStore {
        let test_store = TestStore::memory();
        for i in 0..count {
            test_store.put(
                models::REFERENCE_DATA,
                &format!("ref-{i:04}"),
                json!({ "id": format!("ref-{i:04}"), "code": format!("C{i}") }),
            );
        }
        test_store
    }

    /// Creates a store with the tables of [`models::registry`] and one
    /// patient with an encounter.
    pub fn clinic_store() -> TestStore {
        let test_store = TestStore::memory();
        models::registry()
            .ensure_tables(&test_store)
            .expect("Failed to create tables");
        test_store.put(
            models::REFERENCE_DATA,
            "village-1",
            json!({ "id": "village-1", "type": "village", "name": "Kinondoni" }),
        );
        test_store.put(
            models::PATIENT,
            "patient-1",
            json!({ "id": "patient-1", "villageId": "village-1" }),
        );
        test_store.put(
            models::ENCOUNTER,
            "encounter-1",
            json!({ "id": "encounter-1", "patientId": "patient-1" }),
        );
        test_store
    }
}
