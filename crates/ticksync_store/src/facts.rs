//! Tick store: durable local facts.
//!
//! Facts are small string key/value pairs versioned like rows. The store
//! operations below each run in their own committed transaction, so a
//! value returned from `set_fact` or `increment_fact` is already durable.
//! Inside an open [`WriteTransaction`] the same facts can be read and
//! updated atomically with row writes.

use crate::error::{StoreError, StoreResult};
use crate::store::Store;
use crate::transaction::WriteTransaction;
use crate::types::Tick;
use uuid::Uuid;

/// Next tick to stamp local writes with.
pub const CURRENT_TICK: &str = "currentTick";
/// Highest central tick fully applied locally.
pub const LAST_SUCCESSFUL_SYNC_PULL: &str = "lastSuccessfulSyncPull";
/// Highest local tick fully acknowledged by central.
pub const LAST_SUCCESSFUL_SYNC_PUSH: &str = "lastSuccessfulSyncPush";
/// Stable identifier of this node.
pub const DEVICE_ID: &str = "deviceId";

fn parse_tick(key: &str, value: String) -> StoreResult<Tick> {
    value.parse().map_err(|_| StoreError::NonNumericFact {
        key: key.to_string(),
        value,
    })
}

impl Store {
    /// Reads the latest committed value of a fact.
    ///
    /// # Errors
    ///
    /// Infallible today; kept fallible so backends may load lazily.
    pub fn get_fact(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.state().read().fact_latest(key).cloned())
    }

    /// Durably sets a fact.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn set_fact(&self, key: &str, value: impl Into<String>) -> StoreResult<()> {
        let value = value.into();
        self.transaction(|txn| {
            txn.set_fact(key, value);
            Ok(())
        })
    }

    /// Atomically adds `by` to a numeric fact and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns `NonNumericFact` if the stored value is not an integer, or
    /// an error if the commit fails.
    pub fn increment_fact(&self, key: &str, by: i64) -> StoreResult<i64> {
        self.transaction(|txn| txn.increment_fact(key, by))
    }

    /// Reads a tick fact, `Tick::NEVER` when absent.
    ///
    /// # Errors
    ///
    /// Returns `NonNumericFact` if the stored value is not an integer.
    pub fn get_tick(&self, key: &str) -> StoreResult<Tick> {
        match self.get_fact(key)? {
            Some(value) => parse_tick(key, value),
            None => Ok(Tick::NEVER),
        }
    }

    /// Reads the current tick, zero when never set.
    ///
    /// # Errors
    ///
    /// Returns `NonNumericFact` if the stored value is not an integer.
    pub fn current_tick(&self) -> StoreResult<Tick> {
        match self.get_fact(CURRENT_TICK)? {
            Some(value) => parse_tick(CURRENT_TICK, value),
            None => Ok(Tick::new(0)),
        }
    }

    /// Returns this node's device identifier, generating it on first use.
    ///
    /// The identifier is `<device_class>-<uuid>` and never changes once
    /// committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the first-use commit fails.
    pub fn device_id(&self) -> StoreResult<String> {
        if let Some(id) = self.get_fact(DEVICE_ID)? {
            return Ok(id);
        }
        let class = self.config().device_class.clone();
        self.transaction(|txn| {
            if let Some(id) = txn.fact(DEVICE_ID) {
                return Ok(id);
            }
            let id = format!("{class}-{}", Uuid::new_v4());
            txn.set_fact(DEVICE_ID, id.clone());
            Ok(id)
        })
    }
}

impl WriteTransaction<'_> {
    /// Reads a tick fact, `Tick::NEVER` when absent.
    ///
    /// # Errors
    ///
    /// Returns `NonNumericFact` if the stored value is not an integer.
    pub fn tick(&self, key: &str) -> StoreResult<Tick> {
        match self.fact(key) {
            Some(value) => parse_tick(key, value),
            None => Ok(Tick::NEVER),
        }
    }

    /// Sets a tick fact.
    pub fn set_tick(&mut self, key: &str, tick: Tick) {
        self.set_fact(key, tick.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use tempfile::tempdir;

    #[test]
    fn get_set_increment() {
        let store = Store::open_in_memory();
        assert_eq!(store.get_fact("counter").unwrap(), None);

        store.set_fact("counter", "5").unwrap();
        assert_eq!(store.get_fact("counter").unwrap().as_deref(), Some("5"));

        assert_eq!(store.increment_fact("counter", 1).unwrap(), 6);
        assert_eq!(store.increment_fact("counter", 10).unwrap(), 16);
        assert_eq!(store.increment_fact("fresh", 1).unwrap(), 1);
    }

    #[test]
    fn increment_rejects_text() {
        let store = Store::open_in_memory();
        store.set_fact("name", "facility").unwrap();
        assert!(matches!(
            store.increment_fact("name", 1),
            Err(StoreError::NonNumericFact { .. })
        ));
    }

    #[test]
    fn tick_defaults() {
        let store = Store::open_in_memory();
        assert_eq!(store.get_tick(LAST_SUCCESSFUL_SYNC_PULL).unwrap(), Tick::NEVER);
        assert_eq!(store.current_tick().unwrap(), Tick::new(0));
    }

    #[test]
    fn facts_survive_restart() {
        let dir = tempdir().unwrap();
        let device = {
            let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
            store.set_fact(CURRENT_TICK, "41").unwrap();
            store.increment_fact(CURRENT_TICK, 1).unwrap();
            store.device_id().unwrap()
        };

        let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.current_tick().unwrap(), Tick::new(42));
        assert_eq!(store.device_id().unwrap(), device);
    }

    #[test]
    fn device_id_has_class_prefix() {
        let store = Store::open_in_memory_with(StoreConfig::new().with_device_class("facility"));
        let id = store.device_id().unwrap();
        assert!(id.starts_with("facility-"));
        assert_eq!(store.device_id().unwrap(), id);
    }
}
