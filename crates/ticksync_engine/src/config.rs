//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use std::time::Duration;

/// Rows read per page while capturing outgoing changes.
pub const DEFAULT_SNAPSHOT_BATCH_SIZE: usize = 10_000;

/// Configuration for sync runs.
///
/// Injected into the coordinator at construction. Tests swap it per case
/// with `override_config` / `restore_config`.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Whether triggers start runs at all.
    pub enabled: bool,
    /// Records per push call.
    pub push_batch_size: u32,
    /// Records requested per pull page.
    pub pull_page_size: u32,
    /// Rows read per page while capturing.
    pub snapshot_batch_size: usize,
    /// Period of the background scheduler.
    pub sync_interval: Duration,
    /// Abort a pull that would overwrite rows changed after the push
    /// snapshot.
    pub assert_no_updates_after_push_snapshot: bool,
}

impl SyncConfig {
    /// Creates an enabled configuration with default sizes.
    pub fn new() -> Self {
        Self {
            enabled: true,
            push_batch_size: 100,
            pull_page_size: 100,
            snapshot_batch_size: DEFAULT_SNAPSHOT_BATCH_SIZE,
            sync_interval: Duration::from_secs(60),
            assert_no_updates_after_push_snapshot: true,
        }
    }

    /// Creates a disabled configuration.
    pub fn disabled() -> Self {
        Self::new().with_enabled(false)
    }

    /// Enables or disables sync.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the push batch size.
    pub fn with_push_batch_size(mut self, size: u32) -> Self {
        self.push_batch_size = size;
        self
    }

    /// Sets the pull page size.
    pub fn with_pull_page_size(mut self, size: u32) -> Self {
        self.pull_page_size = size;
        self
    }

    /// Sets the capture page size.
    pub fn with_snapshot_batch_size(mut self, size: usize) -> Self {
        self.snapshot_batch_size = size;
        self
    }

    /// Sets the scheduler period.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Turns the pull conflict assertion on or off.
    pub fn with_conflict_assertion(mut self, enabled: bool) -> Self {
        self.assert_no_updates_after_push_snapshot = enabled;
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero batch/page size or interval.
    pub fn validate(&self) -> SyncResult<()> {
        if self.push_batch_size == 0 {
            return Err(SyncError::invalid_config("push_batch_size must be positive"));
        }
        if self.pull_page_size == 0 {
            return Err(SyncError::invalid_config("pull_page_size must be positive"));
        }
        if self.snapshot_batch_size == 0 {
            return Err(SyncError::invalid_config(
                "snapshot_batch_size must be positive",
            ));
        }
        if self.sync_interval.is_zero() {
            return Err(SyncError::invalid_config("sync_interval must be positive"));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
