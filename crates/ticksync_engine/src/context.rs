//! Shared inputs of the push and pull phases.

use crate::config::SyncConfig;
use crate::registry::ModelRegistry;
use crate::staging::StagingSchema;
use crate::transport::CentralServer;
use ticksync_store::Store;

/// Everything a sync phase reads or writes.
pub struct SyncContext<'a, C: CentralServer + ?Sized> {
    /// Local store.
    pub store: &'a Store,
    /// Syncable models.
    pub registry: &'a ModelRegistry,
    /// Central node.
    pub central: &'a C,
    /// Run-scoped staging.
    pub staging: &'a StagingSchema,
    /// Effective configuration for this run.
    pub config: &'a SyncConfig,
}
