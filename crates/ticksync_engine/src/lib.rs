//! # ticksync engine
//!
//! Facility-side sync engine: replicates rows between a facility store and
//! a central node using logical tick clocks.
//!
//! This crate provides:
//! - Model registry with sync directions and dependency order
//! - Outgoing change capture with changelog attachment
//! - Push and pull phases over a [`CentralServer`] transport
//! - A single-flight [`SyncCoordinator`] and a periodic [`SyncScheduler`]
//! - HTTP transport abstraction with CBOR bodies
//!
//! ## Architecture
//!
//! The engine runs a **push-then-pull** session:
//! 1. Roll the local clock so the push snapshot has a fixed upper bound
//! 2. Push local rows changed since the push watermark
//! 3. Pull central rows changed since the pull watermark and apply them
//!    without changelog entries
//!
//! ## Key Invariants
//!
//! - At most one run executes at a time; triggers during a run collapse
//!   into a single rerun
//! - Pulled rows are stamped so they are never captured as outgoing
//! - A watermark only moves after its phase fully succeeded
//! - A pull never overwrites a row edited after the push snapshot

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod capture;
mod changelog;
mod config;
mod context;
mod coordinator;
mod error;
mod http;
mod pull;
mod push;
mod registry;
mod scheduler;
mod staging;
mod state;
mod transport;

pub use capture::{snapshot_outgoing_changes, snapshot_outgoing_changes_in, ChangeAccumulator};
pub use changelog::{attach_changelog_to_snapshot_records, pause_audit, ChangelogOptions};
pub use config::{SyncConfig, DEFAULT_SNAPSHOT_BATCH_SIZE};
pub use context::SyncContext;
pub use coordinator::SyncCoordinator;
pub use error::{ConflictingRecord, ErrorCategory, SyncError, SyncResult};
pub use http::{paths, HttpCentralServer, HttpClient, LoopbackClient, LoopbackServer};
pub use pull::{pull_changes, PullOutcome};
pub use push::{push_changes, PushOutcome};
pub use registry::{ModelDef, ModelRegistry, SyncDirection};
pub use scheduler::SyncScheduler;
pub use staging::StagingSchema;
pub use state::{CoordinatorState, SyncReport, SyncRunOutcome, SyncStats, TriggerOutcome};
pub use transport::{CentralCall, CentralServer, MockCentral};
