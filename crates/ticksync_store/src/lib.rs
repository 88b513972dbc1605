//! # ticksync store
//!
//! Embedded multi-version row store backing a facility node.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌───────────────────┐
//! │ReadTransaction│   │ WriteTransaction  │ (single writer, WriteContext)
//! └──────┬────────┘   └────────┬──────────┘
//!        │ snapshot seq        │ commit: stamp ticks, build changelog
//!        ▼                     ▼
//! ┌──────────────────────────────────────┐
//! │ StoreState: versioned tables, facts, │
//! │ changelog                            │
//! └──────────────────┬───────────────────┘
//!                    │ append + flush
//!                    ▼
//!            CommitLog → StorageBackend (memory | file)
//! ```
//!
//! ## Key Invariants
//!
//! - A read transaction sees exactly the commits published before it began.
//! - Row writes are stamped with the `currentTick` fact visible at commit.
//! - Each row write produces one changelog entry unless the transaction's
//!   [`WriteContext`] had `audit_paused` set when the write was made, or
//!   capture is disabled store-wide.
//! - A fact update is durable once the committing call returns.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod audit;
mod config;
mod dir;
mod error;
mod facts;
mod log;
mod row;
mod state;
mod storage;
mod store;
mod transaction;
mod types;

pub use audit::{AuditEntry, AuditOperation};
pub use config::StoreConfig;
pub use dir::StoreDir;
pub use error::{StoreError, StoreResult};
pub use facts::{CURRENT_TICK, DEVICE_ID, LAST_SUCCESSFUL_SYNC_PULL, LAST_SUCCESSFUL_SYNC_PUSH};
pub use row::{Fields, Row, RowWrite, TickStamp};
pub use storage::{FileBackend, InMemoryBackend, StorageBackend};
pub use store::Store;
pub use transaction::{ReadTransaction, WriteContext, WriteTransaction};
pub use types::{SequenceNumber, Tick, TransactionId};
