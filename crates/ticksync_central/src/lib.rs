//! # ticksync central
//!
//! Reference central node for ticksync.
//!
//! This crate provides:
//! - The session RPCs (start, initiate pull, pull, push, complete push,
//!   end, mark errored)
//! - An in-memory record store stamped with a tick-tock clock
//! - Session queueing per device and per node
//!
//! # Architecture
//!
//! The central node keeps:
//! - The latest version of every row with the tick it was written at
//! - Which session pushed each version, so a facility never pulls its own
//!   push back
//! - The changelog entries facilities attached to their pushes
//!
//! # Protocol
//!
//! A facility runs push-then-pull inside one session:
//! 1. `start_sync_session` opens a session or queues the device
//! 2. `push` buffers records, `complete_push` persists them under one tick
//! 3. `initiate_pull` freezes the rows changed since the facility's pull
//!    watermark, `pull` pages through them
//! 4. `end_sync_session` or `mark_session_errored` closes the session

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod records;
mod server;

pub use config::CentralConfig;
pub use error::{CentralError, CentralResult};
pub use handler::{HandlerContext, RequestHandler, SessionStatus};
pub use records::{CentralRecord, CentralRecords, PullSnapshot, TickTock};
pub use server::CentralNode;
