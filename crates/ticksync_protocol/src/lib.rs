//! # ticksync protocol
//!
//! Wire types exchanged between a facility node and the central node.
//!
//! This crate provides:
//! - [`ChangeRecord`], the unit of replication in both directions
//! - Session, pull and push request/response messages
//! - CBOR encoding via [`WireMessage`]
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod codec;
mod error;
mod messages;

pub use change::{ChangeDirection, ChangeRecord, ChangelogOperation, ChangelogRecord, RecordData};
pub use codec::{from_cbor, to_cbor, WireMessage};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    Ack, InitiatePullRequest, MarkErroredRequest, PullMetadata, PullRequest, PullResponse,
    PushAck, PushRequest, QueueStatus, SessionId, SessionRequest, StartSessionRequest,
    StartSessionResponse,
};

/// Current protocol version.
pub const PROTOCOL_VERSION: u16 = 1;
