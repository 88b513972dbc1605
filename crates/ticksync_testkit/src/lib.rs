//! # ticksync testkit
//!
//! Test utilities for ticksync.
//!
//! This crate provides:
//! - Test fixtures and store helpers
//! - A model registry covering every sync direction
//! - Property-based test generators using proptest
//! - A harness wiring facilities to a central node over the HTTP
//!   transport
//!
//! ## Usage
//!
//! ```rust
//! use serde_json::json;
//! use ticksync_testkit::prelude::*;
//!
//! let mut harness = SyncHarness::new();
//! let facility = harness.add_facility("clinic");
//! facility.put(models::REFERENCE_DATA, "r1", json!({ "code": "A" }));
//! assert_eq!(facility.sync().pushed, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
