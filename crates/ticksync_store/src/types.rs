//! Core type definitions for the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing and never reused
/// within one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Sequence number for ordering commits.
///
/// Sequence numbers provide total ordering of committed transactions.
/// A snapshot at sequence `s` sees exactly the commits numbered `<= s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// A logical clock value.
///
/// Every committed write to a synced table is stamped with the node's
/// current tick. Ticks are signed so that `-1` can stand for "never"
/// and for rows that arrived from the central node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Tick(pub i64);

impl Tick {
    /// Watermark value meaning "no successful sync yet".
    pub const NEVER: Tick = Tick(-1);

    /// Stamp for rows written by applying changes pulled from central.
    ///
    /// Lower than any watermark, so such rows are never captured as
    /// outgoing changes.
    pub const INCOMING_FROM_CENTRAL: Tick = Tick(-1);

    /// Creates a new tick.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw tick value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns the tick advanced by `by`, saturating at the maximum.
    #[must_use]
    pub const fn advanced(self, by: i64) -> Self {
        Self(self.0.saturating_add(by))
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Tick {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Tick)
    }
}

impl From<i64> for Tick {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_ordering() {
        let t1 = TransactionId::new(1);
        let t2 = TransactionId::new(2);
        assert!(t1 < t2);
    }

    #[test]
    fn sequence_number_next() {
        let s1 = SequenceNumber::new(5);
        let s2 = s1.next();
        assert_eq!(s2.as_u64(), 6);
        assert_eq!(format!("{s2}"), "seq:6");
    }

    #[test]
    fn tick_parse_and_display() {
        let tick: Tick = " 42 ".parse().unwrap();
        assert_eq!(tick, Tick::new(42));
        assert_eq!(tick.to_string(), "42");
        assert!("forty".parse::<Tick>().is_err());
    }

    #[test]
    fn tick_sentinels_sort_first() {
        assert!(Tick::INCOMING_FROM_CENTRAL < Tick::new(0));
        assert!(Tick::NEVER <= Tick::INCOMING_FROM_CENTRAL);
        assert_eq!(Tick::new(i64::MAX).advanced(1), Tick::new(i64::MAX));
    }
}
