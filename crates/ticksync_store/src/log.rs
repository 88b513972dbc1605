//! Append-only commit log.
//!
//! Every committed write transaction becomes one framed record:
//!
//! ```text
//! | magic "TSCL" (4) | payload length u32 LE (4) | CBOR payload | crc32 LE (4) |
//! ```
//!
//! The CRC covers the magic, the length and the payload. On replay the
//! first incomplete or mismatching frame ends the log: it is treated as a
//! torn write and truncated away.

use crate::audit::AuditEntry;
use crate::error::{StoreError, StoreResult};
use crate::row::Row;
use crate::storage::StorageBackend;
use crate::types::{SequenceNumber, TransactionId};
use serde::{Deserialize, Serialize};

const LOG_MAGIC: [u8; 4] = *b"TSCL";
const HEADER_SIZE: usize = 8;
const CRC_SIZE: usize = 4;

/// A row version written by a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CommittedRow {
    pub table: String,
    pub row: Row,
}

/// Everything one transaction committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CommitRecord {
    pub seq: SequenceNumber,
    pub txid: TransactionId,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub rows: Vec<CommittedRow>,
    #[serde(default)]
    pub facts: Vec<(String, String)>,
    #[serde(default)]
    pub changelog: Vec<AuditEntry>,
}

/// Writes and replays commit records on a storage backend.
pub(crate) struct CommitLog {
    backend: Box<dyn StorageBackend>,
    sync_on_commit: bool,
}

impl CommitLog {
    pub(crate) fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend,
            sync_on_commit,
        }
    }

    /// Appends a record and returns its offset.
    pub(crate) fn append(&mut self, record: &CommitRecord) -> StoreResult<u64> {
        let mut payload = Vec::new();
        ciborium::into_writer(record, &mut payload)
            .map_err(|e| StoreError::codec(format!("failed to encode commit: {e}")))?;

        let len = u32::try_from(payload.len())
            .map_err(|_| StoreError::invalid_operation("commit record too large"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&LOG_MAGIC);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        let offset = self.backend.append(&frame)?;
        if self.sync_on_commit {
            self.backend.flush()?;
        }
        Ok(offset)
    }

    /// Reads every intact record, truncating a torn tail.
    pub(crate) fn replay(&mut self) -> StoreResult<Vec<CommitRecord>> {
        let size = self.backend.size()?;
        let mut records = Vec::new();
        let mut offset = 0u64;

        while offset < size {
            match self.read_frame(offset, size)? {
                Some((record, frame_len)) => {
                    records.push(record);
                    offset += frame_len;
                }
                None => {
                    tracing::warn!(offset, size, "dropping torn commit log tail");
                    self.backend.truncate(offset)?;
                    break;
                }
            }
        }

        Ok(records)
    }

    fn read_frame(&self, offset: u64, size: u64) -> StoreResult<Option<(CommitRecord, u64)>> {
        if size - offset < (HEADER_SIZE + CRC_SIZE) as u64 {
            return Ok(None);
        }

        let header = self.backend.read_at(offset, HEADER_SIZE)?;
        if header[..4] != LOG_MAGIC {
            return Ok(None);
        }
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let frame_len = (HEADER_SIZE + len + CRC_SIZE) as u64;
        if size - offset < frame_len {
            return Ok(None);
        }

        let frame = self.backend.read_at(offset, HEADER_SIZE + len + CRC_SIZE)?;
        let (body, crc_bytes) = frame.split_at(HEADER_SIZE + len);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if compute_crc32(body) != expected {
            return Ok(None);
        }

        let record: CommitRecord = ciborium::from_reader(&body[HEADER_SIZE..]).map_err(|e| {
            StoreError::log_corruption(format!("undecodable commit at offset {offset}: {e}"))
        })?;

        Ok(Some((record, frame_len)))
    }
}

/// CRC32 (IEEE polynomial).
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
