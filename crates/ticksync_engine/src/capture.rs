//! Outgoing change capture.
//!
//! Builds the list of rows changed since a tick, across every outgoing
//! model, from one consistent read snapshot. Rows are read page by page
//! and appended to a growable buffer, so a capture of any size runs in
//! constant stack space.

use crate::error::{SyncError, SyncResult};
use crate::registry::{ModelDef, SyncDirection};
use ticksync_protocol::{ChangeDirection, ChangeRecord};
use ticksync_store::{ReadTransaction, Row, Store, Tick};
use tracing::debug;

/// Collects captured records across pages and models.
#[derive(Debug, Default)]
pub struct ChangeAccumulator {
    records: Vec<ChangeRecord>,
    pages: usize,
}

impl ChangeAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one page of rows of a model.
    pub fn extend_page(&mut self, record_type: &str, rows: Vec<Row>) {
        self.pages += 1;
        self.records.reserve(rows.len());
        for row in rows {
            self.records.push(outgoing_change(record_type, row));
        }
    }

    /// Number of records collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of pages appended.
    #[must_use]
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Returns the collected records.
    #[must_use]
    pub fn into_records(self) -> Vec<ChangeRecord> {
        self.records
    }
}

fn outgoing_change(record_type: &str, row: Row) -> ChangeRecord {
    if row.is_deleted {
        ChangeRecord::deleted(ChangeDirection::Outgoing, record_type, row.id)
    } else {
        ChangeRecord::upsert(ChangeDirection::Outgoing, record_type, row.id, row.data)
    }
}

/// Captures outgoing changes with `tick > since` in a fresh read snapshot.
///
/// Models with direction [`SyncDirection::None`] are skipped.
///
/// # Errors
///
/// Returns `InvalidSyncDirection` if any model is incoming-only, before
/// anything is read. Returns a store error if a model's table is missing.
pub fn snapshot_outgoing_changes<'a, I>(
    store: &Store,
    models: I,
    since: Tick,
    batch_size: usize,
) -> SyncResult<Vec<ChangeRecord>>
where
    I: IntoIterator<Item = &'a ModelDef>,
{
    let models: Vec<&ModelDef> = models.into_iter().collect();
    let read = store.begin_read();
    snapshot_outgoing_changes_in(&read, &models, since, batch_size)
}

/// Captures outgoing changes inside an existing read transaction.
///
/// # Errors
///
/// See [`snapshot_outgoing_changes`].
pub fn snapshot_outgoing_changes_in(
    read: &ReadTransaction<'_>,
    models: &[&ModelDef],
    since: Tick,
    batch_size: usize,
) -> SyncResult<Vec<ChangeRecord>> {
    if batch_size == 0 {
        return Err(SyncError::invalid_config("capture batch size must be positive"));
    }
    if let Some(model) = models
        .iter()
        .find(|m| m.sync_direction == SyncDirection::IncomingOnly)
    {
        return Err(SyncError::InvalidSyncDirection {
            record_type: model.record_type.clone(),
            direction: model.sync_direction.to_string(),
        });
    }

    let mut acc = ChangeAccumulator::new();
    for model in models {
        if model.sync_direction == SyncDirection::None {
            continue;
        }
        let mut after: Option<String> = None;
        loop {
            let page = read.changed_since(&model.record_type, since, after.as_deref(), batch_size)?;
            let full = page.len() == batch_size;
            after = page.last().map(|row| row.id.clone());
            acc.extend_page(&model.record_type, page);
            if !full {
                break;
            }
        }
    }

    debug!(
        snapshot = %read.snapshot(),
        since = %since,
        records = acc.len(),
        pages = acc.pages(),
        "captured outgoing changes"
    );
    Ok(acc.into_records())
}
