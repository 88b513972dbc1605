//! Pull phase: fetch central's changes and apply them locally.
//!
//! Pulled records are staged first and applied in one transaction that
//! also advances the pull watermark, so a crash leaves either the old
//! state or the fully applied one.

use crate::changelog::pause_audit;
use crate::context::SyncContext;
use crate::error::{ConflictingRecord, SyncError, SyncResult};
use crate::registry::ModelRegistry;
use crate::transport::CentralServer;
use std::collections::{HashMap, HashSet};
use ticksync_protocol::{ChangeRecord, InitiatePullRequest, PullRequest, SessionId};
use ticksync_store::{
    Fields, RowWrite, Tick, TickStamp, WriteTransaction, CURRENT_TICK, LAST_SUCCESSFUL_SYNC_PULL,
};
use tracing::{debug, error, info, warn};

/// Result of a pull phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullOutcome {
    /// Records received from central.
    pub pulled: u64,
    /// Records written locally.
    pub applied: u64,
    /// Records ignored because their type is not pulled.
    pub skipped: u64,
    /// Central tick the pull covered up to.
    pub pull_until: Tick,
}

/// Pulls every change since the pull watermark and applies it.
///
/// Pulled rows are written without changelog entries and stamped
/// [`Tick::INCOMING_FROM_CENTRAL`], so they are never pushed back. When
/// the conflict assertion is on, the phase aborts if any pulled record
/// of a pulled type targets a local row whose tick is above
/// `session_start_tick`.
///
/// The session's incoming staging table is dropped whether or not the
/// phase succeeds.
///
/// # Errors
///
/// Returns transport, protocol, conflict or store errors. Nothing local
/// changes on failure.
pub fn pull_changes<C: CentralServer + ?Sized>(
    ctx: &SyncContext<'_, C>,
    session_id: &SessionId,
    session_start_tick: Tick,
) -> SyncResult<PullOutcome> {
    ctx.staging.create_incoming_table(session_id);
    let result = pull_into_store(ctx, session_id, session_start_tick);
    ctx.staging.drop_incoming_table(session_id);
    result
}

fn pull_into_store<C: CentralServer + ?Sized>(
    ctx: &SyncContext<'_, C>,
    session_id: &SessionId,
    session_start_tick: Tick,
) -> SyncResult<PullOutcome> {
    let since = ctx.store.get_tick(LAST_SUCCESSFUL_SYNC_PULL)?;

    let metadata = ctx.central.initiate_pull(&InitiatePullRequest {
        session_id: session_id.clone(),
        since: since.as_i64(),
    })?;
    let pull_until = Tick::new(metadata.pull_until);
    info!(
        session_id = %session_id,
        since = %since,
        pull_until = %pull_until,
        total = metadata.total_to_pull,
        "pulling incoming changes"
    );

    let mut offset = 0u64;
    while offset < metadata.total_to_pull {
        let page = ctx
            .central
            .pull(&PullRequest {
                session_id: session_id.clone(),
                offset,
                limit: ctx.config.pull_page_size,
            })?
            .records;
        if page.is_empty() {
            warn!(
                session_id = %session_id,
                offset,
                total = metadata.total_to_pull,
                "central ended the pull early"
            );
            break;
        }
        offset += page.len() as u64;
        debug!(session_id = %session_id, offset, "pulled page");
        ctx.staging.insert_incoming(session_id, page)?;
    }

    let incoming = ctx.staging.incoming(session_id)?;
    let assert_snapshot = ctx.config.assert_no_updates_after_push_snapshot;
    let (applied, skipped) = ctx.store.transaction(|txn| {
        if assert_snapshot {
            assert_not_updated_after_push_snapshot(
                txn,
                ctx.registry,
                &incoming,
                session_start_tick,
            )?;
        }
        pause_audit(txn);
        let counts = apply_incoming(txn, ctx.registry, &incoming)?;

        txn.set_tick(LAST_SUCCESSFUL_SYNC_PULL, since.max(pull_until));
        let current = txn.commit_tick()?;
        if pull_until > current {
            txn.set_tick(CURRENT_TICK, pull_until);
        }
        Ok::<_, SyncError>(counts)
    })?;

    Ok(PullOutcome {
        pulled: incoming.len() as u64,
        applied,
        skipped,
        pull_until,
    })
}

/// Only records of pulled types are checked; the others are skipped by
/// the apply and never overwrite anything.
fn assert_not_updated_after_push_snapshot(
    txn: &WriteTransaction<'_>,
    registry: &ModelRegistry,
    incoming: &[ChangeRecord],
    snapshot_tick: Tick,
) -> SyncResult<()> {
    let pulled: HashSet<&str> = registry
        .incoming_models()
        .into_iter()
        .map(|m| m.record_type.as_str())
        .collect();
    let mut conflicts = Vec::new();
    for record in incoming {
        if !pulled.contains(record.record_type.as_str()) || !txn.has_table(&record.record_type)
        {
            continue;
        }
        if let Some(row) = txn.get(&record.record_type, &record.record_id)? {
            if row.tick > snapshot_tick {
                conflicts.push(ConflictingRecord {
                    record_type: record.record_type.clone(),
                    record_id: record.record_id.clone(),
                    local_tick: row.tick,
                });
            }
        }
    }
    if conflicts.is_empty() {
        return Ok(());
    }

    for conflict in &conflicts {
        error!(
            category = "conflict",
            record_type = %conflict.record_type,
            record_id = %conflict.record_id,
            local_tick = %conflict.local_tick,
            snapshot_tick = %snapshot_tick,
            "pulled record was updated locally after the push snapshot"
        );
    }
    Err(SyncError::UpdatedAfterPushSnapshot {
        snapshot_tick,
        records: conflicts,
    })
}

/// Writes upserts parents-first, then deletions children-first.
fn apply_incoming(
    txn: &mut WriteTransaction<'_>,
    registry: &ModelRegistry,
    incoming: &[ChangeRecord],
) -> SyncResult<(u64, u64)> {
    let mut by_type: HashMap<&str, Vec<&ChangeRecord>> = HashMap::new();
    for record in incoming {
        by_type
            .entry(record.record_type.as_str())
            .or_default()
            .push(record);
    }

    let models = registry.incoming_models();
    let mut applied = 0u64;

    for model in &models {
        let Some(records) = by_type.get(model.record_type.as_str()) else {
            continue;
        };
        for record in records.iter().filter(|r| !r.is_deleted) {
            let data = record.data.clone().ok_or_else(|| SyncError::MalformedRecord {
                record_type: record.record_type.clone(),
                record_id: record.record_id.clone(),
                reason: "live record without data".into(),
            })?;
            txn.write(
                &model.record_type,
                RowWrite::upsert(record.record_id.clone(), data)
                    .stamped(TickStamp::Fixed(Tick::INCOMING_FROM_CENTRAL)),
            )?;
            applied += 1;
        }
    }

    for model in models.iter().rev() {
        let Some(records) = by_type.get(model.record_type.as_str()) else {
            continue;
        };
        for record in records.iter().filter(|r| r.is_deleted) {
            // Deletions of rows never seen locally land as tombstones.
            let data = match &record.data {
                Some(data) => Some(data.clone()),
                None if txn.get(&model.record_type, &record.record_id)?.is_none() => {
                    Some(Fields::new())
                }
                None => None,
            };
            let write = RowWrite {
                id: record.record_id.clone(),
                data,
                is_deleted: true,
                stamp: TickStamp::Fixed(Tick::INCOMING_FROM_CENTRAL),
            };
            if txn.write(&model.record_type, write)? {
                applied += 1;
            }
        }
    }

    let mut skipped = 0u64;
    for (record_type, records) in &by_type {
        if !models.iter().any(|m| m.record_type == *record_type) {
            warn!(
                record_type = %record_type,
                count = records.len(),
                "skipping pulled records of a type that is not pulled"
            );
            skipped += records.len() as u64;
        }
    }

    Ok((applied, skipped))
}
