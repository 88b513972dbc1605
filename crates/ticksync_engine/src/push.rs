//! Push phase: capture local changes and send them to central.

use crate::capture::snapshot_outgoing_changes;
use crate::changelog::{attach_changelog_to_snapshot_records, ChangelogOptions};
use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::transport::CentralServer;
use ticksync_protocol::{PushRequest, SessionId, SessionRequest};
use ticksync_store::{Tick, LAST_SUCCESSFUL_SYNC_PUSH};
use tracing::{debug, info};

/// Result of a push phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// Records sent to central.
    pub pushed: u64,
    /// Push watermark the capture started from.
    pub since: Tick,
    /// Push watermark after the phase.
    pub watermark: Tick,
}

/// Captures every outgoing change since the push watermark, sends it in
/// batches, and advances the watermark to `session_start_tick`.
///
/// Rows are captured from one read snapshot, so a row written while the
/// push is in flight is left for the next run. The watermark only moves
/// after central acknowledged `complete_push`.
///
/// # Errors
///
/// Returns capture, transport or store errors. Nothing local changes on
/// failure.
pub fn push_changes<C: CentralServer + ?Sized>(
    ctx: &SyncContext<'_, C>,
    session_id: &SessionId,
    session_start_tick: Tick,
) -> SyncResult<PushOutcome> {
    let since = ctx.store.get_tick(LAST_SUCCESSFUL_SYNC_PUSH)?;

    let snapshot = snapshot_outgoing_changes(
        ctx.store,
        ctx.registry.outgoing_models(),
        since,
        ctx.config.snapshot_batch_size,
    )?;
    let records = attach_changelog_to_snapshot_records(
        ctx.store,
        snapshot,
        ChangelogOptions {
            min_source_tick: since,
        },
    )?;
    ctx.staging.stage_outgoing(records);

    let total = ctx.staging.outgoing_len();
    info!(
        session_id = %session_id,
        since = %since,
        records = total,
        "pushing outgoing changes"
    );

    let batch_size = ctx.config.push_batch_size as usize;
    let mut pushed = 0u64;
    let mut offset = 0usize;
    while offset < total {
        let batch = ctx.staging.outgoing_page(offset, batch_size);
        offset += batch.len();
        let ack = ctx.central.push(&PushRequest {
            session_id: session_id.clone(),
            records: batch,
        })?;
        pushed += ack.accepted;
        debug!(session_id = %session_id, offset, accepted = ack.accepted, "pushed batch");
    }

    ctx.central.complete_push(&SessionRequest {
        session_id: session_id.clone(),
    })?;

    let watermark = since.max(session_start_tick);
    ctx.store
        .set_fact(LAST_SUCCESSFUL_SYNC_PUSH, watermark.to_string())?;

    Ok(PushOutcome {
        pushed,
        since,
        watermark,
    })
}
