//! Changes command implementation.

use super::{load_registry, open_store, print_json, OutputFormat};
use std::path::Path;
use ticksync_engine::{
    attach_changelog_to_snapshot_records, snapshot_outgoing_changes, ChangelogOptions,
    DEFAULT_SNAPSHOT_BATCH_SIZE,
};
use ticksync_protocol::ChangeRecord;
use ticksync_store::{Store, Tick, LAST_SUCCESSFUL_SYNC_PUSH};

/// Runs the changes command.
pub fn run(
    path: &Path,
    since: Option<i64>,
    manifest: Option<&Path>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let since = match since {
        Some(tick) => Tick::new(tick),
        None => store.get_tick(LAST_SUCCESSFUL_SYNC_PUSH)?,
    };
    let records = outgoing_changes(&store, since, manifest)?;

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Text => {
            println!("Outgoing changes since tick {}: {}", since, records.len());
            for record in &records {
                let state = if record.is_deleted { "deleted" } else { "live" };
                println!(
                    "  {}/{} ({}, {} changelog entries)",
                    record.record_type,
                    record.record_id,
                    state,
                    record.changelog_records.len()
                );
            }
        }
    }
    Ok(())
}

fn outgoing_changes(
    store: &Store,
    since: Tick,
    manifest: Option<&Path>,
) -> Result<Vec<ChangeRecord>, Box<dyn std::error::Error>> {
    let registry = load_registry(store, manifest)?;
    let snapshot = snapshot_outgoing_changes(
        store,
        registry.outgoing_models(),
        since,
        DEFAULT_SNAPSHOT_BATCH_SIZE,
    )?;
    Ok(attach_changelog_to_snapshot_records(
        store,
        snapshot,
        ChangelogOptions {
            min_source_tick: since,
        },
    )?)
}
