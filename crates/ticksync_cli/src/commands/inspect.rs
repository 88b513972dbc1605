//! Inspect command implementation.

use super::{open_store, print_json, OutputFormat};
use serde::Serialize;
use std::path::Path;
use ticksync_store::{
    Store, Tick, DEVICE_ID, LAST_SUCCESSFUL_SYNC_PULL, LAST_SUCCESSFUL_SYNC_PUSH,
};

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Device identifier, if one was assigned.
    pub device_id: Option<String>,
    /// Local clock.
    pub current_tick: Tick,
    /// Pull watermark.
    pub last_successful_sync_pull: Tick,
    /// Push watermark.
    pub last_successful_sync_push: Tick,
    /// Number of changelog entries.
    pub changelog_entries: usize,
    /// Per-table statistics.
    pub tables: Vec<TableStats>,
}

/// Statistics for a single table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub name: String,
    /// Live rows.
    pub live_rows: usize,
    /// Soft-deleted rows.
    pub deleted_rows: usize,
    /// Rows stamped as pulled from central.
    pub incoming_rows: usize,
    /// Highest row tick.
    pub max_tick: Option<Tick>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let result = inspect(&store, path)?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

fn inspect(store: &Store, path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let read = store.begin_read();
    let mut tables = Vec::new();
    for name in store.table_names() {
        let rows = read.scan(&name, None, usize::MAX)?;
        tables.push(TableStats {
            live_rows: rows.iter().filter(|r| !r.is_deleted).count(),
            deleted_rows: rows.iter().filter(|r| r.is_deleted).count(),
            incoming_rows: rows
                .iter()
                .filter(|r| r.tick == Tick::INCOMING_FROM_CENTRAL)
                .count(),
            max_tick: rows.iter().map(|r| r.tick).max(),
            name,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        device_id: read.fact(DEVICE_ID),
        current_tick: store.current_tick()?,
        last_successful_sync_pull: store.get_tick(LAST_SUCCESSFUL_SYNC_PULL)?,
        last_successful_sync_push: store.get_tick(LAST_SUCCESSFUL_SYNC_PUSH)?,
        changelog_entries: read.changelog_since(Tick::NEVER).len(),
        tables,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("ticksync Store Inspection");
    println!("=========================");
    println!();
    println!("Path:      {}", result.path);
    println!(
        "Device:    {}",
        result.device_id.as_deref().unwrap_or("(not assigned)")
    );
    println!();
    println!("Clock:");
    println!("  currentTick:             {}", result.current_tick);
    println!("  lastSuccessfulSyncPull:  {}", result.last_successful_sync_pull);
    println!("  lastSuccessfulSyncPush:  {}", result.last_successful_sync_push);
    println!();
    println!("Changelog entries: {}", result.changelog_entries);

    if !result.tables.is_empty() {
        println!();
        println!("Tables:");
        for table in &result.tables {
            let max_tick = table
                .max_tick
                .map_or_else(|| "-".to_string(), |t| t.to_string());
            println!(
                "  {:<24} {} live, {} deleted, {} from central, max tick {}",
                table.name, table.live_rows, table.deleted_rows, table.incoming_rows, max_tick
            );
        }
    }
}
