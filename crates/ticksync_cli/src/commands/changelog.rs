//! Changelog command implementation.

use super::{open_store, print_json, OutputFormat};
use std::path::Path;
use ticksync_store::{AuditEntry, Store, Tick};

/// Which changelog entries to print.
#[derive(Debug, Default)]
pub struct ChangelogFilter {
    /// Table name.
    pub table: Option<String>,
    /// Record id, within `table`.
    pub id: Option<String>,
    /// Lowest tick.
    pub since: Option<i64>,
}

/// Runs the changelog command.
pub fn run(
    path: &Path,
    filter: &ChangelogFilter,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let entries = select(&store, filter);

    match format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Text => {
            println!("Changelog entries: {}", entries.len());
            for entry in &entries {
                println!(
                    "  [{}] {:?} {}/{} {}",
                    entry.tick,
                    entry.operation,
                    entry.table_name,
                    entry.record_id,
                    serde_json::Value::Object(entry.data.clone())
                );
            }
        }
    }
    Ok(())
}

fn select(store: &Store, filter: &ChangelogFilter) -> Vec<AuditEntry> {
    let read = store.begin_read();
    let min_tick = filter.since.map_or(Tick::NEVER, Tick::new);
    let entries = match (&filter.table, &filter.id) {
        (Some(table), Some(id)) => read.changelog_for(table, id),
        _ => read.changelog_since(min_tick),
    };
    entries
        .into_iter()
        .filter(|e| e.tick >= min_tick)
        .filter(|e| filter.table.as_ref().map_or(true, |t| &e.table_name == t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ticksync_store::AuditOperation;

    #[test]
    fn select_filters_by_table_and_record() {
        let store = Store::open_in_memory();
        for table in ["patient", "encounter"] {
            store.ensure_table(table).unwrap();
        }
        store
            .transaction(|txn| {
                txn.put("patient", "p1", json!({ "n": 1 }).as_object().cloned().unwrap())?;
                txn.put("patient", "p2", json!({ "n": 2 }).as_object().cloned().unwrap())?;
                txn.put("encounter", "e1", json!({}).as_object().cloned().unwrap())
            })
            .unwrap();

        assert_eq!(select(&store, &ChangelogFilter::default()).len(), 3);

        let patients = ChangelogFilter {
            table: Some("patient".into()),
            ..Default::default()
        };
        assert_eq!(select(&store, &patients).len(), 2);

        let one = ChangelogFilter {
            table: Some("patient".into()),
            id: Some("p2".into()),
            since: None,
        };
        let entries = select(&store, &one);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, AuditOperation::Insert);

        let later = ChangelogFilter {
            since: Some(5),
            ..Default::default()
        };
        assert!(select(&store, &later).is_empty());
    }
}
