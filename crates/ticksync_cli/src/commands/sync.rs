//! Sync command implementation.
//!
//! Runs one push-then-pull session against a reference central node that
//! lives only for the duration of the command. The store's watermarks
//! advance exactly as they would against a real central node.

use super::{open_store, print_json, OutputFormat};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use ticksync_central::{CentralConfig, CentralNode};
use ticksync_engine::{
    HttpCentralServer, LoopbackClient, ModelRegistry, SyncConfig, SyncCoordinator, SyncRunOutcome,
};
use ticksync_protocol::ChangeRecord;
use tracing::info;

const LOOPBACK_URL: &str = "http://loopback";

/// Summary of a sync run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// `completed` or `queued`.
    pub outcome: String,
    /// Session id issued by central.
    pub session_id: Option<String>,
    /// Records pushed.
    pub pushed: u64,
    /// Records pulled.
    pub pulled: u64,
    /// Rows central holds after the run.
    pub central_records: usize,
}

/// Runs the sync command.
pub fn run(
    path: &Path,
    manifest: &Path,
    seed: Option<&Path>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(open_store(path)?);
    let registry = ModelRegistry::from_manifest_json(&std::fs::read_to_string(manifest)?)?;

    let central = Arc::new(CentralNode::new(CentralConfig::default()));
    if let Some(seed) = seed {
        let records: Vec<ChangeRecord> = serde_json::from_str(&std::fs::read_to_string(seed)?)?;
        info!(records = records.len(), "seeding central node");
        central.records().persist(records, None);
    }

    let summary = sync_once(store, Arc::clone(&central), registry)?;
    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text => {
            println!("Sync {}", summary.outcome);
            if let Some(session_id) = &summary.session_id {
                println!("  Session:  {session_id}");
            }
            println!("  Pushed:   {}", summary.pushed);
            println!("  Pulled:   {}", summary.pulled);
            println!("  Central:  {} records", summary.central_records);
        }
    }
    Ok(())
}

fn sync_once(
    store: Arc<ticksync_store::Store>,
    central: Arc<CentralNode>,
    registry: ModelRegistry,
) -> Result<SyncSummary, Box<dyn std::error::Error>> {
    let transport = HttpCentralServer::new(LOOPBACK_URL, LoopbackClient::new(Arc::clone(&central)));
    let coordinator =
        SyncCoordinator::new(store, Arc::new(transport), registry, SyncConfig::default())?;

    let summary = match coordinator.run_sync()? {
        SyncRunOutcome::Completed(report) => SyncSummary {
            outcome: "completed".into(),
            session_id: Some(report.session_id.to_string()),
            pushed: report.pushed,
            pulled: report.pulled,
            central_records: central.record_count(),
        },
        SyncRunOutcome::Queued { status } => SyncSummary {
            outcome: format!("queued ({status:?})"),
            session_id: None,
            pushed: 0,
            pulled: 0,
            central_records: central.record_count(),
        },
    };
    Ok(summary)
}
