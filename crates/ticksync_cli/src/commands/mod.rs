//! CLI command implementations.

pub mod changelog;
pub mod changes;
pub mod inspect;
pub mod sync;

use clap::ValueEnum;
use serde::Serialize;
use std::path::Path;
use ticksync_engine::{ModelDef, ModelRegistry, SyncDirection};
use ticksync_store::{Store, StoreConfig};

/// How command results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Opens an existing store directory.
pub fn open_store(path: &Path) -> Result<Store, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No store found at {:?}", path).into());
    }
    Ok(Store::open(path, StoreConfig::default())?)
}

/// Loads a model manifest, or treats every table as bidirectional.
pub fn load_registry(
    store: &Store,
    manifest: Option<&Path>,
) -> Result<ModelRegistry, Box<dyn std::error::Error>> {
    match manifest {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            Ok(ModelRegistry::from_manifest_json(&json)?)
        }
        None => Ok(ModelRegistry::new(
            store
                .table_names()
                .into_iter()
                .map(|name| ModelDef::new(name, SyncDirection::Bidirectional)),
        )?),
    }
}

/// Prints `value` as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
