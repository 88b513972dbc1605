//! Model registry: which entity types sync, which way, and in what order.

use crate::error::{SyncError, SyncResult};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use ticksync_store::Store;

/// Which way an entity type replicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncDirection {
    /// Pushed and pulled.
    Bidirectional,
    /// Pushed only.
    OutgoingOnly,
    /// Pulled only.
    IncomingOnly,
    /// Local to the facility.
    None,
}

impl SyncDirection {
    /// Returns the manifest spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncDirection::Bidirectional => "BIDIRECTIONAL",
            SyncDirection::OutgoingOnly => "PUSH_TO_CENTRAL",
            SyncDirection::IncomingOnly => "PULL_FROM_CENTRAL",
            SyncDirection::None => "DO_NOT_SYNC",
        }
    }

    /// Whether local changes of this type are pushed.
    #[must_use]
    pub fn is_outgoing(self) -> bool {
        matches!(self, SyncDirection::Bidirectional | SyncDirection::OutgoingOnly)
    }

    /// Whether central changes of this type are pulled.
    #[must_use]
    pub fn is_incoming(self) -> bool {
        matches!(self, SyncDirection::Bidirectional | SyncDirection::IncomingOnly)
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BIDIRECTIONAL" => Ok(SyncDirection::Bidirectional),
            "PUSH_TO_CENTRAL" => Ok(SyncDirection::OutgoingOnly),
            "PULL_FROM_CENTRAL" => Ok(SyncDirection::IncomingOnly),
            "DO_NOT_SYNC" => Ok(SyncDirection::None),
            other => Err(other.to_string()),
        }
    }
}

/// Definition of one syncable entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDef {
    /// Entity type, also the table name.
    pub record_type: String,
    /// Replication direction.
    pub sync_direction: SyncDirection,
    /// Entity types this one references.
    pub depends_on: Vec<String>,
}

impl ModelDef {
    /// Creates a model with no dependencies.
    pub fn new(record_type: impl Into<String>, sync_direction: SyncDirection) -> Self {
        Self {
            record_type: record_type.into(),
            sync_direction,
            depends_on: Vec::new(),
        }
    }

    /// Declares the entity types this one references.
    #[must_use]
    pub fn depends_on<I, S>(mut self, record_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on
            .extend(record_types.into_iter().map(Into::into));
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry {
    record_type: String,
    sync_direction: String,
    #[serde(default)]
    depends_on: Vec<String>,
}

/// Ordered set of model definitions.
///
/// Models are kept in dependency order: every model comes after the models
/// it references. Ties are broken by name so the order is stable.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelDef>,
}

impl ModelRegistry {
    /// Builds a registry, ordering models by dependency.
    ///
    /// # Errors
    ///
    /// Fails on duplicate models, unknown dependencies or cycles.
    pub fn new(models: impl IntoIterator<Item = ModelDef>) -> SyncResult<Self> {
        let mut by_name: BTreeMap<String, ModelDef> = BTreeMap::new();
        for model in models {
            if by_name.contains_key(&model.record_type) {
                return Err(SyncError::DuplicateModel {
                    record_type: model.record_type,
                });
            }
            by_name.insert(model.record_type.clone(), model);
        }

        for model in by_name.values() {
            for dep in &model.depends_on {
                if !by_name.contains_key(dep) {
                    return Err(SyncError::UnknownDependency {
                        record_type: model.record_type.clone(),
                        depends_on: dep.clone(),
                    });
                }
            }
        }

        let order = dependency_order(&by_name)?;
        let models = order
            .into_iter()
            .filter_map(|name| by_name.remove(&name))
            .collect();
        Ok(Self { models })
    }

    /// Parses a JSON manifest: an array of
    /// `{"recordType", "syncDirection", "dependsOn"}` objects.
    ///
    /// # Errors
    ///
    /// Returns `Manifest` for malformed JSON, `InvalidSyncDirection` for an
    /// unknown direction, and the errors of [`ModelRegistry::new`].
    pub fn from_manifest_json(json: &str) -> SyncResult<Self> {
        let entries: Vec<ManifestEntry> =
            serde_json::from_str(json).map_err(|e| SyncError::Manifest {
                message: e.to_string(),
            })?;
        let mut models = Vec::with_capacity(entries.len());
        for entry in entries {
            let sync_direction = entry.sync_direction.parse().map_err(|direction| {
                SyncError::InvalidSyncDirection {
                    record_type: entry.record_type.clone(),
                    direction,
                }
            })?;
            models.push(ModelDef {
                record_type: entry.record_type,
                sync_direction,
                depends_on: entry.depends_on,
            });
        }
        Self::new(models)
    }

    /// Looks up a model.
    #[must_use]
    pub fn get(&self, record_type: &str) -> Option<&ModelDef> {
        self.models.iter().find(|m| m.record_type == record_type)
    }

    /// All models in dependency order.
    pub fn models(&self) -> impl DoubleEndedIterator<Item = &ModelDef> {
        self.models.iter()
    }

    /// Models whose local changes are pushed, in dependency order.
    #[must_use]
    pub fn outgoing_models(&self) -> Vec<&ModelDef> {
        self.models
            .iter()
            .filter(|m| m.sync_direction.is_outgoing())
            .collect()
    }

    /// Models that accept pulled changes, in dependency order.
    #[must_use]
    pub fn incoming_models(&self) -> Vec<&ModelDef> {
        self.models
            .iter()
            .filter(|m| m.sync_direction.is_incoming())
            .collect()
    }

    /// Number of models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Creates a table for every model that lacks one.
    ///
    /// # Errors
    ///
    /// Returns a store error if a table name is invalid or the commit fails.
    pub fn ensure_tables(&self, store: &Store) -> SyncResult<()> {
        for model in &self.models {
            store.ensure_table(&model.record_type)?;
        }
        Ok(())
    }
}

fn dependency_order(models: &BTreeMap<String, ModelDef>) -> SyncResult<Vec<String>> {
    let mut remaining: BTreeMap<&str, usize> = models
        .values()
        .map(|m| (m.record_type.as_str(), m.depends_on.len()))
        .collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for model in models.values() {
        for dep in &model.depends_on {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(model.record_type.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = remaining
        .iter()
        .filter(|&(_, &count)| count == 0)
        .map(|(&name, _)| name)
        .collect();
    let mut order = Vec::with_capacity(models.len());

    while let Some(name) = ready.pop_first() {
        remaining.remove(name);
        order.push(name.to_string());
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if !remaining.is_empty() {
        return Err(SyncError::DependencyCycle {
            record_types: remaining.keys().map(|s| (*s).to_string()).collect(),
        });
    }
    Ok(order)
}
