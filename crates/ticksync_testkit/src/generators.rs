//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random rows, write sequences and
//! acyclic model graphs.

use proptest::prelude::*;
use serde_json::{Map, Value};
use ticksync_engine::{ModelDef, SyncDirection};
use ticksync_store::Fields;

/// Strategy for generating record ids.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating model names.
pub fn model_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating scalar column values.
pub fn column_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[ -~]{0,24}".prop_map(Value::from),
        Just(Value::Null),
    ]
}

/// Strategy for generating row columns.
pub fn fields_strategy() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map("[a-z][a-zA-Z]{0,11}", column_value_strategy(), 1..6)
        .prop_map(|columns| columns.into_iter().collect::<Map<String, Value>>())
}

/// A local write against one table.
#[derive(Debug, Clone)]
pub enum RowOperation {
    /// Upsert a row
    Put {
        /// Record id
        id: String,
        /// Columns
        data: Fields,
    },
    /// Soft-delete a row
    Delete {
        /// Record id
        id: String,
    },
}

impl RowOperation {
    /// Returns the record id written.
    pub fn id(&self) -> &str {
        match self {
            RowOperation::Put { id, .. } | RowOperation::Delete { id } => id,
        }
    }
}

/// Strategy for generating row operations over a small id space, so that
/// sequences revisit the same rows.
pub fn row_operation_strategy() -> impl Strategy<Value = RowOperation> {
    let id = (0u8..8).prop_map(|n| format!("row-{n}"));
    prop_oneof![
        3 => (id.clone(), fields_strategy())
            .prop_map(|(id, data)| RowOperation::Put { id, data }),
        1 => id.prop_map(|id| RowOperation::Delete { id }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<RowOperation>> {
    prop::collection::vec(row_operation_strategy(), min_ops..max_ops)
}

/// Strategy for generating a sync direction.
pub fn sync_direction_strategy() -> impl Strategy<Value = SyncDirection> {
    prop_oneof![
        Just(SyncDirection::Bidirectional),
        Just(SyncDirection::OutgoingOnly),
        Just(SyncDirection::IncomingOnly),
        Just(SyncDirection::None),
    ]
}

/// Strategy for generating an acyclic model graph of up to `max_models`
/// models, in shuffled declaration order.
///
/// Model `i` may only depend on models with a lower index, which keeps
/// the graph acyclic.
pub fn model_graph_strategy(max_models: usize) -> impl Strategy<Value = Vec<ModelDef>> {
    (1..=max_models.max(1))
        .prop_flat_map(|count| {
            let deps = (0..count)
                .map(|i| prop::collection::vec(any::<bool>(), i))
                .collect::<Vec<_>>();
            (
                prop::collection::vec(sync_direction_strategy(), count),
                deps,
            )
        })
        .prop_map(|(directions, deps)| {
            directions
                .into_iter()
                .zip(deps)
                .enumerate()
                .map(|(i, (direction, picks))| {
                    let parents: Vec<String> = picks
                        .iter()
                        .enumerate()
                        .filter(|(_, picked)| **picked)
                        .map(|(j, _)| format!("model_{j:02}"))
                        .collect();
                    ModelDef::new(format!("model_{i:02}"), direction).depends_on(parents)
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
