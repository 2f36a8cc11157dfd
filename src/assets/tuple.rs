//! Tuple records as stored on the ledger.

use serde::{Deserialize, Serialize};

use crate::assets::permission::Permissions;
use crate::assets::AssetType;
use crate::core::TupleStatus;

/// Fields shared by every tuple kind.
///
/// Any stored tuple deserializes into a `GenericTuple`; kind-specific fields
/// are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericTuple {
    pub key: String,
    pub asset_type: AssetType,
    pub status: TupleStatus,
    /// Empty when the tuple is standalone.
    #[serde(default)]
    pub compute_plan_key: String,
    #[serde(default)]
    pub worker: String,
    #[serde(default)]
    pub rank: usize,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub log: String,
}

impl GenericTuple {
    pub fn new(key: &str, asset_type: AssetType, worker: &str) -> Self {
        Self {
            key: key.to_string(),
            asset_type,
            status: TupleStatus::Waiting,
            compute_plan_key: String::new(),
            worker: worker.to_string(),
            rank: 0,
            creator: String::new(),
            tag: String::new(),
            log: String::new(),
        }
    }

    pub fn in_compute_plan(&self) -> bool {
        !self.compute_plan_key.is_empty()
    }
}

/// A model written by a successful tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutModel {
    pub checksum: String,
    pub storage_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Traintuple {
    #[serde(flatten)]
    pub generic: GenericTuple,
    pub algo_key: String,
    /// Keys of the tuples whose out-models are consumed.
    #[serde(default)]
    pub in_models: Vec<String>,
    #[serde(default)]
    pub data_manager_key: String,
    #[serde(default)]
    pub data_sample_keys: Vec<String>,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub out_model: Option<OutModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeTraintuple {
    #[serde(flatten)]
    pub generic: GenericTuple,
    pub algo_key: String,
    /// Empty when the head input slot is unused.
    #[serde(default)]
    pub in_head_model: String,
    #[serde(default)]
    pub in_trunk_model: String,
    #[serde(default)]
    pub data_manager_key: String,
    #[serde(default)]
    pub data_sample_keys: Vec<String>,
    /// The head model never leaves its worker.
    #[serde(default)]
    pub head_permissions: Permissions,
    #[serde(default)]
    pub trunk_permissions: Permissions,
    #[serde(default)]
    pub out_head_model: Option<OutModel>,
    #[serde(default)]
    pub out_trunk_model: Option<OutModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregatetuple {
    #[serde(flatten)]
    pub generic: GenericTuple,
    pub algo_key: String,
    #[serde(default)]
    pub in_models: Vec<String>,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub out_model: Option<OutModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Testtuple {
    #[serde(flatten)]
    pub generic: GenericTuple,
    /// Key of the model-producing tuple under test.
    pub traintuple_key: String,
    #[serde(default)]
    pub data_manager_key: String,
    #[serde(default)]
    pub data_sample_keys: Vec<String>,
    #[serde(default)]
    pub perf: Option<f64>,
}

/// Any stored tuple, typed by its asset kind.
///
/// Serializes as the inner record, which carries its own `assetType`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Tuple {
    Train(Traintuple),
    Composite(CompositeTraintuple),
    Aggregate(Aggregatetuple),
    Test(Testtuple),
}

impl Tuple {
    pub fn generic(&self) -> &GenericTuple {
        match self {
            Tuple::Train(t) => &t.generic,
            Tuple::Composite(t) => &t.generic,
            Tuple::Aggregate(t) => &t.generic,
            Tuple::Test(t) => &t.generic,
        }
    }

    pub fn generic_mut(&mut self) -> &mut GenericTuple {
        match self {
            Tuple::Train(t) => &mut t.generic,
            Tuple::Composite(t) => &mut t.generic,
            Tuple::Aggregate(t) => &mut t.generic,
            Tuple::Test(t) => &mut t.generic,
        }
    }

    pub fn key(&self) -> &str {
        &self.generic().key
    }

    pub fn status(&self) -> TupleStatus {
        self.generic().status
    }

    /// Keys of the tuples this one depends on, empty slots skipped, each
    /// listed once.
    pub fn parent_keys(&self) -> Vec<&str> {
        let raw: Vec<&str> = match self {
            Tuple::Train(t) => t.in_models.iter().map(String::as_str).collect(),
            Tuple::Composite(t) => vec![t.in_head_model.as_str(), t.in_trunk_model.as_str()],
            Tuple::Aggregate(t) => t.in_models.iter().map(String::as_str).collect(),
            Tuple::Test(t) => vec![t.traintuple_key.as_str()],
        };
        let mut parents: Vec<&str> = Vec::with_capacity(raw.len());
        for key in raw {
            if !key.is_empty() && !parents.contains(&key) {
                parents.push(key);
            }
        }
        parents
    }

    /// Testtuples consume a model but never produce one.
    pub fn produces_models(&self) -> bool {
        !matches!(self, Tuple::Test(_))
    }

    /// Permissions on the model a child consuming this tuple receives.
    ///
    /// `as_head` selects the head model of a composite traintuple.
    pub fn out_model_permissions(&self, as_head: bool) -> Option<&Permissions> {
        match self {
            Tuple::Train(t) => Some(&t.permissions),
            Tuple::Aggregate(t) => Some(&t.permissions),
            Tuple::Composite(t) if as_head => Some(&t.head_permissions),
            Tuple::Composite(t) => Some(&t.trunk_permissions),
            Tuple::Test(_) => None,
        }
    }
}
