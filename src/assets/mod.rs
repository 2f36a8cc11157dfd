//! Ledger asset records.
//!
//! Every record carries an `assetType` tag so a raw value can be checked
//! against the type a caller expects before it is decoded.

pub mod compute_plan;
pub mod permission;
pub mod tuple;

use serde::{Deserialize, Serialize};

pub use compute_plan::{
    AggregatetupleSpec, CompositeTraintupleSpec, ComputePlan, ComputePlanSubmission,
    ComputePlanWorkerState, PlanStatus, TesttupleSpec, TraintupleSpec,
};
pub use permission::{Permissions, Privilege};
pub use tuple::{
    Aggregatetuple, CompositeTraintuple, GenericTuple, OutModel, Testtuple, Traintuple, Tuple,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetType {
    Traintuple,
    CompositeTraintuple,
    Aggregatetuple,
    Testtuple,
    ComputePlan,
    ComputePlanWorkerState,
}

impl AssetType {
    pub fn is_tuple(&self) -> bool {
        matches!(
            self,
            AssetType::Traintuple
                | AssetType::CompositeTraintuple
                | AssetType::Aggregatetuple
                | AssetType::Testtuple
        )
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetType::Traintuple => write!(f, "traintuple"),
            AssetType::CompositeTraintuple => write!(f, "compositeTraintuple"),
            AssetType::Aggregatetuple => write!(f, "aggregatetuple"),
            AssetType::Testtuple => write!(f, "testtuple"),
            AssetType::ComputePlan => write!(f, "computePlan"),
            AssetType::ComputePlanWorkerState => write!(f, "computePlanWorkerState"),
        }
    }
}

/// Minimal view used to check a record's type before decoding it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetHeader {
    pub asset_type: AssetType,
}
