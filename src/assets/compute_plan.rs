//! Compute plan records and submissions.

use serde::{Deserialize, Serialize};

use crate::assets::permission::Permissions;
use crate::assets::AssetType;

/// Aggregate status of a compute plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// No task has started yet.
    #[default]
    Todo,
    /// At least one task started or finished.
    Doing,
    /// Every task succeeded.
    Done,
    Failed,
    Canceled,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Done | PlanStatus::Failed | PlanStatus::Canceled)
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Todo => write!(f, "todo"),
            PlanStatus::Doing => write!(f, "doing"),
            PlanStatus::Done => write!(f, "done"),
            PlanStatus::Failed => write!(f, "failed"),
            PlanStatus::Canceled => write!(f, "canceled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputePlan {
    pub key: String,
    pub asset_type: AssetType,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub objective_key: String,
    /// Enables intermediary model garbage collection.
    #[serde(default)]
    pub clean_models: bool,
    pub status: PlanStatus,
    /// Workers in order of first assignment, each listed once.
    #[serde(default)]
    pub workers: Vec<String>,
    /// Worker-state record key of each worker, parallel to `workers`.
    #[serde(default)]
    pub state_keys: Vec<String>,
    #[serde(default)]
    pub creator: String,
}

impl ComputePlan {
    pub fn new(key: &str, tag: &str, objective_key: &str, clean_models: bool) -> Self {
        Self {
            key: key.to_string(),
            asset_type: AssetType::ComputePlan,
            tag: tag.to_string(),
            objective_key: objective_key.to_string(),
            clean_models,
            status: PlanStatus::Todo,
            workers: Vec::new(),
            state_keys: Vec::new(),
            creator: String::new(),
        }
    }

    pub fn has_worker(&self, worker: &str) -> bool {
        self.workers.iter().any(|w| w == worker)
    }

    /// Register `worker` if absent. Returns whether it was added.
    pub fn add_worker(&mut self, worker: &str) -> bool {
        if self.has_worker(worker) {
            return false;
        }
        self.workers.push(worker.to_string());
        self.state_keys
            .push(ComputePlanWorkerState::key_for(&self.key, worker));
        true
    }
}

/// Per (plan, worker) counters and the intermediary models still needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputePlanWorkerState {
    pub key: String,
    pub asset_type: AssetType,
    pub tuple_count: usize,
    pub done_count: usize,
    /// Ordered set of model identifiers (producing tuple keys).
    #[serde(default)]
    pub intermediary_models_in_use: Vec<String>,
}

impl ComputePlanWorkerState {
    pub fn new(plan_key: &str, worker: &str) -> Self {
        Self {
            key: Self::key_for(plan_key, worker),
            asset_type: AssetType::ComputePlanWorkerState,
            tuple_count: 0,
            done_count: 0,
            intermediary_models_in_use: Vec::new(),
        }
    }

    pub fn key_for(plan_key: &str, worker: &str) -> String {
        format!("computePlanWorkerState_{}_{}", plan_key, worker)
    }

    /// Insert preserving order; returns false if already tracked.
    pub fn track_model(&mut self, model: &str) -> bool {
        if self.intermediary_models_in_use.iter().any(|m| m == model) {
            return false;
        }
        self.intermediary_models_in_use.push(model.to_string());
        true
    }

    pub fn is_complete(&self) -> bool {
        self.tuple_count > 0 && self.done_count == self.tuple_count
    }
}

/// Traintuple descriptor inside a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TraintupleSpec {
    /// Caller-chosen identifier, also used as the tuple key.
    pub id: String,
    pub algo_key: String,
    pub worker: String,
    #[serde(default)]
    pub in_models_ids: Vec<String>,
    #[serde(default)]
    pub data_manager_key: String,
    #[serde(default)]
    pub data_sample_keys: Vec<String>,
    #[serde(default)]
    pub tag: String,
    /// Requested out-model permissions; merged with the inputs'.
    #[serde(default)]
    pub permissions: Option<Permissions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompositeTraintupleSpec {
    pub id: String,
    pub algo_key: String,
    pub worker: String,
    #[serde(default)]
    pub in_head_model_id: String,
    #[serde(default)]
    pub in_trunk_model_id: String,
    #[serde(default)]
    pub data_manager_key: String,
    #[serde(default)]
    pub data_sample_keys: Vec<String>,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub out_trunk_model_permissions: Option<Permissions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AggregatetupleSpec {
    pub id: String,
    pub algo_key: String,
    pub worker: String,
    #[serde(default)]
    pub in_models_ids: Vec<String>,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TesttupleSpec {
    pub key: String,
    /// Identifier of the model-producing task under test.
    pub traintuple_id: String,
    pub worker: String,
    #[serde(default)]
    pub data_manager_key: String,
    #[serde(default)]
    pub data_sample_keys: Vec<String>,
    #[serde(default)]
    pub tag: String,
}

/// A batch of tasks submitted atomically, either as a new plan or as an
/// addition to an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComputePlanSubmission {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub objective_key: String,
    #[serde(default)]
    pub clean_models: bool,
    #[serde(default)]
    pub traintuples: Vec<TraintupleSpec>,
    #[serde(default)]
    pub composite_traintuples: Vec<CompositeTraintupleSpec>,
    #[serde(default)]
    pub aggregatetuples: Vec<AggregatetupleSpec>,
    #[serde(default)]
    pub testtuples: Vec<TesttupleSpec>,
}

impl ComputePlanSubmission {
    pub fn task_count(&self) -> usize {
        self.traintuples.len()
            + self.composite_traintuples.len()
            + self.aggregatetuples.len()
            + self.testtuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_count() == 0
    }
}
