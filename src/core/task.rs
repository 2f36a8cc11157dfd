//! Training tasks as seen by the compute plan sorter.
//!
//! A `TrainingTask` only lives while a submission is being ordered: it is
//! built from the submitted descriptors, placed by
//! [`ComputeDag::sort`](crate::core::ComputeDag::sort), and then persisted as
//! a real tuple.

use serde::{Deserialize, Serialize};

/// Kind of model-producing tuple a task becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskType {
    Traintuple,
    CompositeTraintuple,
    Aggregatetuple,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Traintuple => write!(f, "traintuple"),
            TaskType::CompositeTraintuple => write!(f, "composite_traintuple"),
            TaskType::Aggregatetuple => write!(f, "aggregatetuple"),
        }
    }
}

/// A node of the compute plan graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingTask {
    /// Caller-chosen identifier, unique within the plan.
    pub id: String,
    /// Identifiers of the tasks whose models this one consumes. An empty
    /// string marks an unused input slot.
    pub in_models_ids: Vec<String>,
    /// Position of the descriptor within its kind's list in the submission.
    pub input_index: usize,
    /// Longest dependency chain leading to this task. Set by the sorter.
    pub depth: usize,
    pub task_type: TaskType,
}

impl TrainingTask {
    pub fn new(id: &str, in_models_ids: Vec<String>, input_index: usize, task_type: TaskType) -> Self {
        Self {
            id: id.to_string(),
            in_models_ids,
            input_index,
            depth: 0,
            task_type,
        }
    }

    /// Composite tasks list their parents as `[head, trunk]`.
    pub fn composite(id: &str, head: &str, trunk: &str, input_index: usize) -> Self {
        Self::new(
            id,
            vec![head.to_string(), trunk.to_string()],
            input_index,
            TaskType::CompositeTraintuple,
        )
    }

    /// Parent identifiers that denote a real dependency.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.in_models_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.parents().next().is_none()
    }
}
