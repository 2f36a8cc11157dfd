//! Compute plan DAG construction and ordering.
//!
//! A submission is flattened into [`TrainingTask`]s, then [`ComputeDag::sort`]
//! places them pass by pass: a task is placed once every parent it declares
//! has been placed (or was already known from an earlier submission), and
//! receives a depth one greater than its deepest parent.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::assets::ComputePlanSubmission;
use crate::core::task::{TaskType, TrainingTask};
use crate::error::{Error, Result};

/// Ordered training tasks of one submission plus the depth of every
/// identifier it can reference.
pub struct ComputeDag {
    /// Tasks in submission order before sorting, in placement order after.
    ordered_tasks: Vec<TrainingTask>,
    /// Depth of every placed task, seeded with the known identifiers.
    ids_to_depth: HashMap<String, usize>,
    sorted: bool,
}

impl ComputeDag {
    /// Create an empty DAG.
    pub fn new() -> Self {
        Self {
            ordered_tasks: Vec::new(),
            ids_to_depth: HashMap::new(),
            sorted: false,
        }
    }

    /// Build the unsorted task list of a submission.
    ///
    /// Kinds are laid out traintuples first, then composite traintuples,
    /// then aggregatetuples; within a kind the submission order is kept.
    /// Testtuples are not part of the graph.
    pub fn from_submission(submission: &ComputePlanSubmission) -> Self {
        let mut dag = Self::new();
        for (i, spec) in submission.traintuples.iter().enumerate() {
            dag.add_task(TrainingTask::new(
                &spec.id,
                spec.in_models_ids.clone(),
                i,
                TaskType::Traintuple,
            ));
        }
        for (i, spec) in submission.composite_traintuples.iter().enumerate() {
            dag.add_task(TrainingTask::composite(
                &spec.id,
                &spec.in_head_model_id,
                &spec.in_trunk_model_id,
                i,
            ));
        }
        for (i, spec) in submission.aggregatetuples.iter().enumerate() {
            dag.add_task(TrainingTask::new(
                &spec.id,
                spec.in_models_ids.clone(),
                i,
                TaskType::Aggregatetuple,
            ));
        }
        dag
    }

    /// Append a task. Invalidates any previous sort.
    pub fn add_task(&mut self, task: TrainingTask) {
        self.sorted = false;
        self.ordered_tasks.push(task);
    }

    /// Order the tasks and assign depths.
    ///
    /// `known` maps identifiers placed by an earlier submission to their
    /// depth; tasks may depend on them without them being part of this
    /// DAG.
    ///
    /// # Errors
    /// - `BadRequest("duplicate training task ID: ..")` for the first
    ///   identifier that repeats (within the submission or against `known`),
    ///   whether or not it could be placed.
    /// - `UnplaceableTasks(ids)` when a pass places nothing; `ids` are the
    ///   remaining tasks in submission order.
    ///
    /// On error the DAG is left unchanged.
    pub fn sort(&mut self, known: &HashMap<String, usize>) -> Result<()> {
        self.check_unique_ids(known)?;

        let mut ready: HashMap<String, usize> = known.clone();
        let mut remaining: Vec<TrainingTask> = self.ordered_tasks.clone();
        let mut placed: Vec<TrainingTask> = Vec::with_capacity(remaining.len());
        let mut pass = 0usize;

        while !remaining.is_empty() {
            pass += 1;
            let before = remaining.len();
            let mut unplaced = Vec::with_capacity(before);

            for mut task in remaining {
                match depth_if_ready(&task, &ready) {
                    Some(depth) => {
                        task.depth = depth;
                        ready.insert(task.id.clone(), depth);
                        placed.push(task);
                    }
                    None => unplaced.push(task),
                }
            }

            debug!(
                pass,
                placed = before - unplaced.len(),
                remaining = unplaced.len(),
                "compute dag sort pass"
            );

            if unplaced.len() == before {
                let ids = unplaced.into_iter().map(|t| t.id).collect();
                return Err(Error::UnplaceableTasks(ids));
            }
            remaining = unplaced;
        }

        self.ordered_tasks = placed;
        self.ids_to_depth = ready;
        self.sorted = true;
        Ok(())
    }

    fn check_unique_ids(&self, known: &HashMap<String, usize>) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(self.ordered_tasks.len());
        for task in &self.ordered_tasks {
            if known.contains_key(&task.id) || !seen.insert(task.id.as_str()) {
                return Err(Error::BadRequest(format!(
                    "duplicate training task ID: {}",
                    task.id
                )));
            }
        }
        Ok(())
    }

    /// Tasks in placement order once sorted.
    pub fn tasks(&self) -> &[TrainingTask] {
        &self.ordered_tasks
    }

    /// Depth of a placed or known identifier.
    pub fn depth_of(&self, id: &str) -> Option<usize> {
        self.ids_to_depth.get(id).copied()
    }

    pub fn ids_to_depth(&self) -> &HashMap<String, usize> {
        &self.ids_to_depth
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn task_count(&self) -> usize {
        self.ordered_tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_tasks.is_empty()
    }

    pub fn contains_task(&self, id: &str) -> bool {
        self.ordered_tasks.iter().any(|t| t.id == id)
    }

    /// Identifiers referenced as parents that are not tasks of this DAG.
    ///
    /// These must be resolved against the ledger before sorting.
    pub fn external_parents(&self) -> Vec<String> {
        let own: HashSet<&str> = self.ordered_tasks.iter().map(|t| t.id.as_str()).collect();
        let mut external: Vec<String> = Vec::new();
        for task in &self.ordered_tasks {
            for parent in task.parents() {
                if !own.contains(parent) && !external.iter().any(|e| e == parent) {
                    external.push(parent.to_string());
                }
            }
        }
        external
    }
}

/// Depth of `task` if every non-empty parent is ready.
fn depth_if_ready(task: &TrainingTask, ready: &HashMap<String, usize>) -> Option<usize> {
    let mut depth: Option<usize> = None;
    for parent in task.parents() {
        let parent_depth = ready.get(parent)?;
        depth = Some(depth.map_or(parent_depth + 1, |d| d.max(parent_depth + 1)));
    }
    Some(depth.unwrap_or(0))
}

impl Default for ComputeDag {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComputeDag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeDag")
            .field("tasks", &self.task_count())
            .field("sorted", &self.sorted)
            .finish()
    }
}
