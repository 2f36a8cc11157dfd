//! Compute plan lifecycle and queries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assets::{AssetType, ComputePlan, ComputePlanSubmission, PlanStatus, Tuple};
use crate::core::{ComputeDag, TaskType, TupleStatus};
use crate::error::{Error, Result};
use crate::orchestration::resolver::resolved_tuple;
use crate::orchestration::tuples::{
    create_aggregatetuple, create_composite_traintuple, create_testtuple, create_traintuple,
    finish_plan, write_status, Placement,
};
use crate::orchestration::worker_state;
use crate::store::index::{COMPUTE_PLAN_BY_KEY, TUPLE_BY_COMPUTE_PLAN, TUPLE_BY_WORKER_STATUS};
use crate::store::LedgerDb;

/// A compute plan as returned to callers, with its progress and tuples.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputePlanView {
    #[serde(flatten)]
    pub plan: ComputePlan,
    pub tuple_count: usize,
    pub done_count: usize,
    pub traintuple_keys: Vec<String>,
    pub composite_traintuple_keys: Vec<String>,
    pub aggregatetuple_keys: Vec<String>,
    pub testtuple_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputePlanPage {
    pub results: Vec<ComputePlanView>,
    /// Empty once the last page was returned.
    pub bookmark: String,
}

/// Arguments of `queryComputePlans`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub bookmark: String,
}

/// Create a compute plan from a submission.
///
/// The submission's training tasks are ordered by [`ComputeDag::sort`] and
/// created in that order, each ranked with its depth; testtuples follow.
/// An empty plan key is replaced by the transaction id.
pub fn create_compute_plan(
    db: &mut LedgerDb<'_>,
    submission: &ComputePlanSubmission,
) -> Result<ComputePlanView> {
    let key = if submission.key.is_empty() {
        db.tx_id()
    } else {
        submission.key.clone()
    };
    if submission.is_empty() {
        return Err(Error::BadRequest(format!("compute plan {} has no tuples", key)));
    }
    if db.key_exists(&key)? {
        return Err(Error::Conflict(format!("compute plan {} already exists", key)));
    }

    let mut plan = ComputePlan::new(
        &key,
        &submission.tag,
        &submission.objective_key,
        submission.clean_models,
    );
    plan.creator = db.invoker();

    let dag = ComputeDag::from_submission(submission);
    let created = add_submission(db, &mut plan, submission, dag, &HashMap::new())?;

    db.create_index(COMPUTE_PLAN_BY_KEY, &[key.as_str()])?;
    db.put_compute_plan(&plan)?;
    info!(plan = %key, tuples = created.len(), workers = plan.workers.len(), "compute plan created");
    build_view(db, plan, created)
}

/// Add tuples to an existing, unfinished compute plan.
///
/// Training tasks may depend on tuples already in the plan; their stored
/// rank seeds the sort.
pub fn update_compute_plan(
    db: &mut LedgerDb<'_>,
    submission: &ComputePlanSubmission,
) -> Result<ComputePlanView> {
    let mut plan = db.get_compute_plan(&submission.key)?;
    check_creator(db, &plan)?;
    if plan.status.is_terminal() {
        return Err(Error::BadRequest(format!(
            "compute plan {} is {} and cannot be updated",
            plan.key, plan.status
        )));
    }
    if submission.is_empty() {
        return Err(Error::BadRequest(format!(
            "update of compute plan {} has no tuples",
            plan.key
        )));
    }

    let dag = ComputeDag::from_submission(submission);
    let mut known = HashMap::new();
    for id in dag.external_parents() {
        match db.get_generic_tuple(&id) {
            Ok(tuple) if tuple.compute_plan_key == plan.key => {
                known.insert(id, tuple.rank);
            }
            // Left unknown, the sort reports it.
            Ok(_) | Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    let created = add_submission(db, &mut plan, submission, dag, &known)?;
    db.put_compute_plan(&plan)?;
    info!(plan = %plan.key, tuples = created.len(), "compute plan updated");

    let mut keys = db.get_index_keys(TUPLE_BY_COMPUTE_PLAN, &[plan.key.as_str()])?;
    for key in created {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    build_view(db, plan, keys)
}

/// Cancel every unfinished tuple of the plan and release its models.
pub fn cancel_compute_plan(db: &mut LedgerDb<'_>, key: &str) -> Result<ComputePlanView> {
    let mut plan = db.get_compute_plan(key)?;
    check_creator(db, &plan)?;
    if plan.status.is_terminal() {
        return Err(Error::BadRequest(format!(
            "compute plan {} is already {}",
            plan.key, plan.status
        )));
    }

    let keys = db.get_index_keys(TUPLE_BY_COMPUTE_PLAN, &[key])?;
    let mut canceled = 0usize;
    for tuple_key in &keys {
        let mut tuple = db.get_tuple(tuple_key)?;
        if tuple.status().can_transition(TupleStatus::Canceled) {
            write_status(db, &mut tuple, TupleStatus::Canceled)?;
            canceled += 1;
        }
    }
    plan.status = PlanStatus::Canceled;
    finish_plan(db, &mut plan)?;
    info!(plan = %key, canceled, "compute plan canceled");
    build_view(db, plan, keys)
}

fn check_creator(db: &LedgerDb<'_>, plan: &ComputePlan) -> Result<()> {
    let invoker = db.invoker();
    if plan.creator != invoker {
        return Err(Error::BadRequest(format!(
            "{} is not the creator of compute plan {}",
            invoker, plan.key
        )));
    }
    Ok(())
}

/// Sort and create the submission's tuples. Returns their keys in creation
/// order.
fn add_submission(
    db: &mut LedgerDb<'_>,
    plan: &mut ComputePlan,
    submission: &ComputePlanSubmission,
    mut dag: ComputeDag,
    known: &HashMap<String, usize>,
) -> Result<Vec<String>> {
    dag.sort(known)?;

    let mut created = Vec::with_capacity(submission.task_count());
    for task in dag.tasks() {
        let missing =
            || Error::Internal(format!("no {} at index {}", task.task_type, task.input_index));
        let placement = Placement::in_plan(plan, Some(task.depth));
        let tuple = match task.task_type {
            TaskType::Traintuple => {
                let spec = submission.traintuples.get(task.input_index).ok_or_else(missing)?;
                create_traintuple(db, spec, placement)?
            }
            TaskType::CompositeTraintuple => {
                let spec = submission
                    .composite_traintuples
                    .get(task.input_index)
                    .ok_or_else(missing)?;
                create_composite_traintuple(db, spec, placement)?
            }
            TaskType::Aggregatetuple => {
                let spec = submission.aggregatetuples.get(task.input_index).ok_or_else(missing)?;
                create_aggregatetuple(db, spec, placement)?
            }
        };
        created.push(tuple.key().to_string());
    }
    for spec in &submission.testtuples {
        let tuple = create_testtuple(db, spec, Placement::in_plan(plan, None))?;
        created.push(tuple.key().to_string());
    }
    Ok(created)
}

fn build_view(db: &LedgerDb<'_>, plan: ComputePlan, keys: Vec<String>) -> Result<ComputePlanView> {
    let (done_count, tuple_count) = worker_state::plan_progress(db, &plan)?;
    let mut view = ComputePlanView {
        plan,
        tuple_count,
        done_count,
        traintuple_keys: Vec::new(),
        composite_traintuple_keys: Vec::new(),
        aggregatetuple_keys: Vec::new(),
        testtuple_keys: Vec::new(),
    };
    for key in keys {
        match db.get_generic_tuple(&key)?.asset_type {
            AssetType::Traintuple => view.traintuple_keys.push(key),
            AssetType::CompositeTraintuple => view.composite_traintuple_keys.push(key),
            AssetType::Aggregatetuple => view.aggregatetuple_keys.push(key),
            AssetType::Testtuple => view.testtuple_keys.push(key),
            other => {
                return Err(Error::Internal(format!(
                    "compute plan index points at {} {}",
                    other, key
                )))
            }
        }
    }
    Ok(view)
}

// ========== Queries ==========

pub fn query_compute_plan(db: &LedgerDb<'_>, key: &str) -> Result<ComputePlanView> {
    let plan = db.get_compute_plan(key)?;
    let keys = db.get_index_keys(TUPLE_BY_COMPUTE_PLAN, &[key])?;
    build_view(db, plan, keys)
}

pub fn query_compute_plans(
    db: &LedgerDb<'_>,
    page_size: u32,
    bookmark: &str,
) -> Result<ComputePlanPage> {
    let (keys, bookmark) =
        db.get_index_keys_with_pagination(COMPUTE_PLAN_BY_KEY, &[], page_size, bookmark)?;
    let results = keys
        .iter()
        .map(|key| query_compute_plan(db, key))
        .collect::<Result<Vec<_>>>()?;
    Ok(ComputePlanPage { results, bookmark })
}

/// Every tuple of the plan with its effective status, in key order.
pub fn query_compute_plan_tuples(db: &LedgerDb<'_>, key: &str) -> Result<Vec<Tuple>> {
    db.get_compute_plan(key)?;
    db.get_index_keys(TUPLE_BY_COMPUTE_PLAN, &[key])?
        .iter()
        .map(|tuple_key| resolved_tuple(db, tuple_key))
        .collect()
}

pub fn query_models_in_use(db: &LedgerDb<'_>, key: &str) -> Result<Vec<String>> {
    let plan = db.get_compute_plan(key)?;
    worker_state::models_in_use(db, &plan)
}

pub fn query_tuple(db: &LedgerDb<'_>, key: &str) -> Result<Tuple> {
    resolved_tuple(db, key)
}

/// Tuples assigned to `worker`, filtered on their effective status.
///
/// The index holds stored statuses, so every entry of the worker is
/// resolved before filtering.
pub fn query_worker_tuples(
    db: &LedgerDb<'_>,
    worker: &str,
    status: Option<TupleStatus>,
) -> Result<Vec<Tuple>> {
    let mut tuples = Vec::new();
    for key in db.get_index_keys(TUPLE_BY_WORKER_STATUS, &[worker])? {
        let tuple = resolved_tuple(db, &key)?;
        if status.map_or(true, |s| tuple.status() == s) {
            tuples.push(tuple);
        }
    }
    Ok(tuples)
}
