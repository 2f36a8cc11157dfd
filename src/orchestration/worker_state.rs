//! Per (plan, worker) bookkeeping and intermediary model collection.
//!
//! Each worker taking part in a compute plan has one
//! [`ComputePlanWorkerState`] counting the tuples it was assigned and the
//! ones that finished, plus the models its tuples produced that some
//! dependent may still need. A model leaves that set once every dependent
//! reads `Done`, at which point it is reported for deletion through the
//! transaction event.

use tracing::{debug, info};

use crate::assets::{ComputePlan, ComputePlanWorkerState};
use crate::core::TupleStatus;
use crate::error::{Error, Result};
use crate::orchestration::resolver::StatusResolver;
use crate::store::index::TUPLE_BY_IN_MODEL;
use crate::store::LedgerDb;

/// Record one more tuple assigned to `worker` in `plan`.
///
/// Registers the worker on the plan the first time; the caller writes the
/// plan back.
pub fn add_tuple(db: &mut LedgerDb<'_>, plan: &mut ComputePlan, worker: &str) -> Result<()> {
    let key = ComputePlanWorkerState::key_for(&plan.key, worker);
    let state = if db.key_exists(&key)? {
        let mut state = db.get_worker_state(&key)?;
        state.tuple_count += 1;
        state
    } else {
        let mut state = ComputePlanWorkerState::new(&plan.key, worker);
        state.tuple_count = 1;
        state
    };
    db.put_worker_state(&state)?;

    if plan.add_worker(worker) {
        debug!(plan = %plan.key, worker, "worker joined compute plan");
    }
    Ok(())
}

/// Record one tuple of `worker` reaching a terminal status.
///
/// # Errors
/// `Internal` if every assigned tuple is already counted as done.
pub fn mark_done(
    db: &mut LedgerDb<'_>,
    plan_key: &str,
    worker: &str,
) -> Result<ComputePlanWorkerState> {
    let key = ComputePlanWorkerState::key_for(plan_key, worker);
    let mut state = db.get_worker_state(&key)?;
    if state.done_count >= state.tuple_count {
        return Err(Error::Internal(format!(
            "worker {} of compute plan {} has no unfinished tuple ({}/{})",
            worker, plan_key, state.done_count, state.tuple_count
        )));
    }
    state.done_count += 1;
    db.put_worker_state(&state)?;
    Ok(state)
}

/// `(done, total)` summed over every worker of the plan.
pub fn plan_progress(db: &LedgerDb<'_>, plan: &ComputePlan) -> Result<(usize, usize)> {
    let mut done = 0;
    let mut total = 0;
    for key in &plan.state_keys {
        let state = db.get_worker_state(key)?;
        done += state.done_count;
        total += state.tuple_count;
    }
    Ok((done, total))
}

/// Every tuple of the plan reached a terminal status.
pub fn is_plan_resolved(db: &LedgerDb<'_>, plan: &ComputePlan) -> Result<bool> {
    let (done, total) = plan_progress(db, plan)?;
    Ok(total > 0 && done == total)
}

/// Re-evaluate the models `worker` keeps for `plan`, then track `new_model`.
///
/// Tracked models no dependent still needs are dropped and returned; they
/// are also queued on the transaction event. `new_model` is tracked only
/// when the plan cleans models and the model already has a dependent.
pub fn update_models_in_use(
    db: &mut LedgerDb<'_>,
    plan: &ComputePlan,
    worker: &str,
    new_model: Option<&str>,
) -> Result<Vec<String>> {
    let key = ComputePlanWorkerState::key_for(&plan.key, worker);
    let mut state = db.get_worker_state(&key)?;

    let mut unused = Vec::new();
    {
        let reader: &LedgerDb<'_> = db;
        let mut resolver = StatusResolver::new(reader);
        let mut kept = Vec::with_capacity(state.intermediary_models_in_use.len());
        for model in state.intermediary_models_in_use.drain(..) {
            if is_model_in_use(reader, &mut resolver, &model)? {
                kept.push(model);
            } else {
                unused.push(model);
            }
        }
        state.intermediary_models_in_use = kept;

        if let Some(model) = new_model {
            if plan.clean_models && !dependents(reader, model)?.is_empty() {
                state.track_model(model);
            }
        }
    }

    db.put_worker_state(&state)?;
    if !unused.is_empty() {
        info!(plan = %plan.key, worker, models = ?unused, "intermediary models released");
        db.add_deleted_models(unused.clone());
    }
    Ok(unused)
}

/// Drain every worker's model set, in plan worker order.
///
/// Runs when the plan terminates, whatever the dependents' statuses.
pub fn clear_models_in_use(db: &mut LedgerDb<'_>, plan: &ComputePlan) -> Result<Vec<String>> {
    let mut released = Vec::new();
    for key in &plan.state_keys {
        let mut state = db.get_worker_state(key)?;
        if state.intermediary_models_in_use.is_empty() {
            continue;
        }
        released.append(&mut state.intermediary_models_in_use);
        db.put_worker_state(&state)?;
    }
    if !released.is_empty() {
        info!(plan = %plan.key, models = ?released, "compute plan models released");
        db.add_deleted_models(released.clone());
    }
    Ok(released)
}

/// Every model still tracked for `plan`, in plan worker order.
pub fn models_in_use(db: &LedgerDb<'_>, plan: &ComputePlan) -> Result<Vec<String>> {
    let mut models = Vec::new();
    for key in &plan.state_keys {
        let state = db.get_worker_state(key)?;
        models.extend(state.intermediary_models_in_use);
    }
    Ok(models)
}

/// Committed tuples consuming `model`.
pub fn dependents(db: &LedgerDb<'_>, model: &str) -> Result<Vec<String>> {
    db.get_index_keys(TUPLE_BY_IN_MODEL, &[model])
}

/// A model with no recorded dependent is kept: the dependent may be
/// waiting in a transaction that has not committed yet.
fn is_model_in_use(
    db: &LedgerDb<'_>,
    resolver: &mut StatusResolver<'_, '_>,
    model: &str,
) -> Result<bool> {
    let children = dependents(db, model)?;
    if children.is_empty() {
        return Ok(true);
    }
    for child in &children {
        if resolver.resolve(child)? != TupleStatus::Done {
            return Ok(true);
        }
    }
    Ok(false)
}
