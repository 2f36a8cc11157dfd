//! Tuple creation and worker progress reports.
//!
//! Creation validates the parents a tuple consumes, derives the out-model
//! permissions and writes the tuple with every index that points at it.
//! Progress reports move a tuple through its explicit transitions and keep
//! the owning compute plan's bookkeeping in step.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assets::{
    Aggregatetuple, AggregatetupleSpec, AssetType, CompositeTraintuple, CompositeTraintupleSpec,
    ComputePlan, GenericTuple, OutModel, Permissions, PlanStatus, Privilege, Testtuple,
    TesttupleSpec, Traintuple, TraintupleSpec, Tuple,
};
use crate::core::TupleStatus;
use crate::error::{Error, Result};
use crate::orchestration::resolver::StatusResolver;
use crate::orchestration::worker_state;
use crate::store::index::{TUPLE_BY_COMPUTE_PLAN, TUPLE_BY_IN_MODEL, TUPLE_BY_WORKER_STATUS};
use crate::store::{LedgerDb, TupleEventEntry};

/// Where a new tuple is recorded.
pub struct Placement<'p> {
    plan: Option<&'p mut ComputePlan>,
    rank: Option<usize>,
}

impl<'p> Placement<'p> {
    /// Outside any compute plan; rank derived from the parents.
    pub fn standalone() -> Self {
        Self {
            plan: None,
            rank: None,
        }
    }

    /// Inside `plan`. The caller writes the plan back once done.
    ///
    /// `rank` is the depth assigned by the sorter, if the tuple went
    /// through it.
    pub fn in_plan(plan: &'p mut ComputePlan, rank: Option<usize>) -> Self {
        Self {
            plan: Some(plan),
            rank,
        }
    }
}

/// Which progress commands a tuple answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// Traintuples, composite traintuples and aggregatetuples.
    Train,
    Test,
}

impl ReportKind {
    fn accepts(&self, tuple: &Tuple) -> bool {
        match self {
            ReportKind::Train => tuple.produces_models(),
            ReportKind::Test => !tuple.produces_models(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ReportKind::Train => "training tuple",
            ReportKind::Test => "testtuple",
        }
    }
}

/// Worker report for `logStart*`, `logSuccess*` and `logFail*`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub key: String,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub out_model: Option<OutModel>,
    #[serde(default)]
    pub out_head_model: Option<OutModel>,
    #[serde(default)]
    pub out_trunk_model: Option<OutModel>,
    #[serde(default)]
    pub perf: Option<f64>,
}

impl ProgressReport {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Self::default()
        }
    }
}

// ========== Creation ==========

pub fn create_traintuple(
    db: &mut LedgerDb<'_>,
    spec: &TraintupleSpec,
    placement: Placement<'_>,
) -> Result<Tuple> {
    let mut tuple = Traintuple {
        generic: generic_for(&spec.id, AssetType::Traintuple, &spec.worker, &spec.tag)?,
        algo_key: spec.algo_key.clone(),
        in_models: spec
            .in_models_ids
            .iter()
            .filter(|id| !id.is_empty())
            .cloned()
            .collect(),
        data_manager_key: spec.data_manager_key.clone(),
        data_sample_keys: spec.data_sample_keys.clone(),
        permissions: Permissions::default(),
        out_model: None,
    };
    let parents = load_parents(db, &spec.id, &unique(&tuple.in_models))?;
    tuple.permissions = merge_parent_permissions(
        &spec.id,
        spec.permissions.clone().unwrap_or_default(),
        &spec.worker,
        &parents.tuples,
    )?;
    persist(db, Tuple::Train(tuple), &parents, placement)
}

pub fn create_composite_traintuple(
    db: &mut LedgerDb<'_>,
    spec: &CompositeTraintupleSpec,
    placement: Placement<'_>,
) -> Result<Tuple> {
    let tuple = CompositeTraintuple {
        generic: generic_for(
            &spec.id,
            AssetType::CompositeTraintuple,
            &spec.worker,
            &spec.tag,
        )?,
        algo_key: spec.algo_key.clone(),
        in_head_model: spec.in_head_model_id.clone(),
        in_trunk_model: spec.in_trunk_model_id.clone(),
        data_manager_key: spec.data_manager_key.clone(),
        data_sample_keys: spec.data_sample_keys.clone(),
        head_permissions: Permissions::new(Privilege::restricted([spec.worker.as_str()])),
        trunk_permissions: Permissions::default(),
        out_head_model: None,
        out_trunk_model: None,
    };
    let mut tuple = Tuple::Composite(tuple);
    let keys: Vec<String> = tuple.parent_keys().iter().map(|k| k.to_string()).collect();
    let parents = load_parents(db, &spec.id, &keys)?;

    let requested = spec.out_trunk_model_permissions.clone().unwrap_or_default();
    let mut trunk_permissions = requested.clone();
    for parent in &parents.tuples {
        if parent.key() == spec.in_head_model_id {
            if !matches!(parent, Tuple::Composite(_)) {
                return Err(Error::BadRequest(format!(
                    "head model {} of {} must come from a composite traintuple",
                    parent.key(),
                    spec.id
                )));
            }
            authorize(&spec.worker, parent, true)?;
        }
        if parent.key() == spec.in_trunk_model_id {
            trunk_permissions = requested.merge(authorize(&spec.worker, parent, false)?);
        }
    }
    check_worker_kept(&spec.id, &spec.worker, &trunk_permissions)?;
    if let Tuple::Composite(t) = &mut tuple {
        t.trunk_permissions = trunk_permissions;
    }
    persist(db, tuple, &parents, placement)
}

pub fn create_aggregatetuple(
    db: &mut LedgerDb<'_>,
    spec: &AggregatetupleSpec,
    placement: Placement<'_>,
) -> Result<Tuple> {
    let mut tuple = Aggregatetuple {
        generic: generic_for(&spec.id, AssetType::Aggregatetuple, &spec.worker, &spec.tag)?,
        algo_key: spec.algo_key.clone(),
        in_models: spec
            .in_models_ids
            .iter()
            .filter(|id| !id.is_empty())
            .cloned()
            .collect(),
        permissions: Permissions::default(),
        out_model: None,
    };
    let parents = load_parents(db, &spec.id, &unique(&tuple.in_models))?;
    tuple.permissions = merge_parent_permissions(
        &spec.id,
        Permissions::default(),
        &spec.worker,
        &parents.tuples,
    )?;
    persist(db, Tuple::Aggregate(tuple), &parents, placement)
}

pub fn create_testtuple(
    db: &mut LedgerDb<'_>,
    spec: &TesttupleSpec,
    placement: Placement<'_>,
) -> Result<Tuple> {
    if spec.traintuple_id.is_empty() {
        return Err(Error::BadRequest(format!(
            "testtuple {} does not name the model under test",
            spec.key
        )));
    }
    let tuple = Testtuple {
        generic: generic_for(&spec.key, AssetType::Testtuple, &spec.worker, &spec.tag)?,
        traintuple_key: spec.traintuple_id.clone(),
        data_manager_key: spec.data_manager_key.clone(),
        data_sample_keys: spec.data_sample_keys.clone(),
        perf: None,
    };
    let parents = load_parents(db, &spec.key, &[spec.traintuple_id.clone()])?;
    for parent in &parents.tuples {
        // A composite model is evaluated with both its head and trunk.
        if matches!(parent, Tuple::Composite(_)) {
            authorize(&spec.worker, parent, true)?;
        }
        authorize(&spec.worker, parent, false)?;
    }
    persist(db, Tuple::Test(tuple), &parents, placement)
}

fn generic_for(key: &str, asset_type: AssetType, worker: &str, tag: &str) -> Result<GenericTuple> {
    if key.is_empty() {
        return Err(Error::BadRequest(format!("{} without a key", asset_type)));
    }
    if worker.is_empty() {
        return Err(Error::BadRequest(format!("{} {} has no worker", asset_type, key)));
    }
    let mut generic = GenericTuple::new(key, asset_type, worker);
    generic.tag = tag.to_string();
    Ok(generic)
}

fn unique(keys: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        if !key.is_empty() && !out.contains(key) {
            out.push(key.clone());
        }
    }
    out
}

/// Parents of a tuple being created.
struct Parents {
    tuples: Vec<Tuple>,
    /// `Todo` when every parent already succeeded.
    initial_status: TupleStatus,
}

fn load_parents(db: &LedgerDb<'_>, child: &str, keys: &[String]) -> Result<Parents> {
    let mut resolver = StatusResolver::new(db);
    let mut tuples = Vec::with_capacity(keys.len());
    let mut all_done = true;
    for key in keys {
        let parent = match db.get_tuple(key) {
            Ok(parent) => parent,
            Err(Error::NotFound(_)) => {
                return Err(Error::BadRequest(format!(
                    "{} consumes unknown model {}",
                    child, key
                )))
            }
            Err(e) => return Err(e),
        };
        if !parent.produces_models() {
            return Err(Error::BadRequest(format!(
                "{} consumes {} which produces no model",
                child, key
            )));
        }
        match resolver.resolve(key)? {
            status @ (TupleStatus::Failed | TupleStatus::Canceled) => {
                return Err(Error::BadRequest(format!(
                    "{} consumes model {} whose tuple is {}",
                    child, key, status
                )))
            }
            TupleStatus::Done => {}
            _ => all_done = false,
        }
        tuples.push(parent);
    }
    Ok(Parents {
        tuples,
        initial_status: if all_done {
            TupleStatus::Todo
        } else {
            TupleStatus::Waiting
        },
    })
}

/// Permissions on the model `worker` would consume from `parent`, if it is
/// allowed to.
fn authorize<'t>(worker: &str, parent: &'t Tuple, as_head: bool) -> Result<&'t Permissions> {
    let permissions = parent.out_model_permissions(as_head).ok_or_else(|| {
        Error::BadRequest(format!("{} produces no model", parent.key()))
    })?;
    if !permissions.process.is_authorized(worker) {
        return Err(Error::BadRequest(format!(
            "worker {} is not authorized to process model {}",
            worker,
            parent.key()
        )));
    }
    Ok(permissions)
}

fn merge_parent_permissions(
    key: &str,
    requested: Permissions,
    worker: &str,
    parents: &[Tuple],
) -> Result<Permissions> {
    let mut merged = requested;
    for parent in parents {
        merged = merged.merge(authorize(worker, parent, false)?);
    }
    check_worker_kept(key, worker, &merged)?;
    Ok(merged)
}

fn check_worker_kept(key: &str, worker: &str, permissions: &Permissions) -> Result<()> {
    if permissions
        .process
        .includes(&Privilege::restricted([worker]))
    {
        return Ok(());
    }
    Err(Error::BadRequest(format!(
        "out-model permissions of {} exclude its own worker {}",
        key, worker
    )))
}

fn persist(
    db: &mut LedgerDb<'_>,
    mut tuple: Tuple,
    parents: &Parents,
    placement: Placement<'_>,
) -> Result<Tuple> {
    let key = tuple.key().to_string();
    if db.key_exists(&key)? {
        return Err(Error::Conflict(format!("tuple {} already exists", key)));
    }

    let is_test = !tuple.produces_models();
    let derived_rank = parents
        .tuples
        .iter()
        .map(|p| if is_test { p.generic().rank } else { p.generic().rank + 1 })
        .max()
        .unwrap_or(0);

    let invoker = db.invoker();
    {
        let generic = tuple.generic_mut();
        generic.status = parents.initial_status;
        generic.rank = placement.rank.unwrap_or(derived_rank);
        generic.creator = invoker;
    }
    let worker = tuple.generic().worker.clone();

    if let Some(plan) = placement.plan {
        if plan.status.is_terminal() {
            return Err(Error::BadRequest(format!(
                "compute plan {} is {}",
                plan.key, plan.status
            )));
        }
        tuple.generic_mut().compute_plan_key = plan.key.clone();
        worker_state::add_tuple(db, plan, &worker)?;
        db.create_index(TUPLE_BY_COMPUTE_PLAN, &[plan.key.as_str(), key.as_str()])?;
    }
    for parent in &parents.tuples {
        db.create_index(TUPLE_BY_IN_MODEL, &[parent.key(), key.as_str()])?;
    }
    let status = tuple.status();
    db.create_index(
        TUPLE_BY_WORKER_STATUS,
        &[worker.as_str(), status.as_str(), key.as_str()],
    )?;
    db.add_tuple(&tuple)?;
    db.add_tuple_event(event_entry(&tuple));

    debug!(
        key = %key,
        asset_type = %tuple.generic().asset_type,
        worker = %worker,
        rank = tuple.generic().rank,
        status = %status,
        "tuple created"
    );
    Ok(tuple)
}

fn event_entry(tuple: &Tuple) -> TupleEventEntry {
    let generic = tuple.generic();
    TupleEventEntry {
        key: generic.key.clone(),
        asset_type: generic.asset_type.to_string(),
        status: generic.status.to_string(),
        worker: generic.worker.clone(),
    }
}

// ========== Status writes ==========

/// Write `target` as the stored status, moving the worker queue entry.
pub(crate) fn write_status(
    db: &mut LedgerDb<'_>,
    tuple: &mut Tuple,
    target: TupleStatus,
) -> Result<()> {
    let stored = tuple.status();
    let key = tuple.key().to_string();
    let worker = tuple.generic().worker.clone();
    db.delete_index(
        TUPLE_BY_WORKER_STATUS,
        &[worker.as_str(), stored.as_str(), key.as_str()],
    )?;
    tuple.generic_mut().status = target;
    db.create_index(
        TUPLE_BY_WORKER_STATUS,
        &[worker.as_str(), target.as_str(), key.as_str()],
    )?;
    db.put_tuple(tuple)?;
    db.add_tuple_event(event_entry(tuple));
    debug!(key = %key, from = %stored, to = %target, "tuple status written");
    Ok(())
}

fn load_for_report(db: &LedgerDb<'_>, key: &str, kind: ReportKind) -> Result<(Tuple, TupleStatus)> {
    let tuple = db.get_tuple(key)?;
    if !kind.accepts(&tuple) {
        return Err(Error::NotFound(format!("no {} with key {}", kind.label(), key)));
    }
    let invoker = db.invoker();
    if invoker != tuple.generic().worker {
        return Err(Error::BadRequest(format!(
            "{} is not allowed to update tuple {} (worker {})",
            invoker,
            key,
            tuple.generic().worker
        )));
    }
    let effective = StatusResolver::new(db).resolve_tuple(&tuple)?;
    Ok((tuple, effective))
}

/// `Todo -> Doing`.
pub fn log_start(db: &mut LedgerDb<'_>, key: &str, kind: ReportKind) -> Result<Tuple> {
    let (mut tuple, effective) = load_for_report(db, key, kind)?;
    effective.check_transition(TupleStatus::Doing)?;

    let plan = if tuple.generic().in_compute_plan() {
        let plan = db.get_compute_plan(&tuple.generic().compute_plan_key)?;
        if plan.status.is_terminal() {
            return Err(Error::BadRequest(format!(
                "compute plan {} is {}",
                plan.key, plan.status
            )));
        }
        Some(plan)
    } else {
        None
    };

    write_status(db, &mut tuple, TupleStatus::Doing)?;
    if let Some(mut plan) = plan {
        if plan.status == PlanStatus::Todo {
            plan.status = PlanStatus::Doing;
            db.put_compute_plan(&plan)?;
            info!(plan = %plan.key, "compute plan started");
        }
    }
    Ok(tuple)
}

/// `Doing -> Done`, recording the outputs the report carries.
pub fn log_success(db: &mut LedgerDb<'_>, report: ProgressReport, kind: ReportKind) -> Result<Tuple> {
    let (mut tuple, effective) = load_for_report(db, &report.key, kind)?;
    effective.check_transition(TupleStatus::Done)?;

    let missing = |field: &str| {
        Error::BadRequest(format!("success report for {} lacks {}", report.key, field))
    };
    match &mut tuple {
        Tuple::Train(t) => {
            t.out_model = Some(report.out_model.clone().ok_or_else(|| missing("outModel"))?);
        }
        Tuple::Aggregate(t) => {
            t.out_model = Some(report.out_model.clone().ok_or_else(|| missing("outModel"))?);
        }
        Tuple::Composite(t) => {
            let head = report.out_head_model.clone().ok_or_else(|| missing("outHeadModel"))?;
            let trunk = report.out_trunk_model.clone().ok_or_else(|| missing("outTrunkModel"))?;
            t.out_head_model = Some(head);
            t.out_trunk_model = Some(trunk);
        }
        Tuple::Test(t) => {
            t.perf = Some(report.perf.ok_or_else(|| missing("perf"))?);
        }
    }
    tuple.generic_mut().log = report.log.clone();
    write_status(db, &mut tuple, TupleStatus::Done)?;
    info!(key = %tuple.key(), "tuple done");

    if tuple.generic().in_compute_plan() {
        on_plan_tuple_done(db, &tuple)?;
    }
    Ok(tuple)
}

/// `Waiting | Todo | Doing -> Failed`. Fails the whole compute plan.
pub fn log_fail(db: &mut LedgerDb<'_>, report: ProgressReport, kind: ReportKind) -> Result<Tuple> {
    let (mut tuple, effective) = load_for_report(db, &report.key, kind)?;
    effective.check_transition(TupleStatus::Failed)?;

    tuple.generic_mut().log = report.log;
    write_status(db, &mut tuple, TupleStatus::Failed)?;
    warn!(key = %tuple.key(), "tuple failed");

    if tuple.generic().in_compute_plan() {
        let plan_key = tuple.generic().compute_plan_key.clone();
        worker_state::mark_done(db, &plan_key, &tuple.generic().worker)?;
        let mut plan = db.get_compute_plan(&plan_key)?;
        if !plan.status.is_terminal() {
            plan.status = PlanStatus::Failed;
            finish_plan(db, &mut plan)?;
        }
    }
    Ok(tuple)
}

fn on_plan_tuple_done(db: &mut LedgerDb<'_>, tuple: &Tuple) -> Result<()> {
    let plan_key = tuple.generic().compute_plan_key.clone();
    worker_state::mark_done(db, &plan_key, &tuple.generic().worker)?;
    let mut plan = db.get_compute_plan(&plan_key)?;

    if plan.status.is_terminal() {
        // Tracked models were released when the plan finished.
        if plan.clean_models && tuple.produces_models() {
            db.add_deleted_models([tuple.key().to_string()]);
        }
        return Ok(());
    }

    if let Err(e) = release_models(db, &plan, tuple) {
        warn!(plan = %plan_key, key = %tuple.key(), error = %e, "intermediary model update failed");
    }

    if worker_state::is_plan_resolved(db, &plan)? {
        plan.status = PlanStatus::Done;
        finish_plan(db, &mut plan)?;
    } else if plan.status == PlanStatus::Todo {
        plan.status = PlanStatus::Doing;
        db.put_compute_plan(&plan)?;
    }
    Ok(())
}

/// Re-evaluate the models of the finished tuple's worker, tracking its own
/// model, then the models of every worker that produced one of its inputs.
fn release_models(db: &mut LedgerDb<'_>, plan: &ComputePlan, tuple: &Tuple) -> Result<()> {
    let worker = tuple.generic().worker.clone();
    let own_model = tuple.produces_models().then(|| tuple.key());
    worker_state::update_models_in_use(db, plan, &worker, own_model)?;

    let mut visited = vec![worker];
    for parent_key in tuple.parent_keys() {
        let parent = db.get_generic_tuple(parent_key)?;
        if visited.contains(&parent.worker) || !plan.has_worker(&parent.worker) {
            continue;
        }
        worker_state::update_models_in_use(db, plan, &parent.worker, None)?;
        visited.push(parent.worker);
    }
    Ok(())
}

/// Record a terminal plan status and release every model it still holds.
pub(crate) fn finish_plan(db: &mut LedgerDb<'_>, plan: &mut ComputePlan) -> Result<()> {
    db.put_compute_plan(plan)?;
    db.add_compute_plan_event(&plan.key);
    info!(plan = %plan.key, status = %plan.status, "compute plan finished");
    if let Err(e) = worker_state::clear_models_in_use(db, plan) {
        warn!(plan = %plan.key, error = %e, "compute plan model cleanup failed");
    }
    Ok(())
}
