//! Command table.
//!
//! Each ledger command maps to one handler taking JSON arguments and
//! returning a JSON response. [`invoke`] looks the command up, runs it
//! against the transaction and, on success, emits the transaction event.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::assets::{
    AggregatetupleSpec, CompositeTraintupleSpec, ComputePlanSubmission, TesttupleSpec,
    TraintupleSpec, Tuple,
};
use crate::config::DEFAULT_PAGE_SIZE;
use crate::core::TupleStatus;
use crate::error::{Error, Result};
use crate::orchestration::compute_plan;
use crate::orchestration::tuples::{self, Placement, ProgressReport, ReportKind};
use crate::orchestration::PageRequest;
use crate::store::LedgerDb;

pub type Handler = for<'a, 'b> fn(&'a mut LedgerDb<'b>, Value) -> Result<Value>;

pub static HANDLERS: &[(&str, Handler)] = &[
    ("createComputePlan", create_compute_plan),
    ("updateComputePlan", update_compute_plan),
    ("cancelComputePlan", cancel_compute_plan),
    ("queryComputePlan", query_compute_plan),
    ("queryComputePlans", query_compute_plans),
    ("createTraintuple", create_traintuple),
    ("createCompositeTraintuple", create_composite_traintuple),
    ("createAggregatetuple", create_aggregatetuple),
    ("createTesttuple", create_testtuple),
    ("logStartTrain", log_start_train),
    ("logSuccessTrain", log_success_train),
    ("logFailTrain", log_fail_train),
    ("logStartTest", log_start_test),
    ("logSuccessTest", log_success_test),
    ("logFailTest", log_fail_test),
    ("queryTuple", query_tuple),
    ("queryComputePlanTuples", query_compute_plan_tuples),
    ("queryModelsInUse", query_models_in_use),
    ("queryWorkerTuples", query_worker_tuples),
];

pub fn lookup(name: &str) -> Option<Handler> {
    HANDLERS
        .iter()
        .find(|(function, _)| *function == name)
        .map(|(_, handler)| *handler)
}

pub fn function_names() -> impl Iterator<Item = &'static str> {
    HANDLERS.iter().map(|(function, _)| *function)
}

/// Run command `name` in the transaction behind `db`.
///
/// The transaction event is only sent when the handler succeeds; the caller
/// commits or discards the transaction accordingly.
pub fn invoke(db: &mut LedgerDb<'_>, name: &str, args: Value) -> Result<Value> {
    let handler =
        lookup(name).ok_or_else(|| Error::BadRequest(format!("unknown function: {}", name)))?;
    debug!(
        function = name,
        tx_id = %db.tx_id(),
        timestamp = %db.tx_timestamp(),
        "invoke"
    );
    let response = handler(db, args)?;
    db.send_event()?;
    Ok(response)
}

fn parse<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| Error::BadRequest(format!("invalid arguments: {}", e)))
}

fn respond<T: serde::Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

#[derive(Debug, Deserialize)]
struct KeyArgs {
    key: String,
}

/// Tuple descriptor plus the plan it joins, if any.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TupleArgs<T> {
    #[serde(flatten)]
    spec: T,
    #[serde(default)]
    compute_plan_key: String,
}

#[derive(Debug, Deserialize)]
struct WorkerArgs {
    worker: String,
    #[serde(default)]
    status: Option<TupleStatus>,
}

// ========== Compute plans ==========

fn create_compute_plan(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    let submission: ComputePlanSubmission = parse(args)?;
    respond(&compute_plan::create_compute_plan(db, &submission)?)
}

fn update_compute_plan(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    let submission: ComputePlanSubmission = parse(args)?;
    respond(&compute_plan::update_compute_plan(db, &submission)?)
}

fn cancel_compute_plan(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    let args: KeyArgs = parse(args)?;
    respond(&compute_plan::cancel_compute_plan(db, &args.key)?)
}

fn query_compute_plan(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    let args: KeyArgs = parse(args)?;
    respond(&compute_plan::query_compute_plan(db, &args.key)?)
}

fn query_compute_plans(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    let args: PageRequest = parse(args)?;
    let page_size = args.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    respond(&compute_plan::query_compute_plans(db, page_size, &args.bookmark)?)
}

fn query_compute_plan_tuples(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    let args: KeyArgs = parse(args)?;
    respond(&compute_plan::query_compute_plan_tuples(db, &args.key)?)
}

fn query_models_in_use(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    let args: KeyArgs = parse(args)?;
    respond(&compute_plan::query_models_in_use(db, &args.key)?)
}

// ========== Tuples ==========

fn create_tuple<T, F>(db: &mut LedgerDb<'_>, args: Value, create: F) -> Result<Value>
where
    T: DeserializeOwned,
    F: FnOnce(&mut LedgerDb<'_>, &T, Placement<'_>) -> Result<Tuple>,
{
    let args: TupleArgs<T> = parse(args)?;
    let tuple = if args.compute_plan_key.is_empty() {
        create(db, &args.spec, Placement::standalone())?
    } else {
        let mut plan = db.get_compute_plan(&args.compute_plan_key)?;
        let tuple = create(db, &args.spec, Placement::in_plan(&mut plan, None))?;
        db.put_compute_plan(&plan)?;
        tuple
    };
    respond(&tuple)
}

fn create_traintuple(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    create_tuple::<TraintupleSpec, _>(db, args, tuples::create_traintuple)
}

fn create_composite_traintuple(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    create_tuple::<CompositeTraintupleSpec, _>(db, args, tuples::create_composite_traintuple)
}

fn create_aggregatetuple(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    create_tuple::<AggregatetupleSpec, _>(db, args, tuples::create_aggregatetuple)
}

fn create_testtuple(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    create_tuple::<TesttupleSpec, _>(db, args, tuples::create_testtuple)
}

fn query_tuple(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    let args: KeyArgs = parse(args)?;
    respond(&compute_plan::query_tuple(db, &args.key)?)
}

fn query_worker_tuples(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    let args: WorkerArgs = parse(args)?;
    respond(&compute_plan::query_worker_tuples(db, &args.worker, args.status)?)
}

// ========== Progress ==========

fn log_start(db: &mut LedgerDb<'_>, args: Value, kind: ReportKind) -> Result<Value> {
    let args: KeyArgs = parse(args)?;
    respond(&tuples::log_start(db, &args.key, kind)?)
}

fn log_success(db: &mut LedgerDb<'_>, args: Value, kind: ReportKind) -> Result<Value> {
    let report: ProgressReport = parse(args)?;
    respond(&tuples::log_success(db, report, kind)?)
}

fn log_fail(db: &mut LedgerDb<'_>, args: Value, kind: ReportKind) -> Result<Value> {
    let report: ProgressReport = parse(args)?;
    respond(&tuples::log_fail(db, report, kind)?)
}

fn log_start_train(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    log_start(db, args, ReportKind::Train)
}

fn log_success_train(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    log_success(db, args, ReportKind::Train)
}

fn log_fail_train(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    log_fail(db, args, ReportKind::Train)
}

fn log_start_test(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    log_start(db, args, ReportKind::Test)
}

fn log_success_test(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    log_success(db, args, ReportKind::Test)
}

fn log_fail_test(db: &mut LedgerDb<'_>, args: Value) -> Result<Value> {
    log_fail(db, args, ReportKind::Test)
}
