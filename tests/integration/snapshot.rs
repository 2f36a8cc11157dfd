//! Ledger snapshots carried across separate invocations.

use serde_json::{json, Value};
use tempfile::TempDir;

use fedplan::state::StateManager;
use fedplan::{registry, LedgerDb, Result};

use crate::fixtures::{linear_plan, success_args};

/// One CLI-style invocation: load, run, commit and save only on success.
fn invoke_once(manager: &StateManager, creator: &str, function: &str, args: Value) -> Result<Value> {
    let mut ledger = manager.load(creator)?;
    ledger.begin(creator);
    let result = {
        let mut db = LedgerDb::new(&mut ledger);
        registry::invoke(&mut db, function, args)
    };
    match result {
        Ok(response) => {
            ledger.commit();
            manager.save(&ledger)?;
            Ok(response)
        }
        Err(e) => {
            ledger.rollback();
            Err(e)
        }
    }
}

#[test]
fn test_plan_survives_reloads() {
    let temp = TempDir::new().unwrap();
    let manager = StateManager::new(&temp.path().join("ledger").join("state.json"));

    invoke_once(&manager, "orgA", "createComputePlan", linear_plan("plan", true)).unwrap();
    assert!(manager.path().exists());

    for key in ["one", "two", "three", "four"] {
        invoke_once(&manager, "orgA", "logStartTrain", json!({ "key": key })).unwrap();
        invoke_once(&manager, "orgA", "logSuccessTrain", success_args(key)).unwrap();
    }

    let plan = invoke_once(&manager, "orgA", "queryComputePlan", json!({ "key": "plan" })).unwrap();
    assert_eq!(plan["status"], "done");
    assert_eq!(plan["doneCount"], 4);

    // Creation, eight progress reports; queries emit nothing.
    let ledger = manager.load("orgA").unwrap();
    assert_eq!(ledger.events().len(), 9);
}

#[test]
fn test_failed_invocation_leaves_snapshot_untouched() {
    let temp = TempDir::new().unwrap();
    let manager = StateManager::new(&temp.path().join("state.json"));

    invoke_once(&manager, "orgA", "createComputePlan", linear_plan("plan", false)).unwrap();
    let before = std::fs::read_to_string(manager.path()).unwrap();

    // "two" is still waiting on "one".
    assert!(invoke_once(&manager, "orgA", "logStartTrain", json!({ "key": "two" })).is_err());
    let after = std::fs::read_to_string(manager.path()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_creator_is_taken_per_invocation() {
    let temp = TempDir::new().unwrap();
    let manager = StateManager::new(&temp.path().join("state.json"));

    invoke_once(&manager, "orgA", "createComputePlan", linear_plan("plan", false)).unwrap();
    let err = invoke_once(&manager, "orgB", "cancelComputePlan", json!({ "key": "plan" }))
        .unwrap_err();
    assert_eq!(err.kind(), fedplan::ErrorKind::BadRequest);

    let view = invoke_once(&manager, "orgA", "cancelComputePlan", json!({ "key": "plan" })).unwrap();
    assert_eq!(view["status"], "canceled");
}
