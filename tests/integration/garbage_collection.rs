//! Intermediary model collection.
//!
//! With `cleanModels` set, a model produced inside a compute plan is kept
//! while one of its dependents has not succeeded, and announced for
//! deletion exactly once through the transaction events.

use serde_json::{json, Value};

use crate::fixtures::{linear_plan, testtuple, traintuple, LedgerHarness};

fn models_in_use(harness: &mut LedgerHarness, plan: &str) -> Value {
    harness.ok("orgA", "queryModelsInUse", json!({ "key": plan }))
}

/// Every deletion notice, in emission order.
fn deleted(harness: &LedgerHarness) -> Vec<String> {
    harness
        .events()
        .into_iter()
        .flat_map(|event| event.deleted_models)
        .collect()
}

#[test]
fn test_linear_plan_releases_each_model_once() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createComputePlan", linear_plan("plan", true));

    harness.run("orgA", "one");
    assert_eq!(models_in_use(&mut harness, "plan"), json!(["one"]));
    assert!(deleted(&harness).is_empty());

    harness.run("orgA", "two");
    assert_eq!(models_in_use(&mut harness, "plan"), json!(["two"]));
    assert_eq!(harness.last_event().deleted_models, vec!["one".to_string()]);

    harness.run("orgA", "three");
    harness.run("orgA", "four");

    // The last model has no dependent and is never tracked.
    assert_eq!(models_in_use(&mut harness, "plan"), json!([]));
    assert_eq!(deleted(&harness), vec!["one", "two", "three"]);
}

#[test]
fn test_models_kept_without_clean_models() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createComputePlan", linear_plan("plan", false));

    for key in ["one", "two", "three"] {
        harness.run("orgA", key);
        assert_eq!(models_in_use(&mut harness, "plan"), json!([]));
    }
    harness.run("orgA", "four");
    assert!(deleted(&harness).is_empty());
}

#[test]
fn test_failure_releases_remaining_models() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createComputePlan", linear_plan("plan", true));
    harness.run("orgA", "one");
    harness.run("orgA", "two");
    assert_eq!(models_in_use(&mut harness, "plan"), json!(["two"]));

    harness.ok("orgA", "logFailTrain", json!({ "key": "three" }));
    let event = harness.last_event();
    assert_eq!(event.deleted_models, vec!["two".to_string()]);
    assert_eq!(event.compute_plans, vec!["plan".to_string()]);
    assert_eq!(models_in_use(&mut harness, "plan"), json!([]));
    assert_eq!(deleted(&harness), vec!["one", "two"]);
}

#[test]
fn test_cancel_releases_remaining_models() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createComputePlan", linear_plan("plan", true));
    harness.run("orgA", "one");

    harness.ok("orgA", "cancelComputePlan", json!({ "key": "plan" }));
    let event = harness.last_event();
    assert_eq!(event.deleted_models, vec!["one".to_string()]);
    assert_eq!(models_in_use(&mut harness, "plan"), json!([]));
}

#[test]
fn test_model_kept_until_testtuple_done() {
    let mut harness = LedgerHarness::new();
    harness.ok(
        "orgA",
        "createComputePlan",
        json!({
            "key": "plan",
            "cleanModels": true,
            "traintuples": [
                traintuple("one", "orgA", &[]),
                traintuple("two", "orgA", &["one"]),
            ],
            "testtuples": [testtuple("eval", "orgA", "one")],
        }),
    );

    harness.run("orgA", "one");
    harness.run("orgA", "two");
    assert_eq!(models_in_use(&mut harness, "plan"), json!(["one"]));

    harness.ok("orgA", "logStartTest", json!({ "key": "eval" }));
    harness.ok("orgA", "logSuccessTest", json!({ "key": "eval", "perf": 0.5 }));

    let event = harness.last_event();
    assert_eq!(event.deleted_models, vec!["one".to_string()]);
    assert_eq!(event.compute_plans, vec!["plan".to_string()]);
    let plan = harness.ok("orgA", "queryComputePlan", json!({ "key": "plan" }));
    assert_eq!(plan["status"], "done");
}

#[test]
fn test_parent_worker_releases_its_model() {
    let mut harness = LedgerHarness::new();
    harness.ok(
        "orgA",
        "createComputePlan",
        json!({
            "key": "plan",
            "cleanModels": true,
            "traintuples": [
                traintuple("b1", "orgB", &[]),
                traintuple("a1", "orgA", &["b1"]),
                traintuple("a2", "orgA", &["a1"]),
            ],
        }),
    );

    harness.run("orgB", "b1");
    assert_eq!(models_in_use(&mut harness, "plan"), json!(["b1"]));

    // Finishing on orgA releases the model kept by orgB.
    harness.run("orgA", "a1");
    assert_eq!(harness.last_event().deleted_models, vec!["b1".to_string()]);
    assert_eq!(models_in_use(&mut harness, "plan"), json!(["a1"]));

    harness.run("orgA", "a2");
    assert_eq!(deleted(&harness), vec!["b1", "a1"]);
}

#[test]
fn test_success_after_plan_failure_is_not_tracked() {
    let mut harness = LedgerHarness::new();
    harness.ok(
        "orgA",
        "createComputePlan",
        json!({
            "key": "plan",
            "cleanModels": true,
            "traintuples": [
                traintuple("a", "orgA", &[]),
                traintuple("b", "orgA", &[]),
                traintuple("c", "orgA", &["b"]),
            ],
        }),
    );
    harness.start("orgA", "a");
    harness.start("orgA", "b");
    harness.ok("orgA", "logFailTrain", json!({ "key": "a" }));
    assert_eq!(models_in_use(&mut harness, "plan"), json!([]));

    // "b" was already running when the plan failed.
    harness.succeed("orgA", "b");
    assert_eq!(harness.stored_status("b"), "done");
    assert_eq!(models_in_use(&mut harness, "plan"), json!([]));
    assert_eq!(harness.last_event().deleted_models, vec!["b".to_string()]);
    assert_eq!(deleted(&harness), vec!["b"]);

    let plan = harness.ok("orgA", "queryComputePlan", json!({ "key": "plan" }));
    assert_eq!(plan["status"], "failed");
}
