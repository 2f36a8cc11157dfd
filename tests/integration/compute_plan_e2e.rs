//! End-to-end compute plan tests.
//!
//! A plan is submitted, its tuples are driven through their progress
//! commands by the owning workers, and the plan's aggregate status and
//! events are checked along the way.

use serde_json::json;

use fedplan::ErrorKind;

use crate::fixtures::{
    composite, linear_plan, testtuple, traintuple, LedgerHarness,
};

fn keys(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .expect("expected an array")
        .iter()
        .map(|v| v.as_str().unwrap_or_default().to_string())
        .collect()
}

/// Test: linear chain is ordered with increasing ranks.
#[test]
fn test_linear_plan_ranks() {
    let mut harness = LedgerHarness::new();
    let view = harness.ok("orgA", "createComputePlan", linear_plan("plan", false));

    assert_eq!(keys(&view["traintupleKeys"]), vec!["one", "two", "three", "four"]);
    assert_eq!(view["tupleCount"], 4);
    assert_eq!(view["doneCount"], 0);
    assert_eq!(view["status"], "todo");

    let tuples = harness.ok("orgA", "queryComputePlanTuples", json!({ "key": "plan" }));
    let ranks: Vec<(String, u64)> = tuples
        .as_array()
        .unwrap()
        .iter()
        .map(|t| {
            (
                t["key"].as_str().unwrap().to_string(),
                t["rank"].as_u64().unwrap(),
            )
        })
        .collect();
    assert!(ranks.contains(&("one".to_string(), 0)));
    assert!(ranks.contains(&("two".to_string(), 1)));
    assert!(ranks.contains(&("three".to_string(), 2)));
    assert!(ranks.contains(&("four".to_string(), 3)));
}

/// Test: submission order does not matter, dependencies do.
#[test]
fn test_reversed_submission_is_sorted() {
    let mut harness = LedgerHarness::new();
    let view = harness.ok(
        "orgA",
        "createComputePlan",
        json!({
            "key": "plan",
            "traintuples": [
                traintuple("four", "orgA", &["three"]),
                traintuple("three", "orgA", &["two"]),
                traintuple("two", "orgA", &["one"]),
                traintuple("one", "orgA", &[]),
            ],
        }),
    );
    assert_eq!(keys(&view["traintupleKeys"]), vec!["one", "two", "three", "four"]);
}

/// Test: missing dependency names exactly the unplaceable task.
#[test]
fn test_missing_dependency_reports_unplaceable_set() {
    let mut harness = LedgerHarness::new();
    let err = harness
        .invoke(
            "orgA",
            "createComputePlan",
            json!({
                "key": "plan",
                "traintuples": [
                    traintuple("one", "orgA", &[]),
                    traintuple("two", "orgA", &["one"]),
                    traintuple("three", "orgA", &["two"]),
                    traintuple("four", "orgA", &["five"]),
                ],
            }),
        )
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BadRequest);
    match &err {
        fedplan::Error::UnplaceableTasks(ids) => assert_eq!(ids, &vec!["four".to_string()]),
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("cyclic or missing dependency"));

    // Nothing was committed.
    let err = harness
        .invoke("orgA", "queryComputePlan", json!({ "key": "plan" }))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(harness.ledger.committed_len(), 0);
}

/// Test: duplicate task id rejected even when placeable.
#[test]
fn test_duplicate_task_id_rejected() {
    let mut harness = LedgerHarness::new();
    let err = harness
        .invoke(
            "orgA",
            "createComputePlan",
            json!({
                "key": "plan",
                "traintuples": [
                    traintuple("one", "orgA", &[]),
                    traintuple("one", "orgA", &[]),
                ],
            }),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert!(err.to_string().contains("duplicate training task ID: one"));
}

/// Test: driving every tuple to success finishes the plan.
#[test]
fn test_plan_runs_to_done() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createComputePlan", linear_plan("plan", false));

    assert_eq!(harness.status("one"), "todo");
    assert_eq!(harness.status("two"), "waiting");

    harness.start("orgA", "one");
    let plan = harness.ok("orgA", "queryComputePlan", json!({ "key": "plan" }));
    assert_eq!(plan["status"], "doing");

    harness.succeed("orgA", "one");
    assert_eq!(harness.status("two"), "todo");
    // Stored value is still the creation-time hint.
    assert_eq!(harness.stored_status("two"), "waiting");

    for key in ["two", "three", "four"] {
        harness.run("orgA", key);
    }

    let plan = harness.ok("orgA", "queryComputePlan", json!({ "key": "plan" }));
    assert_eq!(plan["status"], "done");
    assert_eq!(plan["doneCount"], 4);
    assert_eq!(harness.last_event().compute_plans, vec!["plan".to_string()]);
}

/// Test: a failure fails the plan and every descendant reads failed.
#[test]
fn test_failure_fails_plan_and_descendants() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createComputePlan", linear_plan("plan", true));
    harness.run("orgA", "one");
    harness.start("orgA", "two");
    harness.ok("orgA", "logFailTrain", json!({ "key": "two", "log": "oom" }));

    assert_eq!(harness.status("two"), "failed");
    assert_eq!(harness.status("three"), "failed");
    assert_eq!(harness.status("four"), "failed");
    assert_eq!(harness.stored_status("four"), "waiting");

    let plan = harness.ok("orgA", "queryComputePlan", json!({ "key": "plan" }));
    assert_eq!(plan["status"], "failed");

    let err = harness
        .invoke("orgA", "logStartTrain", json!({ "key": "three" }))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

/// Test: cancellation stops unfinished tuples and is final.
#[test]
fn test_cancel_plan() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createComputePlan", linear_plan("plan", false));
    harness.run("orgA", "one");

    let view = harness.ok("orgA", "cancelComputePlan", json!({ "key": "plan" }));
    assert_eq!(view["status"], "canceled");
    assert_eq!(harness.status("one"), "done");
    assert_eq!(harness.status("two"), "canceled");
    assert_eq!(harness.status("four"), "canceled");

    let err = harness
        .invoke("orgA", "updateComputePlan", linear_plan("plan", false))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

/// Test: only the creator may cancel.
#[test]
fn test_cancel_by_other_org_rejected() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createComputePlan", linear_plan("plan", false));
    let err = harness
        .invoke("orgB", "cancelComputePlan", json!({ "key": "plan" }))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

/// Test: an update builds on tuples of earlier submissions.
#[test]
fn test_update_extends_plan() {
    let mut harness = LedgerHarness::new();
    harness.ok(
        "orgA",
        "createComputePlan",
        json!({
            "key": "plan",
            "traintuples": [traintuple("one", "orgA", &[])],
        }),
    );
    let view = harness.ok(
        "orgA",
        "updateComputePlan",
        json!({
            "key": "plan",
            "traintuples": [
                traintuple("three", "orgA", &["two"]),
                traintuple("two", "orgA", &["one"]),
            ],
            "testtuples": [testtuple("test", "orgA", "three")],
        }),
    );
    assert_eq!(view["tupleCount"], 4);
    assert_eq!(keys(&view["testtupleKeys"]), vec!["test"]);

    let three = harness.ok("orgA", "queryTuple", json!({ "key": "three" }));
    assert_eq!(three["rank"], 2);
    let test = harness.ok("orgA", "queryTuple", json!({ "key": "test" }));
    assert_eq!(test["rank"], 2);
    assert_eq!(test["status"], "waiting");
}

/// Test: a second plan with an existing key conflicts.
#[test]
fn test_duplicate_plan_key_conflicts() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createComputePlan", linear_plan("plan", false));
    let err = harness
        .invoke("orgA", "createComputePlan", linear_plan("plan", false))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

/// Test: mixed kinds, two workers, testtuple performance recorded.
#[test]
fn test_multi_worker_plan_with_testtuple() {
    let mut harness = LedgerHarness::new();
    harness.ok(
        "orgA",
        "createComputePlan",
        json!({
            "key": "plan",
            "traintuples": [traintuple("trunk", "orgB", &[])],
            "compositeTraintuples": [
                composite("c1", "orgA", "", "trunk"),
                composite("c2", "orgA", "c1", "c1"),
            ],
            "testtuples": [testtuple("eval", "orgA", "c2")],
        }),
    );

    let plan = harness.ok("orgA", "queryComputePlan", json!({ "key": "plan" }));
    assert_eq!(plan["workers"], json!(["orgB", "orgA"]));

    // orgA cannot report progress on orgB's tuple.
    let err = harness
        .invoke("orgA", "logStartTrain", json!({ "key": "trunk" }))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    harness.run("orgB", "trunk");
    harness.run("orgA", "c1");
    harness.run("orgA", "c2");

    assert_eq!(harness.status("eval"), "todo");
    harness.ok("orgA", "logStartTest", json!({ "key": "eval" }));
    let eval = harness.ok("orgA", "logSuccessTest", json!({ "key": "eval", "perf": 0.92 }));
    assert_eq!(eval["perf"], 0.92);

    let plan = harness.ok("orgA", "queryComputePlan", json!({ "key": "plan" }));
    assert_eq!(plan["status"], "done");
    assert_eq!(plan["doneCount"], 4);
}
