//! Effective status resolution across tuple kinds.
//!
//! Stored statuses are hints written at creation time; these tests check
//! what `queryTuple` and `queryWorkerTuples` report once parents move.

use serde_json::json;

use fedplan::ErrorKind;

use crate::fixtures::{aggregatetuple, composite, traintuple, LedgerHarness};

fn keys(value: &serde_json::Value) -> Vec<String> {
    let mut keys: Vec<String> = value
        .as_array()
        .expect("expected an array")
        .iter()
        .map(|t| t["key"].as_str().unwrap_or_default().to_string())
        .collect();
    keys.sort();
    keys
}

#[test]
fn test_composite_waits_for_head_and_trunk() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createTraintuple", traintuple("trunk", "orgA", &[]));
    harness.ok("orgA", "createCompositeTraintuple", composite("head", "orgA", "", ""));
    harness.ok("orgA", "createCompositeTraintuple", composite("child", "orgA", "head", "trunk"));

    assert_eq!(harness.status("head"), "todo");
    assert_eq!(harness.status("child"), "waiting");

    harness.run("orgA", "trunk");
    assert_eq!(harness.status("child"), "waiting");

    harness.run("orgA", "head");
    assert_eq!(harness.status("child"), "todo");
    assert_eq!(harness.stored_status("child"), "waiting");

    // The resolved status is what start checks against.
    harness.start("orgA", "child");
    assert_eq!(harness.status("child"), "doing");
}

#[test]
fn test_composite_fails_with_either_parent() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createTraintuple", traintuple("trunk", "orgA", &[]));
    harness.ok("orgA", "createCompositeTraintuple", composite("head", "orgA", "", ""));
    harness.ok("orgA", "createCompositeTraintuple", composite("child", "orgA", "head", "trunk"));

    harness.run("orgA", "head");
    harness.ok("orgA", "logFailTrain", json!({ "key": "trunk", "log": "crash" }));

    assert_eq!(harness.status("child"), "failed");
    assert_eq!(harness.stored_status("child"), "waiting");
}

#[test]
fn test_failure_propagates_transitively_without_writes() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createTraintuple", traintuple("a", "orgA", &[]));
    harness.ok("orgA", "createTraintuple", traintuple("b", "orgA", &["a"]));
    harness.ok("orgA", "createTraintuple", traintuple("c", "orgA", &["b"]));

    harness.ok("orgA", "logFailTrain", json!({ "key": "a" }));
    let event = harness.last_event();
    let written: Vec<&str> = event.tuples.iter().map(|t| t.key.as_str()).collect();
    assert_eq!(written, vec!["a"]);

    assert_eq!(harness.status("b"), "failed");
    assert_eq!(harness.status("c"), "failed");
    assert_eq!(harness.stored_status("b"), "waiting");
    assert_eq!(harness.stored_status("c"), "waiting");

    let err = harness
        .invoke("orgA", "logStartTrain", json!({ "key": "c" }))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[test]
fn test_child_of_failed_parent_cannot_be_created() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createTraintuple", traintuple("a", "orgA", &[]));
    harness.ok("orgA", "createTraintuple", traintuple("b", "orgA", &["a"]));
    harness.ok("orgA", "logFailTrain", json!({ "key": "a" }));

    // "b" is only failed through resolution.
    let err = harness
        .invoke("orgA", "createTraintuple", traintuple("c", "orgA", &["b"]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[test]
fn test_aggregate_across_workers() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createTraintuple", traintuple("left", "orgA", &[]));
    harness.ok("orgB", "createTraintuple", traintuple("right", "orgB", &[]));
    harness.ok(
        "orgC",
        "createAggregatetuple",
        aggregatetuple("agg", "orgC", &["left", "right"]),
    );

    harness.run("orgA", "left");
    assert_eq!(harness.status("agg"), "waiting");
    harness.run("orgB", "right");
    assert_eq!(harness.status("agg"), "todo");

    let agg = harness.ok("orgA", "queryTuple", json!({ "key": "agg" }));
    assert_eq!(agg["rank"], 1);
}

#[test]
fn test_worker_tuples_filter_on_effective_status() {
    let mut harness = LedgerHarness::new();
    harness.ok("orgA", "createTraintuple", traintuple("a", "orgA", &[]));
    harness.ok("orgA", "createTraintuple", traintuple("b", "orgA", &["a"]));
    harness.ok("orgB", "createTraintuple", traintuple("x", "orgB", &[]));

    let all = harness.ok("orgA", "queryWorkerTuples", json!({ "worker": "orgA" }));
    assert_eq!(keys(&all), vec!["a", "b"]);

    harness.run("orgA", "a");
    let todo = harness.ok(
        "orgA",
        "queryWorkerTuples",
        json!({ "worker": "orgA", "status": "todo" }),
    );
    assert_eq!(keys(&todo), vec!["b"]);

    let waiting = harness.ok(
        "orgA",
        "queryWorkerTuples",
        json!({ "worker": "orgA", "status": "waiting" }),
    );
    assert!(keys(&waiting).is_empty());
}
