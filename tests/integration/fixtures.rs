//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Running registry commands as committed transactions
//! - Building compute plan submissions
//! - Decoding the transaction events

use serde_json::{json, Value};

use fedplan::store::TransactionEvent;
use fedplan::{registry, LedgerDb, MemoryLedger, Result};

/// A ledger plus the commit/rollback discipline of a ledger peer.
pub struct LedgerHarness {
    pub ledger: MemoryLedger,
}

impl LedgerHarness {
    pub fn new() -> Self {
        Self {
            ledger: MemoryLedger::new("orgA"),
        }
    }

    /// Run `function` as `creator`, committing on success and rolling back
    /// on failure.
    pub fn invoke(&mut self, creator: &str, function: &str, args: Value) -> Result<Value> {
        self.ledger.begin(creator);
        let result = {
            let mut db = LedgerDb::new(&mut self.ledger);
            registry::invoke(&mut db, function, args)
        };
        match result {
            Ok(_) => self.ledger.commit(),
            Err(_) => self.ledger.rollback(),
        }
        result
    }

    /// Like [`invoke`](Self::invoke), panicking on failure.
    pub fn ok(&mut self, creator: &str, function: &str, args: Value) -> Value {
        match self.invoke(creator, function, args.clone()) {
            Ok(value) => value,
            Err(e) => panic!("{} {} failed: {}", function, args, e),
        }
    }

    /// Effective status of a tuple as returned by `queryTuple`.
    pub fn status(&mut self, key: &str) -> String {
        let tuple = self.ok("orgA", "queryTuple", json!({ "key": key }));
        tuple["status"].as_str().unwrap_or_default().to_string()
    }

    /// Stored status, bypassing resolution.
    pub fn stored_status(&mut self, key: &str) -> String {
        let db = LedgerDb::new(&mut self.ledger);
        db.get_generic_tuple(key)
            .expect("tuple should exist")
            .status
            .to_string()
    }

    pub fn start(&mut self, worker: &str, key: &str) -> Value {
        self.ok(worker, "logStartTrain", json!({ "key": key }))
    }

    pub fn succeed(&mut self, worker: &str, key: &str) -> Value {
        self.ok(worker, "logSuccessTrain", success_args(key))
    }

    pub fn run(&mut self, worker: &str, key: &str) -> Value {
        self.start(worker, key);
        self.succeed(worker, key)
    }

    /// Event emitted by the last committed transaction.
    pub fn last_event(&self) -> TransactionEvent {
        let event = self
            .ledger
            .events()
            .last()
            .expect("a transaction event should have been emitted");
        serde_json::from_slice(&event.payload).expect("event payload should be JSON")
    }

    pub fn events(&self) -> Vec<TransactionEvent> {
        self.ledger
            .events()
            .iter()
            .map(|e| serde_json::from_slice(&e.payload).expect("event payload should be JSON"))
            .collect()
    }
}

/// Success report covering every model-producing tuple kind.
pub fn success_args(key: &str) -> Value {
    let model = json!({
        "checksum": format!("sha256-{}", key),
        "storageAddress": format!("https://storage/{}", key),
    });
    json!({
        "key": key,
        "log": "ok",
        "outModel": model,
        "outHeadModel": model,
        "outTrunkModel": model,
    })
}

pub fn traintuple(id: &str, worker: &str, parents: &[&str]) -> Value {
    json!({
        "id": id,
        "algoKey": "algo",
        "worker": worker,
        "inModelsIds": parents,
        "dataManagerKey": "dm",
        "dataSampleKeys": ["sample"],
    })
}

pub fn composite(id: &str, worker: &str, head: &str, trunk: &str) -> Value {
    json!({
        "id": id,
        "algoKey": "composite-algo",
        "worker": worker,
        "inHeadModelId": head,
        "inTrunkModelId": trunk,
        "dataManagerKey": "dm",
        "dataSampleKeys": ["sample"],
    })
}

pub fn aggregatetuple(id: &str, worker: &str, parents: &[&str]) -> Value {
    json!({
        "id": id,
        "algoKey": "aggregate-algo",
        "worker": worker,
        "inModelsIds": parents,
    })
}

pub fn testtuple(key: &str, worker: &str, model: &str) -> Value {
    json!({
        "key": key,
        "traintupleId": model,
        "worker": worker,
        "dataManagerKey": "dm",
        "dataSampleKeys": ["test-sample"],
    })
}

/// Linear chain `one -> two -> three -> four` on `orgA`.
pub fn linear_plan(key: &str, clean_models: bool) -> Value {
    json!({
        "key": key,
        "cleanModels": clean_models,
        "traintuples": [
            traintuple("one", "orgA", &[]),
            traintuple("two", "orgA", &["one"]),
            traintuple("three", "orgA", &["two"]),
            traintuple("four", "orgA", &["three"]),
        ],
    })
}
