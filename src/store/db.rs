//! Per-transaction access to the ledger.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::ledger::{bookmark, create_composite_key, split_composite_key, LedgerStub};

/// Name of the single event a transaction emits.
pub const EVENT_NAME: &str = "fedplan";

/// One tuple status change reported in the transaction event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TupleEventEntry {
    pub key: String,
    pub asset_type: String,
    pub status: String,
    pub worker: String,
}

/// Payload of the transaction event, accumulated while the transaction runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    #[serde(default)]
    pub tuples: Vec<TupleEventEntry>,
    /// Intermediary models that may now be deleted.
    #[serde(default)]
    pub deleted_models: Vec<String>,
    /// Compute plans that reached a terminal status.
    #[serde(default)]
    pub compute_plans: Vec<String>,
}

impl TransactionEvent {
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty() && self.deleted_models.is_empty() && self.compute_plans.is_empty()
    }
}

/// Transaction context.
///
/// Wraps the host ledger and keeps every value written during the
/// transaction so later reads in the same transaction observe it. Passed
/// by reference through every scheduling operation; it must not outlive the
/// transaction.
pub struct LedgerDb<'a> {
    stub: &'a mut dyn LedgerStub,
    /// `None` marks a key deleted in this transaction.
    cache: HashMap<String, Option<Vec<u8>>>,
    event: TransactionEvent,
}

impl<'a> LedgerDb<'a> {
    pub fn new(stub: &'a mut dyn LedgerStub) -> Self {
        Self {
            stub,
            cache: HashMap::new(),
            event: TransactionEvent::default(),
        }
    }

    // ========== Primary values ==========

    /// Raw value at `key`, written-in-transaction first, committed second.
    pub fn get_raw(&self, key: &str) -> Result<Vec<u8>> {
        if let Some(cached) = self.cache.get(key) {
            trace!(key, "ledger cache hit");
            return cached
                .clone()
                .ok_or_else(|| Error::NotFound(format!("no element with key {}", key)));
        }
        self.stub
            .get_state(key)?
            .ok_or_else(|| Error::NotFound(format!("no element with key {}", key)))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let bytes = self.get_raw(key)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            Error::NotFound(format!("element with key {} has an unexpected shape: {}", key, e))
        })
    }

    /// Whether `key` exists, including writes made in this transaction.
    pub fn key_exists(&self, key: &str) -> Result<bool> {
        match self.cache.get(key) {
            Some(cached) => Ok(cached.is_some()),
            None => Ok(self.stub.get_state(key)?.is_some()),
        }
    }

    /// Create `key`; fails if a committed value already exists.
    pub fn add<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        if self.stub.get_state(key)?.is_some() {
            return Err(Error::Conflict(format!(
                "this element already exists: {}",
                key
            )));
        }
        self.put(key, value)
    }

    /// Create or overwrite `key`.
    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put_raw(key, bytes)
    }

    fn put_raw(&mut self, key: &str, bytes: Vec<u8>) -> Result<()> {
        debug!(key, bytes = bytes.len(), "ledger put");
        self.stub.put_state(key, bytes.clone())?;
        self.cache.insert(key.to_string(), Some(bytes));
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> Result<()> {
        debug!(key, "ledger delete");
        self.stub.del_state(key)?;
        self.cache.insert(key.to_string(), None);
        Ok(())
    }

    // ========== Secondary indexes ==========

    pub fn create_index(&mut self, index: &str, attributes: &[&str]) -> Result<()> {
        let key = create_composite_key(index, &owned(attributes))?;
        self.put_raw(&key, Vec::new())
    }

    pub fn delete_index(&mut self, index: &str, attributes: &[&str]) -> Result<()> {
        let key = create_composite_key(index, &owned(attributes))?;
        self.delete(&key)
    }

    /// Last attribute of every committed index entry matching the prefix,
    /// in key order.
    pub fn get_index_keys(&self, index: &str, attributes: &[&str]) -> Result<Vec<String>> {
        let entries = self
            .stub
            .get_state_by_partial_composite_key(index, &owned(attributes))?;
        entries
            .iter()
            .map(|(key, _)| last_attribute(key))
            .collect()
    }

    /// Paginated [`get_index_keys`](Self::get_index_keys).
    ///
    /// `bookmark` is the value returned by the previous call, threaded back
    /// verbatim; empty for the first page. The returned bookmark is empty on
    /// the last page.
    pub fn get_index_keys_with_pagination(
        &self,
        index: &str,
        attributes: &[&str],
        page_size: u32,
        bookmark: &str,
    ) -> Result<(Vec<String>, String)> {
        let native = bookmark::decode(bookmark)?;
        let (entries, next) = self.stub.get_state_by_partial_composite_key_with_pagination(
            index,
            &owned(attributes),
            page_size,
            &native,
        )?;
        let keys = entries
            .iter()
            .map(|(key, _)| last_attribute(key))
            .collect::<Result<Vec<_>>>()?;
        Ok((keys, bookmark::encode(&next)))
    }

    // ========== Transaction identity ==========

    pub fn invoker(&self) -> String {
        self.stub.get_creator()
    }

    pub fn tx_id(&self) -> String {
        self.stub.get_tx_id()
    }

    pub fn tx_timestamp(&self) -> DateTime<Utc> {
        self.stub.get_tx_timestamp()
    }

    // ========== Event ==========

    pub fn add_tuple_event(&mut self, entry: TupleEventEntry) {
        self.event.tuples.retain(|e| e.key != entry.key);
        self.event.tuples.push(entry);
    }

    pub fn add_deleted_models<I: IntoIterator<Item = String>>(&mut self, models: I) {
        for model in models {
            if !self.event.deleted_models.contains(&model) {
                self.event.deleted_models.push(model);
            }
        }
    }

    pub fn add_compute_plan_event(&mut self, plan_key: &str) {
        if !self.event.compute_plans.iter().any(|k| k == plan_key) {
            self.event.compute_plans.push(plan_key.to_string());
        }
    }

    pub fn pending_event(&self) -> &TransactionEvent {
        &self.event
    }

    /// Emit the accumulated event, if any. Called once at the end of a
    /// successful transaction.
    pub fn send_event(&mut self) -> Result<()> {
        if self.event.is_empty() {
            return Ok(());
        }
        let payload = serde_json::to_vec(&self.event)?;
        self.stub.set_event(EVENT_NAME, payload)?;
        debug!(
            tuples = self.event.tuples.len(),
            deleted_models = self.event.deleted_models.len(),
            "transaction event set"
        );
        Ok(())
    }
}

fn owned(attributes: &[&str]) -> Vec<String> {
    attributes.iter().map(|a| a.to_string()).collect()
}

fn last_attribute(composite_key: &str) -> Result<String> {
    let (_, mut attributes) = split_composite_key(composite_key)?;
    attributes
        .pop()
        .ok_or_else(|| Error::Internal(format!("index key without attributes: {:?}", composite_key)))
}
