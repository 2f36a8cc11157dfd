//! In-memory ledger used for tests and the CLI.

use std::collections::BTreeMap;
use std::ops::Bound;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ledger::stub::{create_composite_key, LedgerStub, StateEntry, MAX_UNICODE_RUNE};

/// An event emitted by a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub tx_id: String,
    pub name: String,
    pub payload: Vec<u8>,
}

/// Serializable copy of the committed state.
///
/// Values are stored as UTF-8 text; every value the crate writes is JSON or
/// empty (index entries).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub state: BTreeMap<String, String>,
    #[serde(default)]
    pub events: Vec<LedgerEvent>,
}

/// BTreeMap-backed ledger with pending writes applied on commit.
///
/// Reads (`get_state`, range scans) only ever see committed state, the same
/// visibility a transaction gets from a real ledger peer.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    committed: BTreeMap<String, Vec<u8>>,
    pending: BTreeMap<String, Option<Vec<u8>>>,
    creator: String,
    tx_id: String,
    tx_timestamp: DateTime<Utc>,
    event: Option<(String, Vec<u8>)>,
    events: Vec<LedgerEvent>,
}

impl MemoryLedger {
    pub fn new(creator: &str) -> Self {
        Self {
            committed: BTreeMap::new(),
            pending: BTreeMap::new(),
            creator: creator.to_string(),
            tx_id: Uuid::new_v4().to_string(),
            tx_timestamp: Utc::now(),
            event: None,
            events: Vec::new(),
        }
    }

    /// Start a new transaction on behalf of `creator`, discarding anything
    /// left pending by the previous one.
    pub fn begin(&mut self, creator: &str) {
        self.pending.clear();
        self.event = None;
        self.creator = creator.to_string();
        self.tx_id = Uuid::new_v4().to_string();
        self.tx_timestamp = Utc::now();
        debug!(tx_id = %self.tx_id, creator, "transaction started");
    }

    /// Apply pending writes and record the transaction's event.
    pub fn commit(&mut self) {
        let writes = std::mem::take(&mut self.pending);
        let count = writes.len();
        for (key, value) in writes {
            match value {
                Some(bytes) => {
                    self.committed.insert(key, bytes);
                }
                None => {
                    self.committed.remove(&key);
                }
            }
        }
        if let Some((name, payload)) = self.event.take() {
            self.events.push(LedgerEvent {
                tx_id: self.tx_id.clone(),
                name,
                payload,
            });
        }
        debug!(tx_id = %self.tx_id, writes = count, "transaction committed");
    }

    /// Drop pending writes and the pending event.
    pub fn rollback(&mut self) {
        debug!(tx_id = %self.tx_id, pending = self.pending.len(), "transaction rolled back");
        self.pending.clear();
        self.event = None;
    }

    /// Events emitted by committed transactions, oldest first.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        let mut state = BTreeMap::new();
        for (key, value) in &self.committed {
            let text = String::from_utf8(value.clone()).map_err(|e| {
                Error::Internal(format!("value at {:?} is not UTF-8: {}", key, e))
            })?;
            state.insert(key.clone(), text);
        }
        Ok(LedgerSnapshot {
            state,
            events: self.events.clone(),
        })
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot, creator: &str) -> Self {
        let mut ledger = Self::new(creator);
        ledger.committed = snapshot
            .state
            .into_iter()
            .map(|(k, v)| (k, v.into_bytes()))
            .collect();
        ledger.events = snapshot.events;
        ledger
    }

    fn prefix_range(&self, prefix: &str) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        let mut end = prefix.to_string();
        end.push(MAX_UNICODE_RUNE);
        self.committed
            .range::<String, _>((Bound::Included(prefix.to_string()), Bound::Excluded(end)))
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new("")
    }
}

impl LedgerStub for MemoryLedger {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.committed.get(key).cloned())
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        if key.is_empty() {
            return Err(Error::BadRequest("empty key".to_string()));
        }
        self.pending.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn del_state(&mut self, key: &str) -> Result<()> {
        self.pending.insert(key.to_string(), None);
        Ok(())
    }

    fn get_state_by_partial_composite_key(
        &self,
        object_type: &str,
        attributes: &[String],
    ) -> Result<Vec<StateEntry>> {
        let prefix = create_composite_key(object_type, attributes)?;
        Ok(self
            .prefix_range(&prefix)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn get_state_by_partial_composite_key_with_pagination(
        &self,
        object_type: &str,
        attributes: &[String],
        page_size: u32,
        bookmark: &str,
    ) -> Result<(Vec<StateEntry>, String)> {
        if page_size == 0 {
            return Err(Error::BadRequest("page size must be positive".to_string()));
        }
        let prefix = create_composite_key(object_type, attributes)?;
        if !bookmark.is_empty() && !bookmark.starts_with(&prefix) {
            return Err(Error::BadRequest(format!(
                "bookmark does not belong to index {}",
                object_type
            )));
        }

        let mut entries = Vec::new();
        let mut next_bookmark = String::new();
        for (key, value) in self.prefix_range(&prefix) {
            if !bookmark.is_empty() && key.as_str() < bookmark {
                continue;
            }
            if entries.len() == page_size as usize {
                next_bookmark = key.clone();
                break;
            }
            entries.push((key.clone(), value.clone()));
        }
        Ok((entries, next_bookmark))
    }

    fn get_creator(&self) -> String {
        self.creator.clone()
    }

    fn get_tx_id(&self) -> String {
        self.tx_id.clone()
    }

    fn get_tx_timestamp(&self) -> DateTime<Utc> {
        self.tx_timestamp
    }

    fn set_event(&mut self, name: &str, payload: Vec<u8>) -> Result<()> {
        self.event = Some((name.to_string(), payload));
        Ok(())
    }
}
