//! Effective tuple status.
//!
//! A stored `Waiting` or `Todo` is only a hint. The status a caller sees is
//! derived on read from the parents' own effective statuses:
//!
//! - stored `Failed` or `Canceled` is returned as is;
//! - any parent reading `Failed` makes the tuple read `Failed`;
//! - stored `Waiting`/`Todo` reads `Todo` once every parent reads `Done`,
//!   `Waiting` otherwise;
//! - `Doing` and `Done` are returned as stored.
//!
//! Nothing is written while resolving.

use std::collections::HashMap;

use tracing::trace;

use crate::assets::Tuple;
use crate::core::TupleStatus;
use crate::error::Result;
use crate::store::LedgerDb;

/// Resolves effective statuses against one transaction.
///
/// Results are memoized for the resolver's lifetime, so a resolver must not
/// be kept across writes that change a status it already resolved.
pub struct StatusResolver<'r, 'a> {
    db: &'r LedgerDb<'a>,
    memo: HashMap<String, TupleStatus>,
}

impl<'r, 'a> StatusResolver<'r, 'a> {
    pub fn new(db: &'r LedgerDb<'a>) -> Self {
        Self {
            db,
            memo: HashMap::new(),
        }
    }

    /// Effective status of the tuple stored at `key`.
    pub fn resolve(&mut self, key: &str) -> Result<TupleStatus> {
        if let Some(status) = self.memo.get(key) {
            return Ok(*status);
        }
        let tuple = self.db.get_tuple(key)?;
        let status = self.resolve_tuple(&tuple)?;
        self.memo.insert(key.to_string(), status);
        Ok(status)
    }

    /// Effective status of an already loaded tuple.
    pub fn resolve_tuple(&mut self, tuple: &Tuple) -> Result<TupleStatus> {
        let stored = tuple.status();
        if matches!(stored, TupleStatus::Failed | TupleStatus::Canceled) {
            return Ok(stored);
        }

        let mut all_done = true;
        for parent in tuple.parent_keys() {
            match self.resolve(parent)? {
                TupleStatus::Failed => {
                    trace!(key = tuple.key(), parent, "failure inherited from parent");
                    return Ok(TupleStatus::Failed);
                }
                TupleStatus::Done => {}
                _ => all_done = false,
            }
        }

        if stored.is_provisional() {
            return Ok(if all_done {
                TupleStatus::Todo
            } else {
                TupleStatus::Waiting
            });
        }
        Ok(stored)
    }
}

/// Copy of the tuple at `key` carrying its effective status.
pub fn resolved_tuple(db: &LedgerDb<'_>, key: &str) -> Result<Tuple> {
    let mut tuple = db.get_tuple(key)?;
    let status = StatusResolver::new(db).resolve_tuple(&tuple)?;
    tuple.generic_mut().status = status;
    Ok(tuple)
}
