//! Transactional access to ledger records.

pub mod db;
pub mod index;
mod records;

pub use db::{LedgerDb, TransactionEvent, TupleEventEntry, EVENT_NAME};
