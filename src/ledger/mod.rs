//! Host ledger interface.
//!
//! The replicated ledger runtime is consumed through [`LedgerStub`]: a
//! transactional key/value store with composite-key range scans, one event
//! slot per transaction and the identity of the invoking organisation.
//! [`MemoryLedger`] is the in-process implementation used by tests and the
//! CLI.

pub mod bookmark;
pub mod memory;
pub mod stub;

pub use memory::{LedgerEvent, LedgerSnapshot, MemoryLedger};
pub use stub::{
    create_composite_key, split_composite_key, LedgerStub, StateEntry, MAX_UNICODE_RUNE,
    MIN_UNICODE_RUNE,
};
