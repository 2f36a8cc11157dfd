//! Ledger snapshot persistence for the CLI.
//!
//! The CLI runs one transaction per invocation against a [`MemoryLedger`]
//! restored from disk, then saves the committed state back.
//!
//! [`MemoryLedger`]: crate::ledger::MemoryLedger

mod manager;

pub use manager::StateManager;
