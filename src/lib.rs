pub mod assets;
pub mod config;
pub mod core;
pub mod error;
pub mod ledger;
pub mod log;
pub mod orchestration;
pub mod registry;
pub mod state;
pub mod store;

pub use error::{Error, ErrorKind, Result};
pub use ledger::{LedgerStub, MemoryLedger};
pub use store::LedgerDb;
