//! Scheduling operations run inside one ledger transaction.
//!
//! Every function takes the transaction's [`LedgerDb`](crate::store::LedgerDb)
//! explicitly; nothing here keeps state between transactions.

pub mod compute_plan;
pub mod resolver;
pub mod tuples;
pub mod worker_state;

pub use compute_plan::{ComputePlanPage, ComputePlanView, PageRequest};
pub use resolver::{resolved_tuple, StatusResolver};
pub use tuples::{Placement, ProgressReport, ReportKind};
