//! Tuple status lifecycle.
//!
//! `Waiting` and `Todo` are provisional when read from the ledger: the
//! effective value depends on the parents and is recomputed by
//! [`crate::orchestration::StatusResolver`]. The remaining states are only
//! ever reached through explicit writes.

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TupleStatus {
    /// At least one parent has not succeeded yet.
    #[default]
    Waiting,
    /// Every parent succeeded; the worker may start.
    Todo,
    /// Claimed by its worker.
    Doing,
    Done,
    /// Failed itself or inherited a failure from an ancestor.
    Failed,
    /// Stopped by compute plan cancellation.
    Canceled,
}

impl TupleStatus {
    pub const ALL: [TupleStatus; 6] = [
        TupleStatus::Waiting,
        TupleStatus::Todo,
        TupleStatus::Doing,
        TupleStatus::Done,
        TupleStatus::Failed,
        TupleStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TupleStatus::Waiting => "waiting",
            TupleStatus::Todo => "todo",
            TupleStatus::Doing => "doing",
            TupleStatus::Done => "done",
            TupleStatus::Failed => "failed",
            TupleStatus::Canceled => "canceled",
        }
    }

    /// No further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TupleStatus::Done | TupleStatus::Failed | TupleStatus::Canceled
        )
    }

    /// Value depends on parent state and must be recomputed on read.
    pub fn is_provisional(&self) -> bool {
        matches!(self, TupleStatus::Waiting | TupleStatus::Todo)
    }

    /// Explicit (written) transitions. `Waiting -> Todo` is never written.
    pub fn can_transition(&self, target: TupleStatus) -> bool {
        matches!(
            (self, target),
            (TupleStatus::Todo, TupleStatus::Doing)
                | (TupleStatus::Doing, TupleStatus::Done)
                | (TupleStatus::Doing, TupleStatus::Failed)
                | (TupleStatus::Todo, TupleStatus::Failed)
                | (TupleStatus::Waiting, TupleStatus::Failed)
                | (TupleStatus::Waiting, TupleStatus::Canceled)
                | (TupleStatus::Todo, TupleStatus::Canceled)
                | (TupleStatus::Doing, TupleStatus::Canceled)
        )
    }

    /// Check `self -> target`, returning the typed error callers propagate.
    pub fn check_transition(&self, target: TupleStatus) -> Result<(), Error> {
        if self.can_transition(target) {
            Ok(())
        } else {
            Err(Error::InvalidStatusTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }
}

impl std::fmt::Display for TupleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TupleStatus {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TupleStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::BadRequest(format!("unknown tuple status: {}", s)))
    }
}
