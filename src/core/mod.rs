//! Core scheduling models.
//!
//! This module contains the compute plan graph used to order a submission
//! and the tuple status lifecycle shared by every tuple kind.

pub mod dag;
pub mod status;
pub mod task;

pub use dag::ComputeDag;
pub use status::TupleStatus;
pub use task::{TaskType, TrainingTask};
