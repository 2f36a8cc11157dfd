//! Secondary index names.
//!
//! Each index is a composite key whose last attribute is the primary key of
//! the referenced record.

/// `[plan, tuple]`: tuples of a compute plan.
pub const TUPLE_BY_COMPUTE_PLAN: &str = "tuple~computePlanKey~key";

/// `[parent tuple, child tuple]`: dependents of a model.
pub const TUPLE_BY_IN_MODEL: &str = "tuple~inModel~key";

/// `[worker, status, tuple]`: a worker's queue per status. Moved on every
/// status write.
pub const TUPLE_BY_WORKER_STATUS: &str = "tuple~worker~status~key";

/// `[plan]`: every compute plan, for paginated listing.
pub const COMPUTE_PLAN_BY_KEY: &str = "computePlan~key";
