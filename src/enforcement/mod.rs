//! Balance enforcement
//!
//! `policy` holds the per-member decision engine; `bulk` is the operator's
//! immediate removal pass built on top of it.

mod bulk;
mod policy;

pub use bulk::{BulkReport, force_kick_below_threshold};
pub use policy::{
    BalancePolicy, EnforcementMode, EnforcementOutcome, MAX_WARNINGS, WARNING_COOLDOWN_HOURS,
    can_warn, warning_cooldown,
};
