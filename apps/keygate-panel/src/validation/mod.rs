//! License validation decision procedure.
//!
//! Syntactic checks run first (`input`), the lifecycle check runs against the
//! bare license row, and the rule checks run in order against one immutable
//! [`ValidationContext`]. The first rejection wins.

pub mod checks;
pub mod drift;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod input;
pub mod outcome;
pub mod vm;

use chrono::{DateTime, Utc};
use keygate_db::models::activation::ActivationHistory;
use keygate_db::models::license::LicenseWithOwners;
use keygate_db::models::rule::LicenseRule;

pub use checks::{check_lifecycle, decide};
pub use input::{InputError, ValidationInput};
pub use outcome::{Decision, EventDraft, Rejection, Severity, Transition, Verdict};

/// Everything the rule checks may look at. Built once per request after the
/// lifecycle check passed.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub input: ValidationInput,
    pub license: LicenseWithOwners,
    pub rule: Option<LicenseRule>,
    pub history: ActivationHistory,
    /// Resolved only when the rule restricts countries.
    pub country: Option<String>,
    pub now: DateTime<Utc>,
}
