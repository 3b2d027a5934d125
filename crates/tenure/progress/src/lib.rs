//! Tenure Progress - proficiency tracking and unlock derivation.
//!
//! Proficiency is the arithmetic mean of the last `W` normalized scores.
//! Unlocks are a pure function of that mean and the thresholds passed in at
//! the time of the check, so a threshold reload takes effect on the very next
//! allowance check without touching history.
//!
//! The tracker has exactly two entry points that matter for authorization:
//! [`ProgressTracker::evaluate_allowance`] reads history *excluding* the
//! in-flight submission, and [`ProgressTracker::fold_in`] appends to it.
//! Callers hold a single lock across check-then-fold.

#![deny(unsafe_code)]

mod level;
mod tracker;

pub use level::{AuthorityLevel, AuthorityStanding};
pub use tracker::{ProgressError, ProgressTracker, ProgressView, DEFAULT_WINDOW_SIZE};
