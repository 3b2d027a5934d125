//! Tenure Types - shared vocabulary for the write-authority pipeline.
//!
//! - [`CapabilityTier`]: the closed, totally ordered set of authority tiers
//! - [`Submission`] / [`Scorecard`]: what goes into and comes out of a scorer
//! - [`ScoreReport`]: the immutable allowance decision for one submission
//! - [`sha256_hex`]: the content digest that binds tokens and audit rows to text

#![deny(unsafe_code)]

mod digest;
mod report;
mod tier;

pub use digest::sha256_hex;
pub use report::{CodeEvaluation, ScoreReport, Scorecard, Submission};
pub use tier::{CapabilityTier, UnknownTier, UnlockMap};
