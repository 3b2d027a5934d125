//! Tenure Capability - which tier an action needs, and how large a patch may be.
//!
//! Configuration arrives as loose maps (`actions`, `intent_default_action`,
//! `thresholds`); this crate turns them into a validated [`CapabilityMap`]
//! whose tier keys are a closed enumeration, so an unknown tier is rejected
//! at load time instead of at first use.
//!
//! Resolution never fails. An unrecognized action is forced down to the
//! lowest-tier default action, so it can never land on an unguarded tier.

#![deny(unsafe_code)]

mod error;
mod map;
mod policy;

pub use error::{CapabilityConfigError, CapabilityConfigResult};
pub use map::{CapabilityMap, Resolution, Thresholds};
pub use policy::PatchPolicy;
