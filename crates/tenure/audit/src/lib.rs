//! Tenure audit storage.
//!
//! This crate defines the forensic trail for authorization decisions:
//! - scoring events (every scored submission, allowed or not)
//! - patch events (every generate/apply attempt, including refusals)
//! - a single-row progress aggregate updated in the same transaction
//!
//! Design stance:
//! - Records are append-only and hash-linked; nothing is updated or deleted.
//! - The aggregate row is the only mutable state, and it never moves without
//!   its event.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod chain;
mod error;
pub mod memory;
mod model;
#[cfg(feature = "sqlite")]
pub mod sqlite;
mod traits;

pub use chain::{compute_audit_hash, verify_chain, ChainBreak};
pub use error::{AuditError, AuditResult};
pub use memory::InMemoryAuditStore;
pub use model::{AuditEntry, AuditRecord, PatchEvent, ProgressSnapshot, ScoringEvent};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAuditStore;
pub use traits::{AuditStore, QueryWindow};
