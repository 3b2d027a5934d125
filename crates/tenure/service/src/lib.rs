//! Tenure Service - the proficiency-gated write authority.
//!
//! Two operations:
//!
//! - [`AuthorityService::submit`] scores a request, decides whether the
//!   capability it needs was already unlocked, then folds the score into the
//!   moving proficiency window.
//! - [`AuthorityService::edit`] generates a unified diff and a write token
//!   bound to it, or verifies such a token and applies the diff to a file in
//!   the workspace.
//!
//! Every decision lands in the audit store.

#![deny(unsafe_code)]

pub mod config;
mod error;
pub mod scorer;
mod service;
pub mod workspace;

pub use config::{AuditConfig, AuthorityConfig, ConfigError, LoggingConfig};
pub use error::{AuthorityError, AuthorityResult};
pub use scorer::{Scorer, ScorerError, ScriptedScorer};
pub use service::{
    AppliedPatch, ApplyRequest, AuthorityService, AuthorityState, EditRequest, EditResponse,
    GenerateRequest, GeneratedPatch, SubmitRequest, DEFAULT_FILENAME, EDIT_OP, NO_TEXT,
};
pub use workspace::Workspace;
