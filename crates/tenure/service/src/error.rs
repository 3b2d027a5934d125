//! Error types for the authorization pipeline

use crate::config::ConfigError;
use tenure_diff::{DiffStats, PatchError};
use tenure_token::{TokenRejection, TokenTarget};
use tenure_types::{CapabilityTier, ScoreReport};
use thiserror::Error;

/// Result type for pipeline operations.
pub type AuthorityResult<T> = Result<T, AuthorityError>;

/// Per-request failures. None of these are fatal to the process.
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// Malformed request
    #[error("validation error: {0}")]
    Validation(String),

    /// The required tier is not unlocked yet
    #[error("action '{action}' requires '{required_unlock}' which is not unlocked yet")]
    CapabilityLocked {
        action: String,
        required_unlock: CapabilityTier,
        report: Box<ScoreReport>,
    },

    /// Diff exceeds the changed-line ceiling of its tier
    #[error("patch exceeds authority limit for '{required_unlock}': {} changes (max {max_changes})", .stats.total_changes)]
    PatchTooLarge {
        required_unlock: CapabilityTier,
        stats: DiffStats,
        max_changes: usize,
    },

    /// Diff does not apply to the supplied base
    #[error("patch apply failed: {0}")]
    DiffApply(#[from] PatchError),

    /// Write token missing, forged, stale or bound to something else
    #[error("write token invalid: {reason}")]
    TokenInvalid {
        reason: TokenRejection,
        target: TokenTarget,
    },

    /// Path resolves outside the workspace root
    #[error("path escapes workspace: {0}")]
    WorkspaceEscape(String),

    /// Static evaluation gate blocked generation
    #[error("code evaluation did not pass; patch generation blocked by policy")]
    StaticEvaluationFailed { diagnostics: String },

    /// The scorer failed or returned an out-of-range score
    #[error("scoring failed: {0}")]
    ScoringFailed(String),

    #[error("failed to read {path}: {message}")]
    FileRead { path: String, message: String },

    #[error("failed to write {path}: {message}")]
    FileWrite { path: String, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthorityError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::CapabilityLocked { .. } => "capability_locked",
            Self::PatchTooLarge { .. } => "patch_too_large",
            Self::DiffApply(_) => "diff_apply_error",
            Self::TokenInvalid { .. } => "token_invalid",
            Self::WorkspaceEscape(_) => "workspace_escape",
            Self::StaticEvaluationFailed { .. } => "static_evaluation_failed",
            Self::ScoringFailed(_) => "scoring_failed",
            Self::FileRead { .. } => "file_read_failed",
            Self::FileWrite { .. } => "file_write_failed",
            Self::Config(_) => "config_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// The score report behind a refusal, when one was produced.
    pub fn report(&self) -> Option<&ScoreReport> {
        match self {
            Self::CapabilityLocked { report, .. } => Some(report.as_ref()),
            _ => None,
        }
    }

    /// Structured body for clients: code, message and whatever detail
    /// explains the refusal.
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "ok": false,
            "error": self.code(),
            "message": self.to_string(),
        });
        let detail = match self {
            Self::CapabilityLocked { required_unlock, report, .. } => serde_json::json!({
                "required_unlock": required_unlock,
                "allowed": false,
                "report": report,
            }),
            Self::PatchTooLarge { required_unlock, stats, max_changes } => serde_json::json!({
                "required_unlock": required_unlock,
                "stats": stats,
                "max_changes": max_changes,
            }),
            Self::DiffApply(e) => serde_json::json!({ "details": e }),
            Self::TokenInvalid { reason, target } => serde_json::json!({
                "reason": reason,
                "token_target": target,
            }),
            Self::StaticEvaluationFailed { diagnostics } => serde_json::json!({
                "diagnostics": diagnostics,
            }),
            _ => serde_json::Value::Null,
        };
        if let (Some(body), serde_json::Value::Object(detail)) = (body.as_object_mut(), detail) {
            body.extend(detail);
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenure_diff::ErrorKind;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AuthorityError::Validation("x".into()).code(), "validation_error");
        assert_eq!(AuthorityError::WorkspaceEscape("../x".into()).code(), "workspace_escape");
        let stats = DiffStats {
            additions: 1,
            deletions: 1,
            total_changes: 2,
        };
        let err = AuthorityError::PatchTooLarge {
            required_unlock: CapabilityTier::MinorEdits,
            stats,
            max_changes: 1,
        };
        assert_eq!(err.code(), "patch_too_large");
        assert_eq!(
            err.to_string(),
            "patch exceeds authority limit for 'minor_edits': 2 changes (max 1)"
        );
    }

    #[test]
    fn json_body_carries_detail() {
        let err = AuthorityError::DiffApply(PatchError {
            kind: ErrorKind::ContextMismatch,
            diff_line: 4,
            message: "base differs".into(),
        });
        let body = err.to_json();
        assert_eq!(body["error"], "diff_apply_error");
        assert_eq!(body["details"]["kind"], "context_mismatch");
        assert_eq!(body["ok"], false);
    }
}
