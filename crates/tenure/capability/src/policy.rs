use crate::error::{CapabilityConfigError, CapabilityConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tenure_types::CapabilityTier;

/// Limits and switches for patch generation and application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchPolicy {
    /// Upper bound on `new_code` length, in characters.
    #[serde(default = "default_max_new_code_chars")]
    pub max_new_code_chars: usize,

    #[serde(default = "default_true")]
    pub require_write_token: bool,

    #[serde(default = "default_ttl")]
    pub write_token_ttl_seconds: u64,

    /// Root directory every written path must stay under.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    #[serde(default = "default_true")]
    pub write_to_file: bool,

    /// Maximum changed lines per tier. Tiers without an entry are unbounded.
    #[serde(default = "default_ceilings")]
    pub max_changes_by_required_unlock: BTreeMap<CapabilityTier, usize>,

    /// Block generation when the static evaluation of `new_code` fails.
    #[serde(default = "default_true")]
    pub require_code_eval_pass: bool,

    /// Reject a second use of a verified token before it expires.
    #[serde(default)]
    pub single_use_tokens: bool,
}

impl Default for PatchPolicy {
    fn default() -> Self {
        Self {
            max_new_code_chars: default_max_new_code_chars(),
            require_write_token: true,
            write_token_ttl_seconds: default_ttl(),
            workspace_root: default_workspace_root(),
            write_to_file: true,
            max_changes_by_required_unlock: default_ceilings(),
            require_code_eval_pass: true,
            single_use_tokens: false,
        }
    }
}

impl PatchPolicy {
    pub fn validate(&self) -> CapabilityConfigResult<()> {
        if self.write_token_ttl_seconds < 1 {
            return Err(CapabilityConfigError::InvalidTokenTtl);
        }
        if self.max_new_code_chars < 1 {
            return Err(CapabilityConfigError::InvalidMaxNewCodeChars);
        }
        Ok(())
    }

    /// Changed-line ceiling for `tier`, if one is configured.
    pub fn ceiling(&self, tier: CapabilityTier) -> Option<usize> {
        self.max_changes_by_required_unlock.get(&tier).copied()
    }

    /// Whether `total_changes` lines fit under the ceiling for `tier`.
    pub fn permits_changes(&self, tier: CapabilityTier, total_changes: usize) -> bool {
        self.ceiling(tier).map_or(true, |max| total_changes <= max)
    }
}

fn default_max_new_code_chars() -> usize {
    200_000
}

fn default_true() -> bool {
    true
}

fn default_ttl() -> u64 {
    120
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("workspace")
}

fn default_ceilings() -> BTreeMap<CapabilityTier, usize> {
    BTreeMap::from([(CapabilityTier::MinorEdits, 10)])
}
