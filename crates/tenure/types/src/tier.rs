//! Capability tiers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unlock flags keyed by tier.
pub type UnlockMap = BTreeMap<CapabilityTier, bool>;

/// A named authority level, unlocked once proficiency crosses its threshold.
///
/// Variant order is tier order: `AssistMode < MinorEdits < RefactorLint <
/// AutonomousEditing`. Configuration thresholds must respect that order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityTier {
    /// Advisory help only.
    #[serde(alias = "assist")]
    AssistMode,
    /// Small, bounded edits.
    MinorEdits,
    /// Refactors and lint-driven rewrites.
    RefactorLint,
    /// Unsupervised editing.
    AutonomousEditing,
}

impl CapabilityTier {
    /// Every tier, lowest first.
    pub const ALL: [CapabilityTier; 4] = [
        CapabilityTier::AssistMode,
        CapabilityTier::MinorEdits,
        CapabilityTier::RefactorLint,
        CapabilityTier::AutonomousEditing,
    ];

    /// The lowest tier.
    pub const fn lowest() -> Self {
        CapabilityTier::AssistMode
    }

    /// Stable configuration key.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AssistMode => "assist_mode",
            Self::MinorEdits => "minor_edits",
            Self::RefactorLint => "refactor_lint",
            Self::AutonomousEditing => "autonomous_editing",
        }
    }

    /// The tier directly above this one, if any.
    pub fn next(&self) -> Option<Self> {
        let idx = Self::ALL.iter().position(|t| t == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// An unlock map with every tier locked.
    pub fn all_locked() -> UnlockMap {
        Self::ALL.iter().map(|tier| (*tier, false)).collect()
    }
}

impl fmt::Display for CapabilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known tier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown capability tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for CapabilityTier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "assist_mode" | "assist" => Ok(Self::AssistMode),
            "minor_edits" => Ok(Self::MinorEdits),
            "refactor_lint" => Ok(Self::RefactorLint),
            "autonomous_editing" => Ok(Self::AutonomousEditing),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_totally_ordered() {
        assert!(CapabilityTier::AssistMode < CapabilityTier::MinorEdits);
        assert!(CapabilityTier::MinorEdits < CapabilityTier::RefactorLint);
        assert!(CapabilityTier::RefactorLint < CapabilityTier::AutonomousEditing);
        assert_eq!(CapabilityTier::lowest(), CapabilityTier::ALL[0]);
        assert_eq!(CapabilityTier::AutonomousEditing.next(), None);
        assert_eq!(
            CapabilityTier::AssistMode.next(),
            Some(CapabilityTier::MinorEdits)
        );
    }

    #[test]
    fn parses_keys_and_alias() {
        assert_eq!(
            "assist".parse::<CapabilityTier>().unwrap(),
            CapabilityTier::AssistMode
        );
        assert_eq!(
            "refactor_lint".parse::<CapabilityTier>().unwrap(),
            CapabilityTier::RefactorLint
        );
        assert!("root".parse::<CapabilityTier>().is_err());
    }

    #[test]
    fn serde_uses_config_keys() {
        let json = serde_json::to_string(&CapabilityTier::MinorEdits).unwrap();
        assert_eq!(json, "\"minor_edits\"");

        let map: UnlockMap = serde_json::from_str(r#"{"assist": true}"#).unwrap();
        assert_eq!(map.get(&CapabilityTier::AssistMode), Some(&true));

        let unknown: Result<UnlockMap, _> = serde_json::from_str(r#"{"superuser": true}"#);
        assert!(unknown.is_err());
    }
}
