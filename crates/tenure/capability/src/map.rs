use crate::error::{CapabilityConfigError, CapabilityConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tenure_types::CapabilityTier;
use tracing::debug;

// ── Thresholds ──────────────────────────────────────────────────────

/// Minimum proficiency (fraction in `[0, 1]`) at which each tier unlocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Thresholds(BTreeMap<CapabilityTier, f64>);

impl Default for Thresholds {
    fn default() -> Self {
        Self(BTreeMap::from([
            (CapabilityTier::AssistMode, 0.50),
            (CapabilityTier::MinorEdits, 0.70),
            (CapabilityTier::RefactorLint, 0.90),
            (CapabilityTier::AutonomousEditing, 1.00),
        ]))
    }
}

impl Thresholds {
    pub fn new(map: BTreeMap<CapabilityTier, f64>) -> Self {
        Self(map)
    }

    pub fn get(&self, tier: CapabilityTier) -> Option<f64> {
        self.0.get(&tier).copied()
    }

    /// Whether `proficiency` reaches `tier`. A tier without a threshold
    /// never unlocks.
    pub fn is_met(&self, tier: CapabilityTier, proficiency: f64) -> bool {
        self.get(tier).is_some_and(|threshold| proficiency >= threshold)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CapabilityTier, f64)> + '_ {
        self.0.iter().map(|(tier, value)| (*tier, *value))
    }

    pub fn as_map(&self) -> &BTreeMap<CapabilityTier, f64> {
        &self.0
    }

    /// Every tier present, each in `[0, 1]`, non-decreasing in tier order.
    pub fn validate(&self) -> CapabilityConfigResult<()> {
        let mut previous: Option<(CapabilityTier, f64)> = None;
        for tier in CapabilityTier::ALL {
            let value = self
                .get(tier)
                .ok_or(CapabilityConfigError::MissingThreshold(tier))?;
            if !(0.0..=1.0).contains(&value) {
                return Err(CapabilityConfigError::ThresholdOutOfRange { tier, value });
            }
            if let Some((lower, lower_value)) = previous {
                if value < lower_value {
                    return Err(CapabilityConfigError::ThresholdsNotMonotonic {
                        lower,
                        lower_value,
                        higher: tier,
                        higher_value: value,
                    });
                }
            }
            previous = Some((tier, value));
        }
        Ok(())
    }
}

// ── Capability map ──────────────────────────────────────────────────

/// Action and intent routing plus unlock thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityMap {
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default = "default_actions")]
    pub actions: BTreeMap<String, CapabilityTier>,
    #[serde(default = "default_intent_actions")]
    pub intent_default_action: BTreeMap<String, String>,
}

/// The outcome of resolving a request to an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub action: String,
    pub required_unlock: CapabilityTier,
    /// The action was replaced by the lowest-tier fallback.
    pub forced: bool,
}

impl Default for CapabilityMap {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            actions: default_actions(),
            intent_default_action: default_intent_actions(),
        }
    }
}

impl CapabilityMap {
    pub fn validate(&self) -> CapabilityConfigResult<()> {
        self.thresholds.validate()?;

        let lowest = CapabilityTier::lowest();
        if !self.actions.values().any(|tier| *tier == lowest) {
            return Err(CapabilityConfigError::NoLowestTierAction(lowest));
        }

        for (intent, action) in &self.intent_default_action {
            if !self.actions.contains_key(action) {
                return Err(CapabilityConfigError::UnknownDefaultAction {
                    intent: intent.clone(),
                    action: action.clone(),
                });
            }
        }
        Ok(())
    }

    /// Map a request to `(action, required tier)`.
    ///
    /// Without an explicit action the intent's default is used, then the
    /// `"unknown"` default, then the lowest-tier action. An action that is
    /// not configured is forced to the lowest-tier action.
    pub fn resolve(&self, predicted_intent: &str, requested_action: Option<&str>) -> Resolution {
        let requested = requested_action.map(str::trim).filter(|a| !a.is_empty());

        let candidate = match requested {
            Some(action) => Some(action.to_string()),
            None => self
                .intent_default_action
                .get(predicted_intent)
                .or_else(|| self.intent_default_action.get("unknown"))
                .cloned(),
        };

        if let Some(action) = candidate {
            if let Some(tier) = self.actions.get(&action) {
                return Resolution {
                    action,
                    required_unlock: *tier,
                    forced: false,
                };
            }
            debug!(action = %action, intent = predicted_intent, "Unconfigured action forced to lowest tier");
        }

        let action = self.lowest_tier_action();
        Resolution {
            action,
            required_unlock: CapabilityTier::lowest(),
            forced: true,
        }
    }

    /// The default action of the lowest tier.
    ///
    /// Prefers the `"unknown"` intent default, then `assist`, then the first
    /// lowest-tier action by name.
    pub fn lowest_tier_action(&self) -> String {
        let lowest = CapabilityTier::lowest();
        let is_lowest = |action: &str| self.actions.get(action) == Some(&lowest);

        if let Some(action) = self.intent_default_action.get("unknown") {
            if is_lowest(action) {
                return action.clone();
            }
        }
        if is_lowest("assist") {
            return "assist".to_string();
        }
        self.actions
            .iter()
            .find(|(_, tier)| **tier == lowest)
            .map(|(action, _)| action.clone())
            .unwrap_or_else(|| "assist".to_string())
    }
}

fn default_actions() -> BTreeMap<String, CapabilityTier> {
    [
        ("assist", CapabilityTier::AssistMode),
        ("explain", CapabilityTier::AssistMode),
        ("minor_edit", CapabilityTier::MinorEdits),
        ("fix_bug", CapabilityTier::MinorEdits),
        ("refactor", CapabilityTier::RefactorLint),
        ("lint", CapabilityTier::RefactorLint),
        ("autonomous_edit", CapabilityTier::AutonomousEditing),
    ]
    .into_iter()
    .map(|(action, tier)| (action.to_string(), tier))
    .collect()
}

fn default_intent_actions() -> BTreeMap<String, String> {
    [
        ("explain", "explain"),
        ("question", "assist"),
        ("fix_bug", "fix_bug"),
        ("minor_edit", "minor_edit"),
        ("refactor", "refactor"),
        ("lint", "lint"),
        ("unknown", "assist"),
    ]
    .into_iter()
    .map(|(intent, action)| (intent.to_string(), action.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        CapabilityMap::default().validate().unwrap();
    }

    #[test]
    fn explicit_action_wins() {
        let map = CapabilityMap::default();
        let r = map.resolve("explain", Some("refactor"));
        assert_eq!(r.action, "refactor");
        assert_eq!(r.required_unlock, CapabilityTier::RefactorLint);
        assert!(!r.forced);
    }

    #[test]
    fn missing_action_uses_intent_default() {
        let map = CapabilityMap::default();
        let r = map.resolve("fix_bug", None);
        assert_eq!((r.action.as_str(), r.required_unlock), ("fix_bug", CapabilityTier::MinorEdits));

        let r = map.resolve("fix_bug", Some("   "));
        assert_eq!(r.action, "fix_bug");
    }

    #[test]
    fn unknown_intent_falls_back_to_unknown_default() {
        let map = CapabilityMap::default();
        let r = map.resolve("something.unknown", None);
        assert_eq!((r.action.as_str(), r.required_unlock), ("assist", CapabilityTier::AssistMode));
    }

    #[test]
    fn unconfigured_action_is_forced_to_lowest_tier() {
        let map = CapabilityMap::default();
        let r = map.resolve("refactor", Some("rm_rf"));
        assert_eq!(r.action, "assist");
        assert_eq!(r.required_unlock, CapabilityTier::AssistMode);
        assert!(r.forced);
    }

    #[test]
    fn fallback_without_unknown_default() {
        let mut map = CapabilityMap::default();
        map.intent_default_action.clear();
        map.actions.remove("assist");
        let r = map.resolve("anything", None);
        assert_eq!((r.action.as_str(), r.required_unlock), ("explain", CapabilityTier::AssistMode));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut map = CapabilityMap::default();
        map.thresholds.0.insert(CapabilityTier::MinorEdits, 1.5);
        assert!(matches!(
            map.validate(),
            Err(CapabilityConfigError::ThresholdOutOfRange { tier: CapabilityTier::MinorEdits, .. })
        ));
    }

    #[test]
    fn rejects_decreasing_thresholds() {
        let mut map = CapabilityMap::default();
        map.thresholds.0.insert(CapabilityTier::RefactorLint, 0.6);
        assert!(matches!(
            map.validate(),
            Err(CapabilityConfigError::ThresholdsNotMonotonic { higher: CapabilityTier::RefactorLint, .. })
        ));
    }

    #[test]
    fn rejects_missing_lowest_action() {
        let mut map = CapabilityMap::default();
        map.actions.retain(|_, tier| *tier != CapabilityTier::AssistMode);
        map.intent_default_action.clear();
        assert_eq!(
            map.validate(),
            Err(CapabilityConfigError::NoLowestTierAction(CapabilityTier::AssistMode))
        );
    }

    #[test]
    fn rejects_dangling_intent_default() {
        let mut map = CapabilityMap::default();
        map.intent_default_action.insert("deploy".into(), "ship_it".into());
        assert!(matches!(
            map.validate(),
            Err(CapabilityConfigError::UnknownDefaultAction { .. })
        ));
    }

    #[test]
    fn deserializes_with_alias_and_rejects_unknown_tier() {
        let map: CapabilityMap = serde_json::from_str(
            r#"{"thresholds": {"assist": 0.5, "minor_edits": 0.7, "refactor_lint": 0.9, "autonomous_editing": 1.0},
                "actions": {"assist": "assist_mode", "tweak": "minor_edits"},
                "intent_default_action": {"unknown": "assist"}}"#,
        )
        .unwrap();
        map.validate().unwrap();
        assert_eq!(map.thresholds.get(CapabilityTier::AssistMode), Some(0.5));

        let err = serde_json::from_str::<CapabilityMap>(r#"{"actions": {"x": "god_mode"}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn threshold_check_is_inclusive() {
        let thresholds = Thresholds::default();
        assert!(thresholds.is_met(CapabilityTier::AssistMode, 0.5));
        assert!(!thresholds.is_met(CapabilityTier::MinorEdits, 0.69));
        assert!(!Thresholds::new(BTreeMap::new()).is_met(CapabilityTier::AssistMode, 1.0));
    }
}
