//! Human-facing authority levels.

use serde::Serialize;
use std::fmt;
use tenure_capability::Thresholds;
use tenure_types::CapabilityTier;

/// Authority label derived from proficiency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AuthorityLevel {
    Observer,
    Advisor,
    #[serde(rename = "Junior Dev")]
    JuniorDev,
    #[serde(rename = "Senior Dev")]
    SeniorDev,
    Architect,
}

impl AuthorityLevel {
    /// The level a tier confers.
    pub const fn for_tier(tier: CapabilityTier) -> Self {
        match tier {
            CapabilityTier::AssistMode => Self::Advisor,
            CapabilityTier::MinorEdits => Self::JuniorDev,
            CapabilityTier::RefactorLint => Self::SeniorDev,
            CapabilityTier::AutonomousEditing => Self::Architect,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Observer => "Observer",
            Self::Advisor => "Advisor",
            Self::JuniorDev => "Junior Dev",
            Self::SeniorDev => "Senior Dev",
            Self::Architect => "Architect",
        }
    }

    /// Actions this level may perform.
    pub const fn capabilities(&self) -> &'static [&'static str] {
        match self {
            Self::Observer => &[],
            Self::Advisor => &["assist"],
            Self::JuniorDev => &["minor_edit"],
            Self::SeniorDev => &["refactor", "lint"],
            Self::Architect => &["autonomous_edit"],
        }
    }
}

impl fmt::Display for AuthorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A level together with the proficiency range it covers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuthorityStanding {
    pub level: AuthorityLevel,
    /// `[own threshold, next threshold]`; the top level ends at 1.0.
    pub range: [f64; 2],
    pub capabilities: Vec<&'static str>,
}

impl AuthorityStanding {
    /// The highest tier whose threshold is at most `proficiency` decides the
    /// level; below every threshold the level is Observer.
    pub fn derive(proficiency: f64, thresholds: &Thresholds) -> Self {
        let reached = CapabilityTier::ALL
            .iter()
            .rev()
            .find(|tier| thresholds.is_met(**tier, proficiency))
            .copied();

        let (level, lower, upper) = match reached {
            Some(tier) => {
                let lower = thresholds.get(tier).unwrap_or(0.0);
                let upper = tier
                    .next()
                    .and_then(|next| thresholds.get(next))
                    .unwrap_or(1.0);
                (AuthorityLevel::for_tier(tier), lower, upper)
            }
            None => {
                let upper = thresholds.get(CapabilityTier::lowest()).unwrap_or(1.0);
                (AuthorityLevel::Observer, 0.0, upper)
            }
        };

        Self {
            level,
            range: [lower, upper],
            capabilities: level.capabilities().to_vec(),
        }
    }
}
