use tenure_types::CapabilityTier;
use thiserror::Error;

pub type CapabilityConfigResult<T> = Result<T, CapabilityConfigError>;

/// A capability configuration that cannot be loaded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CapabilityConfigError {
    #[error("no threshold configured for tier {0}")]
    MissingThreshold(CapabilityTier),

    #[error("threshold for {tier} must lie in [0, 1], got {value}")]
    ThresholdOutOfRange { tier: CapabilityTier, value: f64 },

    #[error("threshold for {higher} ({higher_value}) is below {lower} ({lower_value})")]
    ThresholdsNotMonotonic {
        lower: CapabilityTier,
        lower_value: f64,
        higher: CapabilityTier,
        higher_value: f64,
    },

    #[error("no action is mapped to the lowest tier {0}")]
    NoLowestTierAction(CapabilityTier),

    #[error("default action '{action}' for intent '{intent}' is not a configured action")]
    UnknownDefaultAction { intent: String, action: String },

    #[error("write token ttl must be at least 1 second")]
    InvalidTokenTtl,

    #[error("max_new_code_chars must be at least 1")]
    InvalidMaxNewCodeChars,
}
