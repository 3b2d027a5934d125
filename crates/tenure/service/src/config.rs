//! Configuration for the authority service

use serde::{Deserialize, Serialize};
use tenure_capability::{CapabilityConfigError, CapabilityMap, PatchPolicy};
use tenure_progress::DEFAULT_WINDOW_SIZE;
use thiserror::Error;

/// Environment prefix; nested keys use `__`, e.g.
/// `TENURE__PATCH_EDITING__WRITE_TOKEN_TTL_SECONDS=60`.
pub const ENV_PREFIX: &str = "TENURE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid capability configuration: {0}")]
    Capability(#[from] CapabilityConfigError),

    #[error("window_size must be at least 1")]
    InvalidWindowSize,
}

/// Main service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Number of recent scores averaged into proficiency
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Thresholds, actions and intent defaults
    #[serde(flatten)]
    pub capabilities: CapabilityMap,

    /// Patch generation and application policy
    #[serde(default)]
    pub patch_editing: PatchPolicy,

    /// Audit storage
    #[serde(default)]
    pub audit: AuditConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            capabilities: CapabilityMap::default(),
            patch_editing: PatchPolicy::default(),
            audit: AuditConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Audit storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// SQLite URL, e.g. `sqlite://tenure-audit.db`. In-memory when unset.
    #[serde(default)]
    pub database_url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AuthorityConfig {
    /// Load defaults, then the optional file, then `TENURE__*` environment
    /// variables, and validate the result.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&AuthorityConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < 1 {
            return Err(ConfigError::InvalidWindowSize);
        }
        self.capabilities.validate()?;
        self.patch_editing.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tenure_types::CapabilityTier;

    fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_default_config() {
        let config = AuthorityConfig::default();
        config.validate().unwrap();
        assert_eq!(config.window_size, 50);
        assert_eq!(config.patch_editing.write_token_ttl_seconds, 120);
        assert_eq!(config.patch_editing.ceiling(CapabilityTier::MinorEdits), Some(10));
        assert!(config.audit.database_url.is_none());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "tenure.toml",
            r#"
window_size = 2

[thresholds]
assist_mode = 0.4

[patch_editing]
write_token_ttl_seconds = 30

[patch_editing.max_changes_by_required_unlock]
minor_edits = 1
"#,
        );

        let config = AuthorityConfig::load(Some(&path)).unwrap();
        assert_eq!(config.window_size, 2);
        assert_eq!(config.capabilities.thresholds.get(CapabilityTier::AssistMode), Some(0.4));
        assert_eq!(config.capabilities.thresholds.get(CapabilityTier::MinorEdits), Some(0.7));
        assert_eq!(config.patch_editing.write_token_ttl_seconds, 30);
        assert_eq!(config.patch_editing.ceiling(CapabilityTier::MinorEdits), Some(1));
        assert!(config.capabilities.actions.contains_key("refactor"));
    }

    #[test]
    fn invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "bad.json", r#"{"thresholds": {"minor_edits": 0.95}}"#);
        assert!(matches!(
            AuthorityConfig::load(Some(&path)),
            Err(ConfigError::Capability(CapabilityConfigError::ThresholdsNotMonotonic { .. }))
        ));

        let path = write_file(&dir, "unknown.json", r#"{"actions": {"deploy": "root_access"}}"#);
        assert!(matches!(AuthorityConfig::load(Some(&path)), Err(ConfigError::Load(_))));

        let path = write_file(&dir, "window.json", r#"{"window_size": 0}"#);
        assert!(matches!(AuthorityConfig::load(Some(&path)), Err(ConfigError::InvalidWindowSize)));
    }

    #[test]
    fn serde_round_trip_keeps_shape() {
        let config = AuthorityConfig::default();
        let value = serde_json::to_value(&config).unwrap();
        assert!(value.get("thresholds").is_some());
        assert!(value.get("actions").is_some());
        assert!(value.get("intent_default_action").is_some());
        let back: AuthorityConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }
}
