//! Viewer configuration.
//!
//! Refresh cadence, disposal grace period and audit history settings.
//! Loaded from YAML; every field has a default so an empty document is a
//! valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default refresh period (50 Hz).
pub const DEFAULT_PERIOD_MS: u64 = 20;

/// Default grace period, in refresh periods.
pub const DEFAULT_GRACE_FACTOR: u32 = 5;

/// Root configuration for the viewer core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Refresh scheduler and disposal timing.
    pub refresh: RefreshConfig,

    /// Audit event settings.
    pub audit: AuditConfig,
}

impl ViewerConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh.period_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "refresh.period_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.audit.enabled && self.audit.buffer_size == 0 {
            return Err(ConfigError::Invalid {
                field: "audit.buffer_size",
                reason: "must be greater than zero when audit is enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Set the refresh period.
    pub fn period_ms(mut self, period_ms: u64) -> Self {
        self.refresh.period_ms = period_ms;
        self
    }

    /// Set an explicit grace period, overriding the factor.
    pub fn grace_period_ms(mut self, grace_ms: u64) -> Self {
        self.refresh.grace_period_ms = Some(grace_ms);
        self
    }

    /// Enable or disable audit events.
    pub fn audit_enabled(mut self, enabled: bool) -> Self {
        self.audit.enabled = enabled;
        self
    }

    /// Write audit history to the given file, creating it if necessary.
    pub fn history_file(mut self, path: PathBuf) -> Self {
        self.audit.history_file = Some(path);
        self
    }
}

/// Refresh scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Interval between ticks (milliseconds).
    pub period_ms: u64,

    /// Grace period expressed as a multiple of the period.
    pub grace_factor: u32,

    /// Explicit grace period (milliseconds); wins over `grace_factor`.
    pub grace_period_ms: Option<u64>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_PERIOD_MS,
            grace_factor: DEFAULT_GRACE_FACTOR,
            grace_period_ms: None,
        }
    }
}

impl RefreshConfig {
    /// Get the tick period as Duration.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// How long disposal waits for an in-flight tick. Saturates rather
    /// than overflowing.
    pub fn grace_period(&self) -> Duration {
        match self.grace_period_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self
                .period()
                .checked_mul(self.grace_factor)
                .unwrap_or(Duration::MAX),
        }
    }
}

/// Audit event configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Whether audit events are emitted at all.
    pub enabled: bool,

    /// Size of the audit buffer (channel capacity).
    ///
    /// Events beyond this are dropped and counted, never blocked on.
    pub buffer_size: usize,

    /// Explicit history file. Created when missing.
    ///
    /// When unset, `history.jsonl` in the working directory is used, but
    /// only if it already exists.
    pub history_file: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 1024,
            history_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ViewerConfig::default();
        assert_eq!(config.refresh.period(), Duration::from_millis(20));
        assert_eq!(config.refresh.grace_period(), Duration::from_millis(100));
        assert!(config.audit.enabled);
        assert_eq!(config.audit.buffer_size, 1024);
        assert!(config.audit.history_file.is_none());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
refresh:
  period_ms: 16
  grace_factor: 3
audit:
  history_file: "/tmp/seeds.jsonl"
"#;
        let config = ViewerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.refresh.period_ms, 16);
        assert_eq!(config.refresh.grace_period(), Duration::from_millis(48));
        assert!(config.audit.enabled);
        assert_eq!(
            config.audit.history_file,
            Some(PathBuf::from("/tmp/seeds.jsonl"))
        );
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = ViewerConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn test_huge_grace_factor_saturates() {
        let yaml = "refresh:\n  period_ms: 18446744073709551615\n  grace_factor: 4294967295\n";
        let config = ViewerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.refresh.grace_period(), Duration::MAX);

        let config = ViewerConfig::default().period_ms(u64::MAX);
        assert!(config.refresh.grace_period() >= config.refresh.period());
    }

    #[test]
    fn test_explicit_grace_wins_over_factor() {
        let config = ViewerConfig::default().period_ms(10).grace_period_ms(7);
        assert_eq!(config.refresh.grace_period(), Duration::from_millis(7));
    }

    #[test]
    fn test_zero_period_rejected() {
        let err = ViewerConfig::from_yaml("refresh:\n  period_ms: 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "refresh.period_ms",
                ..
            }
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.yaml");
        std::fs::write(&path, "audit:\n  enabled: false\n").unwrap();

        let config = ViewerConfig::from_file(&path).unwrap();
        assert!(!config.audit.enabled);
    }
}
