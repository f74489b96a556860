#![forbid(unsafe_code)]

//! Binding engine configuration.
//!
//! [`BindingConfig::default`] gives the stock attribute names and weak
//! reference timings. With the `policy-config` feature the same structure
//! loads from TOML; every key is optional.
//!
//! ```toml
//! bind_attribute = "data-bind"
//!
//! [weak_refs]
//! mode = "table"
//! trigger = "idle"
//! sweep_period_ms = 250
//! entry_timeout_ms = 2000
//! fast_load = true
//! ```

use std::fmt;
use std::time::Duration;

/// Default attribute holding binding expressions.
pub const DEFAULT_BIND_ATTRIBUTE: &str = "data-bind";
/// Default attribute marking declarative control containers.
pub const DEFAULT_CONTROL_ATTRIBUTE: &str = "data-control";

/// How element references are held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "policy-config", derive(serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(rename_all = "snake_case"))]
pub enum WeakRefMode {
    /// Strong entries with timestamps, purged by a periodic sweep.
    #[default]
    Table,
    /// Native weak handles; no sweeping.
    Native,
}

/// What drives table sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "policy-config", derive(serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(rename_all = "snake_case"))]
pub enum SweepTrigger {
    /// A normal-priority task every sweep period.
    #[default]
    Timer,
    /// An idle-priority task every sweep period.
    Idle,
}

/// Weak reference table tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct WeakRefConfig {
    pub mode: WeakRefMode,
    pub trigger: SweepTrigger,
    /// Delay between sweeps.
    #[cfg_attr(
        feature = "policy-config",
        serde(rename = "sweep_period_ms", deserialize_with = "millis::deserialize")
    )]
    pub sweep_period: Duration,
    /// Entries idle longer than this are purged.
    #[cfg_attr(
        feature = "policy-config",
        serde(rename = "entry_timeout_ms", deserialize_with = "millis::deserialize")
    )]
    pub entry_timeout: Duration,
    /// Trust cached entries without a live lookup during bulk passes.
    pub fast_load: bool,
}

impl Default for WeakRefConfig {
    fn default() -> Self {
        Self {
            mode: WeakRefMode::Table,
            trigger: SweepTrigger::Timer,
            sweep_period: Duration::from_millis(500),
            entry_timeout: Duration::from_millis(1000),
            fast_load: false,
        }
    }
}

impl WeakRefConfig {
    #[must_use]
    pub fn with_mode(mut self, mode: WeakRefMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_trigger(mut self, trigger: SweepTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    #[must_use]
    pub fn with_sweep_period(mut self, period: Duration) -> Self {
        self.sweep_period = period;
        self
    }

    #[must_use]
    pub fn with_entry_timeout(mut self, timeout: Duration) -> Self {
        self.entry_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_fast_load(mut self, enabled: bool) -> Self {
        self.fast_load = enabled;
        self
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct BindingConfig {
    /// Attribute holding binding expressions.
    pub bind_attribute: String,
    /// Attribute marking declarative control containers.
    pub control_attribute: String,
    pub weak_refs: WeakRefConfig,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            bind_attribute: DEFAULT_BIND_ATTRIBUTE.to_owned(),
            control_attribute: DEFAULT_CONTROL_ATTRIBUTE.to_owned(),
            weak_refs: WeakRefConfig::default(),
        }
    }
}

impl BindingConfig {
    #[must_use]
    pub fn with_bind_attribute(mut self, name: impl Into<String>) -> Self {
        self.bind_attribute = name.into();
        self
    }

    #[must_use]
    pub fn with_control_attribute(mut self, name: impl Into<String>) -> Self {
        self.control_attribute = name.into();
        self
    }

    #[must_use]
    pub fn with_weak_refs(mut self, weak_refs: WeakRefConfig) -> Self {
        self.weak_refs = weak_refs;
        self
    }

    /// Load a configuration from TOML text. Missing keys keep their defaults.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_attribute.is_empty() {
            return Err(ConfigError::Invalid {
                key: "bind_attribute",
                reason: "must not be empty",
            });
        }
        if self.control_attribute.is_empty() {
            return Err(ConfigError::Invalid {
                key: "control_attribute",
                reason: "must not be empty",
            });
        }
        if self.weak_refs.mode == WeakRefMode::Table && self.weak_refs.sweep_period.is_zero() {
            return Err(ConfigError::Invalid {
                key: "weak_refs.sweep_period_ms",
                reason: "must be positive in table mode",
            });
        }
        Ok(())
    }
}

/// Errors from loading or validating a [`BindingConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The TOML text could not be decoded.
    Parse(String),
    /// A value is out of range.
    Invalid { key: &'static str, reason: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "failed to parse binding config: {msg}"),
            Self::Invalid { key, reason } => write!(f, "invalid binding config '{key}': {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(feature = "policy-config")]
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = BindingConfig::default();
        assert_eq!(config.bind_attribute, "data-bind");
        assert_eq!(config.control_attribute, "data-control");
        assert_eq!(config.weak_refs.mode, WeakRefMode::Table);
        assert_eq!(config.weak_refs.sweep_period, Duration::from_millis(500));
        assert_eq!(config.weak_refs.entry_timeout, Duration::from_millis(1000));
        assert!(!config.weak_refs.fast_load);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_empty_attribute() {
        let config = BindingConfig::default().with_bind_attribute("");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "bind_attribute", .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_sweep_period_in_table_mode() {
        let config = BindingConfig::default()
            .with_weak_refs(WeakRefConfig::default().with_sweep_period(Duration::ZERO));
        assert!(config.validate().is_err());

        let native = BindingConfig::default().with_weak_refs(
            WeakRefConfig::default()
                .with_mode(WeakRefMode::Native)
                .with_sweep_period(Duration::ZERO),
        );
        assert_eq!(native.validate(), Ok(()));
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn toml_overrides_only_given_keys() {
        let config = BindingConfig::from_toml_str(
            r#"
            control_attribute = "data-widget"

            [weak_refs]
            trigger = "idle"
            entry_timeout_ms = 2500
            fast_load = true
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_attribute, "data-bind");
        assert_eq!(config.control_attribute, "data-widget");
        assert_eq!(config.weak_refs.trigger, SweepTrigger::Idle);
        assert_eq!(config.weak_refs.entry_timeout, Duration::from_millis(2500));
        assert_eq!(config.weak_refs.sweep_period, Duration::from_millis(500));
        assert!(config.weak_refs.fast_load);
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn toml_errors_are_reported() {
        let err = BindingConfig::from_toml_str("weak_refs = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().starts_with("failed to parse binding config"));
    }
}
