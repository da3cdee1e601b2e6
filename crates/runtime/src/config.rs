use std::path::Path;

use serde::{Deserialize, Serialize};

use oee_quality::{
    default_event_rules, default_result_rules, EventValidator, ResultValidator, RuleError, RuleSpec,
};
use oee_windows::AggregatorConfig;

/// Longest window or lateness bound accepted from configuration.
const MAX_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("window_secs must be between 1 and 604800, got {0}")]
    InvalidWindow(u64),

    #[error("allowed_lateness_secs must be at most 604800, got {0}")]
    InvalidLateness(u64),

    #[error(transparent)]
    Rules(#[from] RuleError),
}

/// Tunables of the KPI pipeline. Every field has a default, so a config file
/// only needs the values it overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub window_secs: u64,
    pub allowed_lateness_secs: u64,
    /// Drop-on-fail rules applied to structured telemetry.
    pub event_rules: Vec<RuleSpec>,
    /// Warn-only rules applied to KPI rows.
    pub result_rules: Vec<RuleSpec>,
    /// Finalize still-open windows once the input is closed for good.
    pub flush_on_close: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_secs: 300,
            allowed_lateness_secs: 60,
            event_rules: default_event_rules(),
            result_rules: default_result_rules(),
            flush_on_close: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_json(&text)
    }

    /// Check bounds and compile both rule sets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_secs == 0 || self.window_secs > MAX_SECS {
            return Err(ConfigError::InvalidWindow(self.window_secs));
        }
        if self.allowed_lateness_secs > MAX_SECS {
            return Err(ConfigError::InvalidLateness(self.allowed_lateness_secs));
        }
        self.event_validator()?;
        self.result_validator()?;
        Ok(())
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            window: chrono::Duration::seconds(self.window_secs.min(MAX_SECS) as i64),
            allowed_lateness: chrono::Duration::seconds(self.allowed_lateness_secs.min(MAX_SECS) as i64),
        }
    }

    pub fn event_validator(&self) -> Result<EventValidator, RuleError> {
        EventValidator::new(&self.event_rules)
    }

    pub fn result_validator(&self) -> Result<ResultValidator, RuleError> {
        ResultValidator::new(&self.result_rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.aggregator_config(), AggregatorConfig::default());
        assert_eq!(config.event_validator().unwrap().rules().len(), 4);
        assert_eq!(config.result_validator().unwrap().rules().len(), 5);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = PipelineConfig::from_json(r#"{"window_secs": 60}"#).unwrap();
        assert_eq!(config.window_secs, 60);
        assert_eq!(config.allowed_lateness_secs, 60);
        assert!(config.flush_on_close);
        assert_eq!(config.result_rules, default_result_rules());
    }

    #[test]
    fn rules_are_data() {
        let config = PipelineConfig::from_json(
            r#"{"result_rules": [{"name": "warn_hot", "expr": "max_temperature < 100"}]}"#,
        )
        .unwrap();
        let names: Vec<_> = config.result_validator().unwrap().rules().names().map(String::from).collect();
        assert_eq!(names, vec!["warn_hot"]);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            PipelineConfig::from_json(r#"{"window_secs": 0}"#),
            Err(ConfigError::InvalidWindow(0))
        ));
        assert!(matches!(
            PipelineConfig::from_json(r#"{"allowed_lateness_secs": 99999999}"#),
            Err(ConfigError::InvalidLateness(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json(r#"{"event_rules": [{"name": "x", "expr": "pressure > 1"}]}"#),
            Err(ConfigError::Rules(RuleError::UnknownField { .. }))
        ));
        assert!(matches!(PipelineConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }
}
