// crates/opx-automation/src/config.rs
// ============================================================================
// Module: Automation Configuration
// Description: Process-wide configuration for the automation orchestration
// layer, resolved once at startup from environment variables.
// Purpose: Give every table/topic/bus name a single, fail-closed source so
// no handler constructs a resource name inline.
// Dependencies: std::env
// ============================================================================

//! ## Overview
//! `AutomationConfig` resolves exactly the environment variables named in
//! spec.md's "Environment configuration" section. Resolution is strict and
//! fail-closed: a required variable that is absent or empty is a startup
//! error, never a silently-defaulted value. The CLOUDWATCH_NAMESPACE
//! variable is the one spec-named exception, defaulting to
//! `"LearningOperations"` when absent.

use std::env;

/// Default CloudWatch namespace when `CLOUDWATCH_NAMESPACE` is unset.
const DEFAULT_CLOUDWATCH_NAMESPACE: &str = "LearningOperations";

/// Why [`AutomationConfig::from_env`] could not resolve a complete
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable was absent or empty.
    #[error("missing or empty required environment variable: {0}")]
    MissingRequired(&'static str),
}

/// Process-wide automation configuration, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationConfig {
    /// `AUDIT_TABLE_NAME`.
    pub audit_table_name: String,
    /// `CONFIG_TABLE_NAME`.
    pub config_table_name: String,
    /// `OUTCOME_TABLE_NAME`.
    pub outcome_table_name: String,
    /// `CALIBRATION_TABLE_NAME`.
    pub calibration_table_name: String,
    /// `SUMMARY_TABLE_NAME`.
    pub summary_table_name: String,
    /// `SNAPSHOT_TABLE_NAME`.
    pub snapshot_table_name: String,
    /// `INCIDENTS_TABLE_NAME`.
    pub incidents_table_name: String,
    /// `EVIDENCE_TABLE_NAME`.
    pub evidence_table_name: String,
    /// `SIGNALS_TABLE_NAME`.
    pub signals_table_name: String,
    /// `PROMOTIONS_TABLE_NAME`.
    pub promotions_table_name: String,
    /// Async function name invoked for `PATTERN_EXTRACTION`.
    pub pattern_extraction_function_name: String,
    /// Async function name invoked for `CALIBRATION`.
    pub calibration_function_name: String,
    /// Async function name invoked for `SNAPSHOT`.
    pub snapshot_function_name: String,
    /// `ALERT_TOPIC_ARN`.
    pub alert_topic_arn: String,
    /// `CLOUDWATCH_NAMESPACE`, defaulted to `"LearningOperations"`.
    pub cloudwatch_namespace: String,
    /// `EVENT_BUS_NAME`.
    pub event_bus_name: String,
    /// Deployment region.
    pub region: String,
}

impl AutomationConfig {
    /// Resolves a complete configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] for the first required
    /// variable found absent or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            audit_table_name: required("AUDIT_TABLE_NAME")?,
            config_table_name: required("CONFIG_TABLE_NAME")?,
            outcome_table_name: required("OUTCOME_TABLE_NAME")?,
            calibration_table_name: required("CALIBRATION_TABLE_NAME")?,
            summary_table_name: required("SUMMARY_TABLE_NAME")?,
            snapshot_table_name: required("SNAPSHOT_TABLE_NAME")?,
            incidents_table_name: required("INCIDENTS_TABLE_NAME")?,
            evidence_table_name: required("EVIDENCE_TABLE_NAME")?,
            signals_table_name: required("SIGNALS_TABLE_NAME")?,
            promotions_table_name: required("PROMOTIONS_TABLE_NAME")?,
            pattern_extraction_function_name: required("PATTERN_EXTRACTION_FUNCTION_NAME")?,
            calibration_function_name: required("CALIBRATION_FUNCTION_NAME")?,
            snapshot_function_name: required("SNAPSHOT_FUNCTION_NAME")?,
            alert_topic_arn: required("ALERT_TOPIC_ARN")?,
            cloudwatch_namespace: env::var("CLOUDWATCH_NAMESPACE").ok().filter(|v| !v.is_empty()).unwrap_or_else(|| DEFAULT_CLOUDWATCH_NAMESPACE.to_string()),
            event_bus_name: required("EVENT_BUS_NAME")?,
            region: required("REGION")?,
        })
    }

    /// Builds a configuration with deterministic, obviously-fake values for
    /// tests that need a complete config but don't care about its content.
    #[cfg(test)]
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            audit_table_name: "test-audit".to_string(),
            config_table_name: "test-config".to_string(),
            outcome_table_name: "test-outcome".to_string(),
            calibration_table_name: "test-calibration".to_string(),
            summary_table_name: "test-summary".to_string(),
            snapshot_table_name: "test-snapshot".to_string(),
            incidents_table_name: "test-incidents".to_string(),
            evidence_table_name: "test-evidence".to_string(),
            signals_table_name: "test-signals".to_string(),
            promotions_table_name: "test-promotions".to_string(),
            pattern_extraction_function_name: "test-pattern-extraction".to_string(),
            calibration_function_name: "test-calibration-fn".to_string(),
            snapshot_function_name: "test-snapshot-fn".to_string(),
            alert_topic_arn: "arn:aws:sns:us-east-1:000000000000:test-alerts".to_string(),
            cloudwatch_namespace: DEFAULT_CLOUDWATCH_NAMESPACE.to_string(),
            event_bus_name: "test-event-bus".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

/// Reads a required environment variable, treating an empty value the same
/// as an absent one.
fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).ok().filter(|value| !value.is_empty()).ok_or(ConfigError::MissingRequired(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_tests_config_is_internally_consistent() {
        let config = AutomationConfig::for_tests();
        assert_eq!(config.cloudwatch_namespace, DEFAULT_CLOUDWATCH_NAMESPACE);
        assert!(!config.audit_table_name.is_empty());
    }

    #[test]
    fn missing_required_variable_is_reported_by_name() {
        let err = required("OPX_DEFINITELY_UNSET_VARIABLE_FOR_TESTS").unwrap_err();
        assert_eq!(err, ConfigError::MissingRequired("OPX_DEFINITELY_UNSET_VARIABLE_FOR_TESTS"));
    }
}
