//! Agent configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Reject unusable identities (empty app or model name)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: OperatorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::OperatorConfig;

/// A single semantic problem with the agent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate an agent configuration, collecting every problem found.
pub fn validate_config(config: &OperatorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.unit.app_name.trim().is_empty() {
        errors.push(ValidationError::new("unit.app_name", "must not be empty"));
    }
    if config.unit.model_name.trim().is_empty() {
        errors.push(ValidationError::new("unit.model_name", "must not be empty"));
    }

    if !config.workload.config_path.starts_with('/') {
        errors.push(ValidationError::new(
            "workload.config_path",
            format!("must be absolute, got {:?}", config.workload.config_path),
        ));
    }
    if config.workload.binary.trim().is_empty() {
        errors.push(ValidationError::new("workload.binary", "must not be empty"));
    }
    if config.workload.service_name.trim().is_empty() {
        errors.push(ValidationError::new("workload.service_name", "must not be empty"));
    }
    if config.workload.stop_timeout_secs == 0 {
        errors.push(ValidationError::new("workload.stop_timeout_secs", "must be > 0"));
    }

    if config.reconcile.base_delay_ms > config.reconcile.max_delay_ms {
        errors.push(ValidationError::new(
            "reconcile.base_delay_ms",
            "must not exceed reconcile.max_delay_ms",
        ));
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("expected \"pretty\" or \"json\", got {:?}", config.observability.log_format),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address {:?}", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("invalid socket address {:?}", config.admin.bind_address),
            ));
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&OperatorConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = OperatorConfig::default();
        config.unit.app_name = String::new();
        config.workload.config_path = "etc/dex.yaml".to_string();
        config.observability.log_format = "xml".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["unit.app_name", "workload.config_path", "observability.log_format"]
        );
    }

    #[test]
    fn admin_address_checked_only_when_enabled() {
        let mut config = OperatorConfig::default();
        config.admin.bind_address = "not-an-address".to_string();
        assert!(validate_config(&config).is_ok());

        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "admin.bind_address");
    }
}
