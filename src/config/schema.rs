//! Agent configuration schema definitions.
//!
//! This module defines how the agent itself is wired to the platform: who the
//! unit is, where option and relation data live, and how the Dex workload is
//! reached. Charm options (what Dex is configured with) live in
//! [`crate::config::options`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the operator agent.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OperatorConfig {
    /// Identity of the unit this agent runs for.
    pub unit: UnitConfig,

    /// Where option, relation and state data are stored.
    pub paths: PathsConfig,

    /// How the Dex workload is reached.
    pub workload: WorkloadConfig,

    /// Retry pacing for passes that end in Waiting.
    pub reconcile: ReconcileConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Unit identity as assigned by the orchestration platform.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UnitConfig {
    /// Application name (e.g., "dex-auth").
    pub app_name: String,

    /// Model name; also the Kubernetes namespace the workload runs in.
    pub model_name: String,

    /// Unit name (e.g., "dex-auth/0").
    pub unit_name: String,

    /// Whether this unit currently holds leadership.
    pub leader: bool,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            app_name: "dex-auth".to_string(),
            model_name: "kubeflow".to_string(),
            unit_name: "dex-auth/0".to_string(),
            leader: true,
        }
    }
}

/// Filesystem locations shared with the platform.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// YAML file holding the charm options.
    pub options_file: PathBuf,

    /// Directory holding one subdirectory per relation endpoint.
    pub relations_dir: PathBuf,

    /// JSON file holding the unit's persisted state.
    pub state_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            options_file: PathBuf::from("/var/lib/dex-auth/options.yaml"),
            relations_dir: PathBuf::from("/var/lib/dex-auth/relations"),
            state_file: PathBuf::from("/var/lib/dex-auth/state.json"),
        }
    }
}

/// Dex workload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Root of the workload container filesystem as seen by the agent.
    pub root: PathBuf,

    /// Absolute path of the Dex config file inside the container.
    pub config_path: String,

    /// Dex executable.
    pub binary: String,

    /// Name of the managed service.
    pub service_name: String,

    /// Seconds to wait for the service to stop before killing it.
    pub stop_timeout_secs: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            config_path: "/etc/dex/config.docker.yaml".to_string(),
            binary: "dex".to_string(),
            service_name: "dex".to_string(),
            stop_timeout_secs: 10,
        }
    }
}

/// Retry pacing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Re-dispatch `update-status` after a pass ends in Waiting.
    pub retry_enabled: bool,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            retry_enabled: true,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
