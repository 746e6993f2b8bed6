//! Service layer for the Dex process.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::WorkloadConfig;
use crate::settings::Settings;
use crate::workload::render::Artifact;

pub const NAMESPACE_ENV: &str = "KUBERNETES_POD_NAMESPACE";
pub const CONFIG_HASH_ENV: &str = "CONFIG_HASH";

/// A named set of service definitions, merged into the workload's plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub summary: String,
    pub description: String,
    pub services: BTreeMap<String, Service>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// `replace` discards any earlier definition of the service.
    #[serde(rename = "override")]
    pub override_mode: String,
    pub summary: String,
    pub command: String,
    pub startup: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl Service {
    /// Command split into program and arguments.
    pub fn argv(&self) -> Vec<&str> {
        self.command.split_whitespace().collect()
    }
}

/// Build the layer that runs Dex against `artifact`.
///
/// `CONFIG_HASH` changes with every new artifact, so a plan diff alone is
/// enough to tell that the service must restart.
pub fn layer(settings: &Settings, artifact: &Artifact, workload: &WorkloadConfig) -> Layer {
    let mut environment = BTreeMap::new();
    environment.insert(NAMESPACE_ENV.to_string(), settings.namespace.clone());
    environment.insert(CONFIG_HASH_ENV.to_string(), artifact.hash());

    let mut services = BTreeMap::new();
    services.insert(
        workload.service_name.clone(),
        Service {
            override_mode: "replace".to_string(),
            summary: "dex".to_string(),
            command: format!("{} serve {}", workload.binary, workload.config_path),
            startup: "enabled".to_string(),
            environment,
        },
    );

    Layer {
        summary: "dex layer".to_string(),
        description: "pebble config layer for dex".to_string(),
        services,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::render::render;

    fn settings() -> Settings {
        Settings {
            issuer_url: "http://dex-auth.kubeflow.svc:5556/dex".to_string(),
            port: 5556,
            telemetry_port: 5558,
            enable_password_db: true,
            static_login: None,
            connectors: Vec::new(),
            static_clients: Vec::new(),
            namespace: "kubeflow".to_string(),
        }
    }

    #[test]
    fn layer_runs_dex_with_config_hash() {
        let s = settings();
        let artifact = render(&s).unwrap();
        let layer = layer(&s, &artifact, &WorkloadConfig::default());

        let service = &layer.services["dex"];
        assert_eq!(service.command, "dex serve /etc/dex/config.docker.yaml");
        assert_eq!(service.argv(), vec!["dex", "serve", "/etc/dex/config.docker.yaml"]);
        assert_eq!(service.environment[NAMESPACE_ENV], "kubeflow");
        assert_eq!(service.environment[CONFIG_HASH_ENV], artifact.hash());
    }

    #[test]
    fn new_artifact_changes_layer() {
        let a = settings();
        let mut b = settings();
        b.port = 5555;
        let cfg = WorkloadConfig::default();

        let la = layer(&a, &render(&a).unwrap(), &cfg);
        let lb = layer(&b, &render(&b).unwrap(), &cfg);
        assert_ne!(la, lb);
    }
}
