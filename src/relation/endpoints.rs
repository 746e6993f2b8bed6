//! The operator's canonical capability set.
//!
//! One flat table of endpoints. Service-mesh integrations belong to a
//! different platform-version target and are not declared here.

use crate::relation::schema::{SchemaVersion, INGRESS_INTERFACE, OIDC_CLIENT_INTERFACE};

pub const INGRESS: &str = "ingress";
pub const OIDC_CLIENT: &str = "oidc-client";
pub const DEX_OIDC_CONFIG: &str = "dex-oidc-config";
pub const METRICS_ENDPOINT: &str = "metrics-endpoint";
pub const GRAFANA_DASHBOARD: &str = "grafana-dashboard";
pub const LOGGING: &str = "logging";

/// How data is laid out in the application bags of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// `_supported_versions` + YAML `data`, validated against a schema.
    Versioned(&'static [SchemaVersion]),
    /// Plain keys defined by the interface; opaque to the exchanger.
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub name: &'static str,
    pub interface: &'static str,
    pub envelope: Envelope,
}

pub const ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        name: INGRESS,
        interface: INGRESS_INTERFACE,
        envelope: Envelope::Versioned(&[SchemaVersion::V1, SchemaVersion::V2]),
    },
    Endpoint {
        name: OIDC_CLIENT,
        interface: OIDC_CLIENT_INTERFACE,
        envelope: Envelope::Versioned(&[SchemaVersion::V1]),
    },
    Endpoint {
        name: DEX_OIDC_CONFIG,
        interface: "dex-oidc-config",
        envelope: Envelope::Plain,
    },
    Endpoint {
        name: METRICS_ENDPOINT,
        interface: "prometheus_scrape",
        envelope: Envelope::Plain,
    },
    Endpoint {
        name: GRAFANA_DASHBOARD,
        interface: "grafana_dashboard",
        envelope: Envelope::Plain,
    },
    Endpoint {
        name: LOGGING,
        interface: "loki_push_api",
        envelope: Envelope::Plain,
    },
];

/// Look up a declared endpoint by name.
pub fn endpoint(name: &str) -> Option<&'static Endpoint> {
    ENDPOINTS.iter().find(|e| e.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_names_are_unique() {
        for (i, a) in ENDPOINTS.iter().enumerate() {
            for b in &ENDPOINTS[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn versioned_endpoints_list_versions_ascending() {
        for e in ENDPOINTS {
            if let Envelope::Versioned(versions) = e.envelope {
                assert!(!versions.is_empty(), "{}", e.name);
                assert!(versions.windows(2).all(|w| w[0] < w[1]), "{}", e.name);
            }
        }
    }

    #[test]
    fn mesh_endpoints_are_not_declared() {
        assert!(endpoint("service-mesh").is_none());
        assert!(endpoint("cmr-mesh").is_none());
        assert_eq!(endpoint(INGRESS).map(|e| e.interface), Some(INGRESS_INTERFACE));
    }
}
