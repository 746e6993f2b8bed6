//! Versioned relation payload schemas.
//!
//! Schema-governed integrations wrap their payload in a small envelope: each
//! side lists the versions it speaks under `_supported_versions` (a YAML
//! list) and publishes its payload, YAML-encoded, under `data`.
//!
//! Validation deserializes into the typed payload for the negotiated
//! version: unknown fields are ignored, missing required fields fail.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Envelope key listing the versions a side supports.
pub const SUPPORTED_VERSIONS_KEY: &str = "_supported_versions";

/// Envelope key holding the YAML-encoded payload.
pub const DATA_KEY: &str = "data";

/// Interface name of OIDC client registration.
pub const OIDC_CLIENT_INTERFACE: &str = "oidc-client";

/// Interface name of ingress routing.
pub const INGRESS_INTERFACE: &str = "ingress";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    V1,
    V2,
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVersion::V1 => write!(f, "v1"),
            SchemaVersion::V2 => write!(f, "v2"),
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "v1" => Ok(SchemaVersion::V1),
            "v2" => Ok(SchemaVersion::V2),
            other => Err(format!("unknown schema version {:?}", other)),
        }
    }
}

/// Static client registered by an application relating over `oidc-client`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcClient {
    pub id: String,
    pub name: String,
    #[serde(rename = "redirectURIs")]
    pub redirect_uris: Vec<String>,
    pub secret: String,
}

/// Route requested over `ingress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRoute {
    pub service: String,
    pub port: u16,
    /// Required from v2 on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<String>,
}

/// Check `value` against the schema of `interface` at `version`.
///
/// Returns a human-readable reason on failure.
pub fn validate(interface: &str, version: SchemaVersion, value: &serde_yaml::Value) -> Result<(), String> {
    match (interface, version) {
        (OIDC_CLIENT_INTERFACE, SchemaVersion::V1) => parse::<OidcClient>(value).map(drop),
        (INGRESS_INTERFACE, SchemaVersion::V1) => parse::<IngressRoute>(value).map(drop),
        (INGRESS_INTERFACE, SchemaVersion::V2) => {
            let route = parse::<IngressRoute>(value)?;
            match route.namespace.as_deref() {
                Some(ns) if !ns.is_empty() => Ok(()),
                _ => Err("missing field `namespace`".to_string()),
            }
        }
        _ => Err(format!("interface {} has no {} schema", interface, version)),
    }
}

fn parse<T: DeserializeOwned>(value: &serde_yaml::Value) -> Result<T, String> {
    serde_yaml::from_value(value.clone()).map_err(|e| e.to_string())
}

/// Parse a `_supported_versions` entry.
///
/// Unknown version names are skipped so a newer peer can still negotiate
/// down to a version both sides know.
pub fn parse_supported_versions(raw: &str) -> Result<Vec<SchemaVersion>, String> {
    let listed: Vec<String> = serde_yaml::from_str(raw)
        .map_err(|e| format!("malformed {}: {}", SUPPORTED_VERSIONS_KEY, e))?;
    let mut versions: Vec<SchemaVersion> = listed.iter().filter_map(|v| v.parse().ok()).collect();
    versions.sort();
    versions.dedup();
    Ok(versions)
}

/// Encode our supported versions for the envelope.
pub fn encode_supported_versions(versions: &[SchemaVersion]) -> String {
    // Serializing a list of plain strings cannot fail.
    serde_yaml::to_string(&versions.iter().map(|v| v.to_string()).collect::<Vec<_>>())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn oidc_client_requires_secret() {
        let value = yaml("id: id\nname: name\nredirectURIs: [uri1]\n");
        let err = validate(OIDC_CLIENT_INTERFACE, SchemaVersion::V1, &value).unwrap_err();
        assert!(err.contains("secret"), "{}", err);
    }

    #[test]
    fn oidc_client_ignores_extra_fields() {
        let value = yaml("id: id\nname: name\nredirectURIs: [uri1]\nsecret: s\npublic: true\n");
        assert!(validate(OIDC_CLIENT_INTERFACE, SchemaVersion::V1, &value).is_ok());
    }

    #[test]
    fn ingress_v1_requires_prefix() {
        let value = yaml("service: dex-auth\nport: 5556\n");
        let err = validate(INGRESS_INTERFACE, SchemaVersion::V1, &value).unwrap_err();
        assert!(err.contains("prefix"), "{}", err);
    }

    #[test]
    fn ingress_namespace_only_required_in_v2() {
        let value = yaml("service: dex-auth\nport: 5556\nprefix: /dex\n");
        assert!(validate(INGRESS_INTERFACE, SchemaVersion::V1, &value).is_ok());
        let err = validate(INGRESS_INTERFACE, SchemaVersion::V2, &value).unwrap_err();
        assert!(err.contains("namespace"));
    }

    #[test]
    fn unknown_interface_version_is_rejected() {
        let value = yaml("id: x\n");
        assert!(validate(OIDC_CLIENT_INTERFACE, SchemaVersion::V2, &value).is_err());
    }

    #[test]
    fn supported_versions_skip_unknown_names() {
        assert_eq!(
            parse_supported_versions("- v3\n- v2\n- v1\n").unwrap(),
            vec![SchemaVersion::V1, SchemaVersion::V2]
        );
        assert!(parse_supported_versions("v1: yes").is_err());
    }

    #[test]
    fn supported_versions_encode_as_yaml_list() {
        let encoded = encode_supported_versions(&[SchemaVersion::V1, SchemaVersion::V2]);
        assert_eq!(encoded, "- v1\n- v2\n");
    }
}
