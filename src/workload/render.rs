//! Dex configuration rendering.
//!
//! Field order in the output follows struct declaration order, so the bytes
//! are a pure function of [`Settings`].

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::relation::OidcClient;
use crate::settings::{Connector, Settings};

/// Rendered configuration file, ready to push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    bytes: Vec<u8>,
}

impl Artifact {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex sha256 of the bytes.
    pub fn hash(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytes))
    }
}

#[derive(Serialize)]
struct DexConfig<'a> {
    issuer: &'a str,
    storage: Storage,
    web: Listener,
    logger: Logger,
    oauth2: OAuth2,
    #[serde(rename = "staticClients")]
    static_clients: &'a [OidcClient],
    connectors: &'a [Connector],
    #[serde(rename = "enablePasswordDB")]
    enable_password_db: bool,
    #[serde(rename = "staticPasswords")]
    static_passwords: Vec<StaticPassword<'a>>,
    telemetry: Listener,
}

#[derive(Serialize)]
struct Storage {
    #[serde(rename = "type")]
    kind: &'static str,
    config: StorageConfig,
}

#[derive(Serialize)]
struct StorageConfig {
    #[serde(rename = "inCluster")]
    in_cluster: bool,
}

#[derive(Serialize)]
struct Listener {
    http: String,
}

#[derive(Serialize)]
struct Logger {
    level: &'static str,
    format: &'static str,
}

#[derive(Serialize)]
struct OAuth2 {
    #[serde(rename = "skipApprovalScreen")]
    skip_approval_screen: bool,
}

#[derive(Serialize)]
struct StaticPassword<'a> {
    email: &'a str,
    hash: &'a str,
    username: &'a str,
    #[serde(rename = "userID")]
    user_id: &'a str,
}

/// Serialize `settings` into Dex's YAML configuration.
pub fn render(settings: &Settings) -> Result<Artifact> {
    let config = DexConfig {
        issuer: &settings.issuer_url,
        storage: Storage {
            kind: "kubernetes",
            config: StorageConfig { in_cluster: true },
        },
        web: Listener {
            http: format!("0.0.0.0:{}", settings.port),
        },
        logger: Logger {
            level: "debug",
            format: "text",
        },
        oauth2: OAuth2 {
            skip_approval_screen: true,
        },
        static_clients: &settings.static_clients,
        connectors: &settings.connectors,
        enable_password_db: settings.enable_password_db,
        static_passwords: settings
            .static_login
            .iter()
            .map(|login| StaticPassword {
                email: &login.email,
                hash: &login.hash,
                username: &login.username,
                user_id: &login.user_id,
            })
            .collect(),
        telemetry: Listener {
            http: format!("0.0.0.0:{}", settings.telemetry_port),
        },
    };

    Ok(Artifact {
        bytes: serde_yaml::to_string(&config)?.into_bytes(),
    })
}
