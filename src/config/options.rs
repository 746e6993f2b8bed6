//! Charm options as set by the deployment's operator.
//!
//! Keys use the platform's kebab-case spelling. Only syntactic checks happen
//! here; semantic checks (conflicting options, connector shape) belong to the
//! settings assembler so they surface as a Blocked status.

use serde::{Deserialize, Serialize};

/// Default Dex HTTP port.
pub const DEFAULT_PORT: u16 = 5556;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CharmOptions {
    /// Enable Dex's local password database.
    pub enable_password_db: bool,

    /// Canonical issuer URL; derived from the unit identity when empty.
    pub issuer_url: String,

    /// Port Dex listens on.
    pub port: u16,

    /// YAML-encoded list of Dex connectors.
    pub connectors: String,

    pub static_username: String,

    pub static_password: String,

    /// Deprecated alias of `issuer-url`.
    pub public_url: String,
}

impl Default for CharmOptions {
    fn default() -> Self {
        Self {
            enable_password_db: true,
            issuer_url: String::new(),
            port: DEFAULT_PORT,
            connectors: String::new(),
            static_username: String::new(),
            static_password: String::new(),
            public_url: String::new(),
        }
    }
}

impl CharmOptions {
    /// Parse options from their YAML representation.
    ///
    /// An empty document yields the defaults.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }
}
