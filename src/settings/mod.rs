//! Configuration assembly.
//!
//! # Data Flow
//! ```text
//! CharmOptions (options file)  ─┐
//! Record<OidcClient> (relations) ├─→ assemble() ─→ Settings
//! UnitConfig + StoredState      ─┘
//! ```
//!
//! # Design Decisions
//! - Pure function: no I/O, same inputs always give the same Settings
//! - Conflicting options are surfaced, never silently resolved
//! - Connector order is kept as written (Dex lists login options in that
//!   order); client order is normalised by id

pub mod credentials;

use serde::Serialize;
use url::Url;

use crate::config::{CharmOptions, UnitConfig};
use crate::error::{Error, Result};
use crate::relation::observability::TELEMETRY_PORT;
use crate::relation::{OidcClient, Record};

pub use credentials::StoredState;

/// Canonical settings consumed by the workload renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    /// Canonical URL OIDC clients use to refer to Dex.
    pub issuer_url: String,
    pub port: u16,
    pub telemetry_port: u16,
    pub enable_password_db: bool,
    pub static_login: Option<StaticLogin>,
    pub connectors: Vec<Connector>,
    pub static_clients: Vec<OidcClient>,
    /// Namespace Dex stores its state in.
    pub namespace: String,
}

/// A static password entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticLogin {
    pub email: String,
    pub username: String,
    /// bcrypt hash; the plain password never leaves the assembler.
    pub hash: String,
    pub user_id: String,
}

/// One Dex connector definition, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Connector(serde_yaml::Mapping);

impl Connector {
    pub fn id(&self) -> &str {
        self.field("id").unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.field("type").unwrap_or_default()
    }

    fn field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }
}

/// Inbound relation records the assembler depends on.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    pub oidc_clients: Vec<Record<OidcClient>>,
}

/// Merge options, relation records and unit state into [`Settings`].
pub fn assemble(
    options: &CharmOptions,
    inputs: &Inputs,
    unit: &UnitConfig,
    state: &StoredState,
) -> Result<Settings> {
    if options.port == 0 {
        return Err(Error::validation("option `port` must be between 1 and 65535"));
    }

    let issuer_url = issuer_url(options, unit)?;
    let static_login = static_login(options, state)?;
    let connectors = parse_connectors(&options.connectors)?;
    let static_clients = static_clients(&inputs.oidc_clients)?;

    Ok(Settings {
        issuer_url,
        port: options.port,
        telemetry_port: TELEMETRY_PORT,
        enable_password_db: options.enable_password_db,
        static_login,
        connectors,
        static_clients,
        namespace: unit.model_name.clone(),
    })
}

/// Issuer URL derived from the unit's in-cluster DNS name.
pub fn default_issuer_url(unit: &UnitConfig, port: u16) -> String {
    format!("http://{}.{}.svc:{}/dex", unit.app_name, unit.model_name, port)
}

fn issuer_url(options: &CharmOptions, unit: &UnitConfig) -> Result<String> {
    let issuer = options.issuer_url.trim();
    let public = options.public_url.trim();

    match (issuer.is_empty(), public.is_empty()) {
        (false, false) => Err(Error::validation(
            "options `issuer-url` and `public-url` are both set; `public-url` is deprecated, unset it",
        )),
        (false, true) => check_issuer(issuer, "issuer-url"),
        (true, false) => {
            tracing::warn!("Option `public-url` is deprecated, use `issuer-url` instead");
            let base = if public.contains("://") {
                public.to_string()
            } else {
                format!("http://{}", public)
            };
            check_issuer(&format!("{}/dex", base.trim_end_matches('/')), "public-url")
        }
        (true, true) => Ok(default_issuer_url(unit, options.port)),
    }
}

fn check_issuer(raw: &str, option: &str) -> Result<String> {
    let url = Url::parse(raw)
        .map_err(|e| Error::validation(format!("option `{}` is not a valid URL: {}", option, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::validation(format!(
            "option `{}` must use http or https, got {}",
            option,
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(Error::validation(format!("option `{}` has no host", option)));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(Error::validation(format!(
            "option `{}` must not carry a query or fragment",
            option
        )));
    }

    Ok(raw.trim_end_matches('/').to_string())
}

fn static_login(options: &CharmOptions, state: &StoredState) -> Result<Option<StaticLogin>> {
    let username = options.static_username.trim();
    let password = options.static_password.as_str();

    match (username.is_empty(), password.is_empty()) {
        (true, true) if options.enable_password_db => Ok(Some(StaticLogin {
            email: state.username.clone(),
            username: state.username.clone(),
            hash: state.password_hash.clone(),
            user_id: state.user_id.to_string(),
        })),
        (true, true) => Ok(None),
        (false, true) => Err(Error::validation(
            "option `static-password` is required when `static-username` is set",
        )),
        (true, false) => Err(Error::validation(
            "option `static-username` is required when `static-password` is set",
        )),
        (false, false) if !options.enable_password_db => Err(Error::validation(
            "static credentials are set but `enable-password-db` is false",
        )),
        (false, false) => Ok(Some(StaticLogin {
            email: username.to_string(),
            username: username.to_string(),
            hash: state.hash_password(password)?,
            user_id: state.user_id.to_string(),
        })),
    }
}

/// Parse the `connectors` option.
///
/// Empty text, YAML `null` and `[]` all mean "no connectors".
pub fn parse_connectors(raw: &str) -> Result<Vec<Connector>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_yaml::Value = serde_yaml::from_str(raw).map_err(|e| {
        Error::validation(format!("option `connectors` is not valid YAML: {}", e))
    })?;

    let items = match value {
        serde_yaml::Value::Null => return Ok(Vec::new()),
        serde_yaml::Value::Sequence(items) => items,
        _ => {
            return Err(Error::validation(
                "option `connectors` must be a YAML list of connector definitions",
            ))
        }
    };

    let mut connectors: Vec<Connector> = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let serde_yaml::Value::Mapping(mapping) = item else {
            return Err(Error::validation(format!(
                "option `connectors`: entry {} is not a mapping",
                index
            )));
        };
        let connector = Connector(mapping);

        for key in ["type", "id", "name"] {
            if connector.field(key).map_or(true, |v| v.trim().is_empty()) {
                return Err(Error::validation(format!(
                    "option `connectors`: entry {} is missing `{}`",
                    index, key
                )));
            }
        }
        if connectors.iter().any(|c| c.id() == connector.id()) {
            return Err(Error::validation(format!(
                "option `connectors`: duplicate connector id {:?}",
                connector.id()
            )));
        }
        connectors.push(connector);
    }
    Ok(connectors)
}

fn static_clients(records: &[Record<OidcClient>]) -> Result<Vec<OidcClient>> {
    let mut sorted: Vec<&Record<OidcClient>> = records.iter().collect();
    sorted.sort_by(|a, b| a.payload.id.cmp(&b.payload.id));

    for pair in sorted.windows(2) {
        if pair[0].payload.id == pair[1].payload.id {
            return Err(Error::upstream(format!(
                "oidc-client: client id {:?} registered by both {} and {}",
                pair[0].payload.id, pair[0].remote_app, pair[1].remote_app
            )));
        }
    }

    Ok(sorted.into_iter().map(|r| r.payload.clone()).collect())
}
