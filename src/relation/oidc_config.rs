//! Sharing Dex's OIDC configuration with OIDC clients.
//!
//! This is the operator's own interface. The provider writes the issuer URL
//! into every related application's bag under `issuer-url`; requirers read it
//! back with [`read_oidc_config`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error;
use crate::relation::endpoints::DEX_OIDC_CONFIG;
use crate::relation::store::{Bag, RelationStore};

/// Bag key carrying the issuer URL.
pub const ISSUER_URL_KEY: &str = "issuer-url";

/// Dex's OIDC configuration as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DexOidcConfig {
    /// The canonical URL OIDC clients must use to refer to Dex.
    pub issuer_url: String,
}

#[derive(Debug, Error)]
pub enum OidcConfigError {
    #[error("Missing relation with a Dex OIDC config provider.")]
    RelationMissing,

    #[error("{0}")]
    DataMissing(String),

    #[error("relation {endpoint} is related to {count} applications, expected one")]
    TooManyRelations { endpoint: String, count: usize },

    #[error(transparent)]
    Store(#[from] Error),
}

/// Provider side: publish `issuer_url` on every `dex-oidc-config` relation.
///
/// Succeeds with zero writes when nothing is related. Returns the number of
/// bags that changed.
pub fn publish_oidc_config(store: &mut dyn RelationStore, issuer_url: &str) -> crate::error::Result<usize> {
    let mut changed = 0;
    for relation in store.relations(DEX_OIDC_CONFIG)? {
        let mut entries = Bag::new();
        entries.insert(ISSUER_URL_KEY.to_string(), issuer_url.to_string());
        if store.update_local_data(&relation, entries)? {
            changed += 1;
        }
    }
    Ok(changed)
}

/// Requirer side: read the provider's configuration from `endpoint`.
pub fn read_oidc_config(
    store: &dyn RelationStore,
    endpoint: &str,
) -> Result<DexOidcConfig, OidcConfigError> {
    let relations = store.relations(endpoint)?;
    let relation = match relations.as_slice() {
        [] => return Err(OidcConfigError::RelationMissing),
        [relation] => relation,
        _ => {
            return Err(OidcConfigError::TooManyRelations {
                endpoint: endpoint.to_string(),
                count: relations.len(),
            })
        }
    };

    let bag = store.remote_data(relation)?;
    if bag.is_empty() {
        return Err(OidcConfigError::DataMissing(format!(
            "No data found in relation {} data bag.",
            endpoint
        )));
    }

    let issuer_url = bag.get(ISSUER_URL_KEY).ok_or_else(|| {
        OidcConfigError::DataMissing(format!(
            "Missing attribute {} in relation {} data bag.",
            ISSUER_URL_KEY, endpoint
        ))
    })?;

    Ok(DexOidcConfig {
        issuer_url: issuer_url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::store::MemoryRelationStore;

    const REQUIRER_ENDPOINT: &str = "dex-oidc-config";

    #[test]
    fn provider_writes_issuer_to_every_relation() {
        let mut store = MemoryRelationStore::new();
        let a = store.add_relation(DEX_OIDC_CONFIG, "kubeflow-dashboard");
        let b = store.add_relation(DEX_OIDC_CONFIG, "oidc-gatekeeper");

        assert_eq!(publish_oidc_config(&mut store, "http://my-dex.io/dex").unwrap(), 2);
        assert_eq!(publish_oidc_config(&mut store, "http://my-dex.io/dex").unwrap(), 0);

        for rel in [a, b] {
            assert_eq!(
                store.local_data(&rel).unwrap()[ISSUER_URL_KEY],
                "http://my-dex.io/dex"
            );
        }
    }

    #[test]
    fn provider_without_relations_is_noop() {
        let mut store = MemoryRelationStore::new();
        assert_eq!(publish_oidc_config(&mut store, "http://my-dex.io/dex").unwrap(), 0);
    }

    #[test]
    fn requirer_reads_issuer() {
        let mut store = MemoryRelationStore::new();
        let rel = store.add_relation(REQUIRER_ENDPOINT, "dex-auth");
        let mut bag = Bag::new();
        bag.insert(ISSUER_URL_KEY.to_string(), "http://my-dex.io/dex".to_string());
        store.set_remote_data(&rel, bag);

        let config = read_oidc_config(&store, REQUIRER_ENDPOINT).unwrap();
        assert_eq!(config.issuer_url, "http://my-dex.io/dex");
    }

    #[test]
    fn requirer_without_relation() {
        let store = MemoryRelationStore::new();
        assert!(matches!(
            read_oidc_config(&store, REQUIRER_ENDPOINT),
            Err(OidcConfigError::RelationMissing)
        ));
    }

    #[test]
    fn requirer_with_empty_bag() {
        let mut store = MemoryRelationStore::new();
        store.add_relation(REQUIRER_ENDPOINT, "dex-auth");
        assert!(matches!(
            read_oidc_config(&store, REQUIRER_ENDPOINT),
            Err(OidcConfigError::DataMissing(_))
        ));
    }

    #[test]
    fn requirer_with_wrong_key() {
        let mut store = MemoryRelationStore::new();
        let rel = store.add_relation(REQUIRER_ENDPOINT, "dex-auth");
        let mut bag = Bag::new();
        bag.insert("issuer_url".to_string(), "http://my-dex.io/dex".to_string());
        store.set_remote_data(&rel, bag);

        let err = read_oidc_config(&store, REQUIRER_ENDPOINT).unwrap_err();
        assert!(err.to_string().contains(ISSUER_URL_KEY));
    }

    #[test]
    fn requirer_with_two_providers() {
        let mut store = MemoryRelationStore::new();
        store.add_relation(REQUIRER_ENDPOINT, "dex-a");
        store.add_relation(REQUIRER_ENDPOINT, "dex-b");
        assert!(matches!(
            read_oidc_config(&store, REQUIRER_ENDPOINT),
            Err(OidcConfigError::TooManyRelations { count: 2, .. })
        ));
    }
}
