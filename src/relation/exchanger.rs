//! Publishes and consumes schema-validated relation payloads.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::relation::endpoints::{self, Endpoint, Envelope};
use crate::relation::schema::{
    self, encode_supported_versions, parse_supported_versions, SchemaVersion, DATA_KEY,
    SUPPORTED_VERSIONS_KEY,
};
use crate::relation::store::{Bag, RelationStore};

/// A validated payload received from one remote application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<T> {
    pub remote_app: String,
    pub version: SchemaVersion,
    pub payload: T,
}

/// Schema-aware view over a [`RelationStore`].
pub struct RelationExchanger<'a> {
    store: &'a mut dyn RelationStore,
}

impl<'a> RelationExchanger<'a> {
    pub fn new(store: &'a mut dyn RelationStore) -> Self {
        Self { store }
    }

    /// Underlying store, for plain-envelope integrations.
    pub fn store(&mut self) -> &mut dyn RelationStore {
        &mut *self.store
    }

    /// Highest version spoken by us and every related application.
    ///
    /// `Ok(None)` when the endpoint has no relations.
    pub fn negotiate(&self, endpoint: &str) -> Result<Option<SchemaVersion>> {
        let (_, ours) = versioned(endpoint)?;
        let relations = self.store.relations(endpoint)?;
        if relations.is_empty() {
            return Ok(None);
        }

        let mut common: Vec<SchemaVersion> = ours.to_vec();
        for relation in &relations {
            let bag = self.store.remote_data(relation)?;
            let raw = bag.get(SUPPORTED_VERSIONS_KEY).ok_or_else(|| {
                Error::not_ready(format!(
                    "{}: no versions listed by {}",
                    endpoint, relation.remote_app
                ))
            })?;
            let theirs = parse_supported_versions(raw).map_err(|e| {
                Error::upstream(format!("{}: {} from {}", endpoint, e, relation.remote_app))
            })?;

            common.retain(|v| theirs.contains(v));
            if common.is_empty() {
                return Err(Error::validation(format!(
                    "{}: no compatible versions with {} (we support {}, it supports {})",
                    endpoint,
                    relation.remote_app,
                    list(ours),
                    list(&theirs)
                )));
            }
        }

        Ok(common.iter().max().copied())
    }

    /// Validate `payload` against `version` and write it to every relation on
    /// `endpoint`.
    ///
    /// Nothing is written when validation fails. Returns the number of bags
    /// that changed.
    pub fn publish<T: Serialize>(
        &mut self,
        endpoint: &str,
        payload: &T,
        version: SchemaVersion,
    ) -> Result<usize> {
        let (declared, ours) = versioned(endpoint)?;
        if !ours.contains(&version) {
            return Err(Error::outbound_schema(
                endpoint,
                format!("version {} is not supported (we support {})", version, list(ours)),
            ));
        }

        let value = serde_yaml::to_value(payload)?;
        if let Err(reason) = schema::validate(declared.interface, version, &value) {
            metrics::record_schema_error(endpoint);
            return Err(Error::outbound_schema(
                endpoint,
                format!("refusing to publish {} payload: {}", version, reason),
            ));
        }
        let data = serde_yaml::to_string(&value)?;

        let mut changed = 0;
        for relation in self.store.relations(endpoint)? {
            let mut entries = Bag::new();
            entries.insert(SUPPORTED_VERSIONS_KEY.to_string(), encode_supported_versions(ours));
            entries.insert(DATA_KEY.to_string(), data.clone());
            if self.store.update_local_data(&relation, entries)? {
                tracing::debug!(
                    endpoint = %endpoint,
                    remote_app = %relation.remote_app,
                    version = %version,
                    "Published relation data"
                );
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Validated records from every related application that has published data.
    ///
    /// Applications that have not written `data` yet are skipped; that is a
    /// normal state, not an error.
    pub fn consume<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<Record<T>>> {
        let (declared, _) = versioned(endpoint)?;
        let Some(version) = self.negotiate(endpoint)? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for relation in self.store.relations(endpoint)? {
            let bag = self.store.remote_data(&relation)?;
            let Some(raw) = bag.get(DATA_KEY) else {
                tracing::debug!(
                    endpoint = %endpoint,
                    remote_app = %relation.remote_app,
                    "Remote application has not published data yet"
                );
                continue;
            };

            let payload = decode::<T>(declared, version, raw).map_err(|reason| {
                metrics::record_schema_error(endpoint);
                Error::inbound_schema(
                    endpoint,
                    format!("invalid data from {}: {}", relation.remote_app, reason),
                )
            })?;
            records.push(Record {
                remote_app: relation.remote_app,
                version,
                payload,
            });
        }
        Ok(records)
    }

    /// Write our supported versions to every relation on `endpoint` so the
    /// remote side can negotiate before we have anything to publish.
    pub fn advertise(&mut self, endpoint: &str) -> Result<()> {
        let (_, ours) = versioned(endpoint)?;
        for relation in self.store.relations(endpoint)? {
            let mut entries = Bag::new();
            entries.insert(SUPPORTED_VERSIONS_KEY.to_string(), encode_supported_versions(ours));
            self.store.update_local_data(&relation, entries)?;
        }
        Ok(())
    }
}

fn versioned(endpoint: &str) -> Result<(&'static Endpoint, &'static [SchemaVersion])> {
    let declared = endpoints::endpoint(endpoint)
        .ok_or_else(|| Error::validation(format!("unknown relation endpoint {:?}", endpoint)))?;
    match declared.envelope {
        Envelope::Versioned(versions) => Ok((declared, versions)),
        Envelope::Plain => Err(Error::validation(format!(
            "endpoint {} carries no versioned schema",
            endpoint
        ))),
    }
}

fn decode<T: DeserializeOwned>(declared: &Endpoint, version: SchemaVersion, raw: &str) -> std::result::Result<T, String> {
    let value: serde_yaml::Value = serde_yaml::from_str(raw).map_err(|e| e.to_string())?;
    schema::validate(declared.interface, version, &value)?;
    serde_yaml::from_value(value).map_err(|e| e.to_string())
}

fn list(versions: &[SchemaVersion]) -> String {
    let names: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
    format!("[{}]", names.join(", "))
}
