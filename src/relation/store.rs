//! Relation data storage.
//!
//! The orchestration platform owns relation data; this module only describes
//! the narrow surface the operator needs from it. Each relation has two
//! application bags: the remote application's (read-only for us) and ours.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// An application data bag.
pub type Bag = BTreeMap<String, String>;

/// One established relation on an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Relation {
    /// Endpoint name as declared in the capability set (e.g., "ingress").
    pub endpoint: String,
    /// Remote application name.
    pub remote_app: String,
}

impl Relation {
    pub fn new(endpoint: impl Into<String>, remote_app: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            remote_app: remote_app.into(),
        }
    }
}

/// Access to relation data bags.
pub trait RelationStore {
    /// All relations currently established on `endpoint`, ordered by remote app.
    fn relations(&self, endpoint: &str) -> Result<Vec<Relation>>;

    /// The remote application's bag.
    fn remote_data(&self, relation: &Relation) -> Result<Bag>;

    /// Our application's bag.
    fn local_data(&self, relation: &Relation) -> Result<Bag>;

    /// Merge `entries` into our application's bag.
    ///
    /// Returns whether anything changed.
    fn update_local_data(&mut self, relation: &Relation, entries: Bag) -> Result<bool>;
}

#[derive(Debug, Clone, Default)]
struct RelationEntry {
    remote: Bag,
    local: Bag,
}

/// In-memory relation store, used by one-shot dispatch tests and harnesses.
#[derive(Debug, Clone, Default)]
pub struct MemoryRelationStore {
    endpoints: BTreeMap<String, BTreeMap<String, RelationEntry>>,
}

impl MemoryRelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establish a relation with `remote_app` on `endpoint`.
    pub fn add_relation(&mut self, endpoint: &str, remote_app: &str) -> Relation {
        self.endpoints
            .entry(endpoint.to_string())
            .or_default()
            .entry(remote_app.to_string())
            .or_default();
        Relation::new(endpoint, remote_app)
    }

    /// Replace the remote application's bag.
    pub fn set_remote_data(&mut self, relation: &Relation, bag: Bag) {
        self.endpoints
            .entry(relation.endpoint.clone())
            .or_default()
            .entry(relation.remote_app.clone())
            .or_default()
            .remote = bag;
    }

    /// Tear the relation down, dropping both bags.
    pub fn remove_relation(&mut self, relation: &Relation) {
        if let Some(relations) = self.endpoints.get_mut(&relation.endpoint) {
            relations.remove(&relation.remote_app);
        }
    }

    fn entry(&self, relation: &Relation) -> Result<&RelationEntry> {
        self.endpoints
            .get(&relation.endpoint)
            .and_then(|relations| relations.get(&relation.remote_app))
            .ok_or_else(|| {
                Error::upstream(format!(
                    "relation {}:{} no longer exists",
                    relation.endpoint, relation.remote_app
                ))
            })
    }
}

impl RelationStore for MemoryRelationStore {
    fn relations(&self, endpoint: &str) -> Result<Vec<Relation>> {
        Ok(self
            .endpoints
            .get(endpoint)
            .map(|relations| {
                relations
                    .keys()
                    .map(|app| Relation::new(endpoint, app.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn remote_data(&self, relation: &Relation) -> Result<Bag> {
        Ok(self.entry(relation)?.remote.clone())
    }

    fn local_data(&self, relation: &Relation) -> Result<Bag> {
        Ok(self.entry(relation)?.local.clone())
    }

    fn update_local_data(&mut self, relation: &Relation, entries: Bag) -> Result<bool> {
        self.entry(relation)?;
        let local = &mut self
            .endpoints
            .entry(relation.endpoint.clone())
            .or_default()
            .entry(relation.remote_app.clone())
            .or_default()
            .local;
        Ok(merge(local, entries))
    }
}

/// File-backed relation store.
///
/// Layout: `<root>/<endpoint>/<remote-app>/{remote,local}.yaml`, each file a
/// flat YAML mapping of string keys to string values.
#[derive(Debug, Clone)]
pub struct FsRelationStore {
    root: PathBuf,
}

/// File holding the remote application's bag.
pub const REMOTE_BAG_FILE: &str = "remote.yaml";

/// File holding our application's bag.
pub const LOCAL_BAG_FILE: &str = "local.yaml";

impl FsRelationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn relation_dir(&self, relation: &Relation) -> PathBuf {
        self.root.join(&relation.endpoint).join(&relation.remote_app)
    }

    fn read_bag(path: &Path) -> Result<Bag> {
        match fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Ok(Bag::new()),
            Ok(content) => serde_yaml::from_str(&content).map_err(|e| {
                Error::upstream(format!("malformed relation bag {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Bag::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl RelationStore for FsRelationStore {
    fn relations(&self, endpoint: &str) -> Result<Vec<Relation>> {
        let dir = self.root.join(endpoint);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut relations = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(app) = entry.file_name().to_str() {
                relations.push(Relation::new(endpoint, app));
            }
        }
        relations.sort();
        Ok(relations)
    }

    fn remote_data(&self, relation: &Relation) -> Result<Bag> {
        Self::read_bag(&self.relation_dir(relation).join(REMOTE_BAG_FILE))
    }

    fn local_data(&self, relation: &Relation) -> Result<Bag> {
        Self::read_bag(&self.relation_dir(relation).join(LOCAL_BAG_FILE))
    }

    fn update_local_data(&mut self, relation: &Relation, entries: Bag) -> Result<bool> {
        let dir = self.relation_dir(relation);
        if !dir.is_dir() {
            return Err(Error::upstream(format!(
                "relation {}:{} no longer exists",
                relation.endpoint, relation.remote_app
            )));
        }

        let mut local = self.local_data(relation)?;
        if !merge(&mut local, entries) {
            return Ok(false);
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(serde_yaml::to_string(&local)?.as_bytes())?;
        tmp.persist(dir.join(LOCAL_BAG_FILE))
            .map_err(|e| Error::Io(e.error))?;
        Ok(true)
    }
}

fn merge(bag: &mut Bag, entries: Bag) -> bool {
    let mut changed = false;
    for (key, value) in entries {
        if bag.get(&key) != Some(&value) {
            bag.insert(key, value);
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(pairs: &[(&str, &str)]) -> Bag {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn memory_store_merges_local_data() {
        let mut store = MemoryRelationStore::new();
        let rel = store.add_relation("ingress", "istio-pilot");

        assert!(store.update_local_data(&rel, bag(&[("a", "1")])).unwrap());
        assert!(store.update_local_data(&rel, bag(&[("b", "2")])).unwrap());
        assert!(!store.update_local_data(&rel, bag(&[("a", "1")])).unwrap());

        assert_eq!(store.local_data(&rel).unwrap(), bag(&[("a", "1"), ("b", "2")]));
    }

    #[test]
    fn memory_store_forgets_removed_relations() {
        let mut store = MemoryRelationStore::new();
        let rel = store.add_relation("oidc-client", "gatekeeper");
        store.remove_relation(&rel);

        assert!(store.relations("oidc-client").unwrap().is_empty());
        assert!(store.remote_data(&rel).is_err());
    }

    #[test]
    fn fs_store_lists_relations_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("oidc-client/zeta")).unwrap();
        fs::create_dir_all(dir.path().join("oidc-client/alpha")).unwrap();
        fs::write(dir.path().join("oidc-client/stray.txt"), "").unwrap();

        let store = FsRelationStore::new(dir.path());
        let apps: Vec<_> = store
            .relations("oidc-client")
            .unwrap()
            .into_iter()
            .map(|r| r.remote_app)
            .collect();
        assert_eq!(apps, vec!["alpha", "zeta"]);
        assert!(store.relations("ingress").unwrap().is_empty());
    }

    #[test]
    fn fs_store_round_trips_local_bag() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("ingress/istio-pilot")).unwrap();
        let mut store = FsRelationStore::new(dir.path());
        let rel = Relation::new("ingress", "istio-pilot");

        assert!(store.update_local_data(&rel, bag(&[("data", "port: 5556\n")])).unwrap());
        assert!(!store.update_local_data(&rel, bag(&[("data", "port: 5556\n")])).unwrap());
        assert_eq!(store.local_data(&rel).unwrap(), bag(&[("data", "port: 5556\n")]));
    }

    #[test]
    fn fs_store_rejects_writes_to_missing_relation() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsRelationStore::new(dir.path());
        let rel = Relation::new("ingress", "gone");
        assert!(matches!(
            store.update_local_data(&rel, bag(&[("a", "1")])),
            Err(Error::Upstream(_))
        ));
    }

    #[test]
    fn fs_store_reports_malformed_remote_bag() {
        let dir = tempfile::tempdir().unwrap();
        let rel_dir = dir.path().join("ingress/istio-pilot");
        fs::create_dir_all(&rel_dir).unwrap();
        fs::write(rel_dir.join(REMOTE_BAG_FILE), "- not\n- a mapping\n").unwrap();

        let store = FsRelationStore::new(dir.path());
        let err = store.remote_data(&Relation::new("ingress", "istio-pilot")).unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }
}
