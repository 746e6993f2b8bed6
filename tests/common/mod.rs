//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::time::Duration;

use dex_auth_operator::config::schema::OperatorConfig;
use dex_auth_operator::relation::schema::{DATA_KEY, SUPPORTED_VERSIONS_KEY};
use dex_auth_operator::relation::{Bag, MemoryRelationStore};
use dex_auth_operator::workload::MemoryWorkload;
use dex_auth_operator::Reconciler;
use tempfile::TempDir;

pub const CONFIG_PATH: &str = "/etc/dex/config.docker.yaml";

/// A reconciler over in-memory relations and workload, with its options and
/// state files in a temporary directory.
pub struct Harness {
    pub dir: TempDir,
    pub reconciler: Reconciler<MemoryRelationStore, MemoryWorkload>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_leader(true)
    }

    pub fn with_leader(leader: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, leader);
        let reconciler = Reconciler::new(config, MemoryRelationStore::new(), MemoryWorkload::new());
        Self { dir, reconciler }
    }

    /// Replace the options file.
    pub fn set_options(&self, yaml: &str) {
        fs::write(&self.reconciler.config().paths.options_file, yaml).unwrap();
    }

    pub fn store(&mut self) -> &mut MemoryRelationStore {
        self.reconciler.store_mut()
    }

    pub fn workload(&self) -> &MemoryWorkload {
        self.reconciler.workload()
    }

    /// The rendered Dex config currently in the workload, parsed.
    pub fn rendered(&self) -> serde_yaml::Value {
        use dex_auth_operator::workload::Workload;
        let bytes = self.workload().pull(CONFIG_PATH).unwrap().expect("config pushed");
        serde_yaml::from_slice(&bytes).unwrap()
    }
}

pub fn test_config(dir: &TempDir, leader: bool) -> OperatorConfig {
    let mut config = OperatorConfig::default();
    config.unit.leader = leader;
    config.paths.options_file = dir.path().join("options.yaml");
    config.paths.relations_dir = dir.path().join("relations");
    config.paths.state_file = dir.path().join("state.json");
    config.reconcile.base_delay_ms = 10;
    config.reconcile.max_delay_ms = 50;
    config
}

/// An SDI-style application bag.
pub fn envelope(versions: &[&str], data: Option<&str>) -> Bag {
    let mut bag = Bag::new();
    let listed: String = versions.iter().map(|v| format!("- {}\n", v)).collect();
    bag.insert(SUPPORTED_VERSIONS_KEY.to_string(), listed);
    if let Some(data) = data {
        bag.insert(DATA_KEY.to_string(), data.to_string());
    }
    bag
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
