//! In-memory workload.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::workload::{Layer, Service, Workload, WorkloadState};

/// Workload that keeps files and service states in maps.
#[derive(Debug, Clone)]
pub struct MemoryWorkload {
    reachable: bool,
    files: HashMap<String, Vec<u8>>,
    plan: BTreeMap<String, Service>,
    states: HashMap<String, Vec<WorkloadState>>,
    restarts: usize,
}

impl MemoryWorkload {
    pub fn new() -> Self {
        Self {
            reachable: true,
            files: HashMap::new(),
            plan: BTreeMap::new(),
            states: HashMap::new(),
            restarts: 0,
        }
    }

    /// A workload whose agent never answers.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }

    pub fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    /// Number of restarts performed so far.
    pub fn restarts(&self) -> usize {
        self.restarts
    }

    /// Every state `service` has been in, oldest first.
    pub fn transitions(&self, service: &str) -> Vec<WorkloadState> {
        self.states.get(service).cloned().unwrap_or_default()
    }

    pub fn plan(&self) -> &BTreeMap<String, Service> {
        &self.plan
    }

    /// Simulate the service dying.
    pub fn stop(&mut self, service: &str) {
        self.states
            .entry(service.to_string())
            .or_default()
            .push(WorkloadState::Stopped);
    }

    fn connected(&self) -> Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(Error::not_ready("workload is not reachable"))
        }
    }
}

impl Default for MemoryWorkload {
    fn default() -> Self {
        Self::new()
    }
}

impl Workload for MemoryWorkload {
    fn can_connect(&self) -> bool {
        self.reachable
    }

    fn pull(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.connected()?;
        Ok(self.files.get(path).cloned())
    }

    fn push(&mut self, path: &str, content: &[u8]) -> Result<()> {
        self.connected()?;
        self.files.insert(path.to_string(), content.to_vec());
        Ok(())
    }

    fn add_layer(&mut self, layer: &Layer) -> Result<()> {
        self.connected()?;
        for (name, service) in &layer.services {
            self.plan.insert(name.clone(), service.clone());
        }
        Ok(())
    }

    fn service(&self, service: &str) -> Result<Option<Service>> {
        self.connected()?;
        Ok(self.plan.get(service).cloned())
    }

    fn restart(&mut self, service: &str) -> Result<()> {
        self.connected()?;
        if !self.plan.contains_key(service) {
            return Err(Error::upstream(format!("service {} is not in the plan", service)));
        }

        let history = self.states.entry(service.to_string()).or_default();
        if history.last() == Some(&WorkloadState::Running) {
            history.push(WorkloadState::Restarting);
        } else {
            history.push(WorkloadState::Starting);
        }
        history.push(WorkloadState::Running);
        self.restarts += 1;
        Ok(())
    }

    fn state(&self, service: &str) -> WorkloadState {
        self.states
            .get(service)
            .and_then(|h| h.last().copied())
            .unwrap_or(WorkloadState::Stopped)
    }
}
