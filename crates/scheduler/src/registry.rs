//! Worker registry seam.
//!
//! The registry is owned by cluster-membership and failure-detector
//! collaborators. The scheduler only reads id-ordered listings from it; the
//! in-memory implementation here is what those collaborators (and tests) drive.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use pdq_common::{PdqError, ResourceScope, Result, WorkerId};
use tracing::debug;

use crate::worker::{Worker, WorkerKind};

/// Read-only view of cluster membership consumed by the scheduler.
///
/// Implementations must return workers in ascending id order with
/// `in_deny_list` materialised at listing time.
pub trait WorkerRegistry: Send + Sync {
    fn list_data_nodes(&self) -> Vec<Worker>;

    fn list_compute_nodes(&self) -> Vec<Worker>;
}

#[derive(Debug, Default)]
struct RegistryState {
    workers: BTreeMap<WorkerId, Worker>,
    deny_list: HashSet<WorkerId>,
}

/// Thread-safe in-process registry.
#[derive(Debug, Default)]
pub struct InMemoryWorkerRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryWorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_workers(workers: impl IntoIterator<Item = Worker>) -> Result<Self> {
        let registry = Self::new();
        for w in workers {
            registry.add_worker(w)?;
        }
        Ok(registry)
    }

    /// Registers a node. Ids are unique across both kinds.
    ///
    /// A worker arriving with `in_deny_list` set is registered deny-listed.
    pub fn add_worker(&self, mut worker: Worker) -> Result<()> {
        let mut state = self.write()?;
        if state.workers.contains_key(&worker.id) {
            return Err(PdqError::InvalidConfig(format!(
                "worker id {} already registered",
                worker.id
            )));
        }
        debug!(
            worker_id = %worker.id,
            kind = %worker.kind,
            host = %worker.host,
            operator = "WorkerRegistry",
            "worker registered"
        );
        if worker.in_deny_list {
            state.deny_list.insert(worker.id);
            worker.in_deny_list = false;
        }
        state.workers.insert(worker.id, worker);
        Ok(())
    }

    pub fn remove_worker(&self, id: WorkerId) -> Result<Option<Worker>> {
        let mut state = self.write()?;
        state.deny_list.remove(&id);
        Ok(state.workers.remove(&id))
    }

    pub fn set_alive(&self, id: WorkerId, alive: bool) -> Result<()> {
        self.update(id, |w| w.alive = alive)
    }

    pub fn set_scope(&self, id: WorkerId, scope: ResourceScope) -> Result<()> {
        self.update(id, |w| w.scope = scope)
    }

    pub fn add_to_deny_list(&self, id: WorkerId) -> Result<()> {
        self.write()?.deny_list.insert(id);
        Ok(())
    }

    pub fn remove_from_deny_list(&self, id: WorkerId) -> Result<()> {
        self.write()?.deny_list.remove(&id);
        Ok(())
    }

    pub fn is_in_deny_list(&self, id: WorkerId) -> bool {
        self.state
            .read()
            .expect("worker registry lock poisoned")
            .deny_list
            .contains(&id)
    }

    fn update(&self, id: WorkerId, f: impl FnOnce(&mut Worker)) -> Result<()> {
        let mut state = self.write()?;
        let worker = state
            .workers
            .get_mut(&id)
            .ok_or_else(|| PdqError::InvalidConfig(format!("unknown worker id {id}")))?;
        f(worker);
        Ok(())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, RegistryState>> {
        self.state
            .write()
            .map_err(|_| PdqError::InvalidConfig("worker registry lock poisoned".to_string()))
    }

    fn list_kind(&self, kind: WorkerKind) -> Vec<Worker> {
        let state = self.state.read().expect("worker registry lock poisoned");
        state
            .workers
            .values()
            .filter(|w| w.kind == kind)
            .map(|w| {
                let mut w = w.clone();
                w.in_deny_list = state.deny_list.contains(&w.id);
                w
            })
            .collect()
    }
}

impl WorkerRegistry for InMemoryWorkerRegistry {
    fn list_data_nodes(&self) -> Vec<Worker> {
        self.list_kind(WorkerKind::DataNode)
    }

    fn list_compute_nodes(&self) -> Vec<Worker> {
        self.list_kind(WorkerKind::ComputeNode)
    }
}
