//! Availability filter: registry listing -> per-attempt availability snapshot.

use std::collections::BTreeMap;

use pdq_common::{ResourceScope, WorkerId};

use crate::registry::WorkerRegistry;
use crate::worker::{Worker, WorkerKind};

/// Id-ordered id -> worker map.
pub type WorkerMap = BTreeMap<WorkerId, Worker>;

/// Every node the registry knew about at capture time, regardless of health.
///
/// Kept alongside the snapshot so "node not found" diagnostics can list the
/// whole population of a kind, not just the eligible members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryListing {
    pub data_nodes: WorkerMap,
    pub compute_nodes: WorkerMap,
}

impl RegistryListing {
    pub fn read(registry: &dyn WorkerRegistry) -> Self {
        Self {
            data_nodes: to_map(registry.list_data_nodes()),
            compute_nodes: to_map(registry.list_compute_nodes()),
        }
    }

    pub fn from_workers(workers: impl IntoIterator<Item = Worker>) -> Self {
        let mut listing = Self::default();
        for w in workers {
            listing.pool_mut(w.kind).insert(w.id, w);
        }
        listing
    }

    pub fn pool(&self, kind: WorkerKind) -> &WorkerMap {
        match kind {
            WorkerKind::DataNode => &self.data_nodes,
            WorkerKind::ComputeNode => &self.compute_nodes,
        }
    }

    fn pool_mut(&mut self, kind: WorkerKind) -> &mut WorkerMap {
        match kind {
            WorkerKind::DataNode => &mut self.data_nodes,
            WorkerKind::ComputeNode => &mut self.compute_nodes,
        }
    }
}

/// Live, non-denylisted, in-scope workers at construction time.
///
/// Staleness after construction is tolerated; members are not re-validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilitySnapshot {
    pub data_nodes: WorkerMap,
    pub compute_nodes: WorkerMap,
}

impl AvailabilitySnapshot {
    /// Filters `listing` by liveness, deny-list, and `scope` membership.
    pub fn filter(listing: &RegistryListing, scope: ResourceScope) -> Self {
        Self {
            data_nodes: filter_pool(&listing.data_nodes, scope),
            compute_nodes: filter_pool(&listing.compute_nodes, scope),
        }
    }

    pub fn from_workers(workers: impl IntoIterator<Item = Worker>) -> Self {
        let listing = RegistryListing::from_workers(workers);
        Self {
            data_nodes: listing.data_nodes,
            compute_nodes: listing.compute_nodes,
        }
    }

    pub fn pool(&self, kind: WorkerKind) -> &WorkerMap {
        match kind {
            WorkerKind::DataNode => &self.data_nodes,
            WorkerKind::ComputeNode => &self.compute_nodes,
        }
    }

    pub fn get(&self, id: WorkerId) -> Option<&Worker> {
        self.data_nodes
            .get(&id)
            .or_else(|| self.compute_nodes.get(&id))
    }

    pub fn contains(&self, id: WorkerId) -> bool {
        self.get(id).is_some()
    }
}

/// Contiguous window of `pool` starting at `start % len`, wrapping around.
///
/// `cap <= 0` (or a cap at least the pool size) keeps the whole pool.
pub fn rotated_window(pool: &WorkerMap, cap: i32, start: usize) -> WorkerMap {
    let len = pool.len();
    let Ok(cap) = usize::try_from(cap) else {
        return pool.clone();
    };
    if cap == 0 || cap >= len {
        return pool.clone();
    }
    let ordered = pool.values().collect::<Vec<_>>();
    (0..cap)
        .map(|i| {
            let w = ordered[(start % len + i) % len];
            (w.id, w.clone())
        })
        .collect()
}

fn to_map(workers: Vec<Worker>) -> WorkerMap {
    workers.into_iter().map(|w| (w.id, w)).collect()
}

fn filter_pool(pool: &WorkerMap, scope: ResourceScope) -> WorkerMap {
    pool.iter()
        .filter(|(_, w)| w.is_available_in(scope))
        .map(|(id, w)| (*id, w.clone()))
        .collect()
}
