#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use pdq_common::{ResourceScope, RunMode, SchedulingPolicy, WorkerId};
use pdq_scheduler::{
    AvailabilitySnapshot, InMemoryWorkerRegistry, RegistryListing, RoundRobinCursors, Worker,
    WorkerKind, WorkerMap, WorkerProvider,
};

/// Workers `start..end` of `kind`, hosts `host#<id>`, port 80. With
/// `half_dead`, even ids are dead.
pub fn gen_workers(start: u64, end: u64, kind: WorkerKind, half_dead: bool) -> Vec<Worker> {
    (start..end)
        .map(|i| {
            Worker::new(i, kind, format!("host#{i}"), 80).with_alive(!(half_dead && i % 2 == 0))
        })
        .collect()
}

pub fn to_map(workers: impl IntoIterator<Item = Worker>) -> WorkerMap {
    workers.into_iter().map(|w| (w.id, w)).collect::<BTreeMap<_, _>>()
}

pub fn pick(workers: &[Worker], ids: &[u64]) -> WorkerMap {
    to_map(
        workers
            .iter()
            .filter(|w| ids.contains(&w.id.0))
            .cloned(),
    )
}

pub fn ids(workers: &[WorkerId]) -> Vec<u64> {
    workers.iter().map(|id| id.0).collect()
}

/// Data nodes 0..10 and compute nodes 10..15, all alive.
pub struct Fixture {
    pub data_nodes: Vec<Worker>,
    pub compute_nodes: Vec<Worker>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            data_nodes: gen_workers(0, 10, WorkerKind::DataNode, false),
            compute_nodes: gen_workers(10, 15, WorkerKind::ComputeNode, false),
        }
    }

    pub fn listing(&self) -> RegistryListing {
        RegistryListing::from_workers(
            self.data_nodes
                .iter()
                .chain(self.compute_nodes.iter())
                .cloned(),
        )
    }

    pub fn available_data_nodes(&self) -> WorkerMap {
        pick(&self.data_nodes, &[0, 2, 3, 5, 7])
    }

    pub fn available_compute_nodes(&self) -> WorkerMap {
        pick(&self.compute_nodes, &[10, 12, 14])
    }

    pub fn registry(&self) -> InMemoryWorkerRegistry {
        InMemoryWorkerRegistry::from_workers(
            self.data_nodes
                .iter()
                .chain(self.compute_nodes.iter())
                .cloned(),
        )
        .expect("registry")
    }
}

pub fn provider(
    listing: RegistryListing,
    data_nodes: WorkerMap,
    compute_nodes: WorkerMap,
    prefer_compute_node: bool,
) -> WorkerProvider {
    provider_with_cursors(
        listing,
        data_nodes,
        compute_nodes,
        prefer_compute_node,
        Arc::new(RoundRobinCursors::new(RunMode::SharedNothing)),
    )
}

pub fn provider_with_cursors(
    listing: RegistryListing,
    data_nodes: WorkerMap,
    compute_nodes: WorkerMap,
    prefer_compute_node: bool,
    cursors: Arc<RoundRobinCursors>,
) -> WorkerProvider {
    WorkerProvider::new(
        listing,
        AvailabilitySnapshot {
            data_nodes,
            compute_nodes,
        },
        prefer_compute_node,
        SchedulingPolicy::ComputeNodesOnly,
        ResourceScope::DEFAULT,
        cursors,
    )
}

/// Asserts `id` was recorded as used by the provider's query.
pub fn assert_selected(p: &WorkerProvider, id: WorkerId) {
    assert!(p.is_worker_selected(id), "worker {id} not selected");
    assert!(p.selected_worker_ids().contains(&id));
}
