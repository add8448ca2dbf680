//! Per-query worker provider and its capture factory.
//!
//! Responsibilities:
//! - turn a registry listing into the query's usable worker pools
//!   (capped/rotated compute-node window, data-node pool);
//! - hand out workers by explicit id or round robin;
//! - remember every worker handed out to the query;
//! - raise diagnosable errors when no eligible worker exists.
//!
//! A provider is owned by exactly one query. Only the round-robin cursors are
//! shared between providers.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use pdq_common::metrics::global_metrics;
use pdq_common::{PdqError, ResourceScope, Result, SchedulingPolicy, WorkerId};
use tracing::{debug, warn};

use crate::availability::{AvailabilitySnapshot, RegistryListing, rotated_window};
use crate::cursor::RoundRobinCursors;
use crate::registry::WorkerRegistry;
use crate::worker::{Worker, WorkerKind};

const DATA_NODE_NOT_FOUND: &str =
    "Backend node not found. Check if any backend node is down.backend: ";
const COMPUTE_NODE_NOT_FOUND: &str =
    "Compute node not found. Check if any compute node is down.compute node: ";

/// Builds worker providers from the live registry.
#[derive(Debug, Clone)]
pub struct WorkerProviderFactory {
    cursors: Arc<RoundRobinCursors>,
}

impl WorkerProviderFactory {
    pub fn new(cursors: Arc<RoundRobinCursors>) -> Self {
        Self { cursors }
    }

    pub fn cursors(&self) -> &Arc<RoundRobinCursors> {
        &self.cursors
    }

    /// Captures the workers usable by one query.
    ///
    /// - without compute-node preference the data-node pool is used as is and
    ///   `num_used_compute_nodes` is ignored;
    /// - with preference the compute-node pool is reduced to a window of
    ///   `min(|C|, num_used_compute_nodes)` nodes (all of them when the cap is
    ///   `<= 0`), rotated by one read of the scope's compute-node cursor;
    /// - `policy` decides whether data nodes follow the window in
    ///   [`WorkerProvider::get_all_available_nodes`].
    ///
    /// Never fails: an empty pool surfaces on selection.
    pub fn capture_available_workers(
        &self,
        registry: &dyn WorkerRegistry,
        prefer_compute_node: bool,
        num_used_compute_nodes: i32,
        policy: SchedulingPolicy,
        scope: ResourceScope,
    ) -> WorkerProvider {
        let listing = RegistryListing::read(registry);
        let mut snapshot = AvailabilitySnapshot::filter(&listing, scope);

        if prefer_compute_node && num_used_compute_nodes > 0 && !snapshot.compute_nodes.is_empty()
        {
            let start = self.cursors.next_compute_node_index(scope);
            snapshot.compute_nodes =
                rotated_window(&snapshot.compute_nodes, num_used_compute_nodes, start);
        }

        let metrics = global_metrics();
        metrics.set_available_workers(
            WorkerKind::DataNode.label(),
            snapshot.data_nodes.len() as u64,
        );
        metrics.set_available_workers(
            WorkerKind::ComputeNode.label(),
            snapshot.compute_nodes.len() as u64,
        );
        debug!(
            resource_scope = %scope,
            prefer_compute_node,
            num_used_compute_nodes,
            policy = %policy,
            registry_data_nodes = listing.data_nodes.len(),
            registry_compute_nodes = listing.compute_nodes.len(),
            available_data_nodes = snapshot.data_nodes.len(),
            available_compute_nodes = snapshot.compute_nodes.len(),
            operator = "WorkerProviderFactory",
            "captured available workers"
        );

        WorkerProvider::new(
            listing,
            snapshot,
            prefer_compute_node,
            policy,
            scope,
            Arc::clone(&self.cursors),
        )
    }
}

/// Worker pools and selection state for one query.
#[derive(Debug)]
pub struct WorkerProvider {
    listing: RegistryListing,
    snapshot: AvailabilitySnapshot,
    prefer_compute_node: bool,
    policy: SchedulingPolicy,
    scope: ResourceScope,
    /// The registry had compute nodes but no data nodes (shared-data layout).
    compute_only: bool,
    cursors: Arc<RoundRobinCursors>,
    selected: BTreeSet<WorkerId>,
}

impl WorkerProvider {
    pub fn new(
        listing: RegistryListing,
        snapshot: AvailabilitySnapshot,
        prefer_compute_node: bool,
        policy: SchedulingPolicy,
        scope: ResourceScope,
        cursors: Arc<RoundRobinCursors>,
    ) -> Self {
        let compute_only = listing.data_nodes.is_empty() && !listing.compute_nodes.is_empty();
        Self {
            listing,
            snapshot,
            prefer_compute_node,
            policy,
            scope,
            compute_only,
            cursors,
            selected: BTreeSet::new(),
        }
    }

    pub fn prefer_compute_node(&self) -> bool {
        self.prefer_compute_node
    }

    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    pub fn scope(&self) -> ResourceScope {
        self.scope
    }

    pub fn snapshot(&self) -> &AvailabilitySnapshot {
        &self.snapshot
    }

    /// Marks `id` as used by this query.
    ///
    /// Without compute-node preference only data nodes are eligible; with it,
    /// any node of the snapshot is.
    pub fn select_worker(&mut self, id: WorkerId) -> Result<()> {
        let kind = match self.eligible_kind(id) {
            Some(kind) => kind,
            None => {
                let err = PdqError::NonRecoverable(format!(
                    "worker {id} is not available for scheduling in {}",
                    self.scope
                ));
                warn!(
                    worker_id = %id,
                    resource_scope = %self.scope,
                    prefer_compute_node = self.prefer_compute_node,
                    operator = "WorkerProvider",
                    "explicitly requested worker is unavailable"
                );
                global_metrics().inc_selection_failures(err.kind_label());
                return Err(err);
            }
        };
        self.selected.insert(id);
        global_metrics().inc_worker_selections("explicit", kind.label(), 1);
        Ok(())
    }

    /// Round-robin pick from the target pool.
    ///
    /// The target is the compute-node pool when compute nodes are preferred and
    /// the pool is non-empty, otherwise the data-node pool. The cursor advances
    /// even when the pool turns out to be empty.
    pub fn select_next_worker(&mut self) -> Result<WorkerId> {
        let kind = self.round_robin_kind();
        let index = match kind {
            WorkerKind::ComputeNode => self.cursors.next_compute_node_index(self.scope),
            WorkerKind::DataNode => self.cursors.next_data_node_index(),
        };
        let pool = self.snapshot.pool(kind);
        let Some(worker) = (!pool.is_empty())
            .then(|| pool.values().nth(index % pool.len()))
            .flatten()
        else {
            return Err(self.not_found_error(kind));
        };
        let id = worker.id;
        self.selected.insert(id);
        global_metrics().inc_worker_selections("round_robin", kind.label(), 1);
        Ok(id)
    }

    /// Every compute node of the pool, or nothing when compute nodes are not
    /// preferred. Does not touch the cursors.
    pub fn select_all_compute_nodes(&mut self) -> Vec<WorkerId> {
        if !self.prefer_compute_node {
            return Vec::new();
        }
        let ids = self
            .snapshot
            .compute_nodes
            .keys()
            .copied()
            .collect::<Vec<_>>();
        self.selected.extend(ids.iter().copied());
        global_metrics().inc_worker_selections(
            "all_compute_nodes",
            WorkerKind::ComputeNode.label(),
            ids.len() as u64,
        );
        ids
    }

    /// Standby failover hook; no backup worker is ever offered.
    pub fn select_backup_worker(&self, _id: WorkerId) -> Option<WorkerId> {
        None
    }

    pub fn allow_using_backup_node(&self) -> bool {
        false
    }

    /// Advisory lookup across both pools; never changes selection state.
    pub fn get_worker_by_id(&self, id: WorkerId) -> Option<&Worker> {
        self.snapshot.get(id)
    }

    /// Advisory data-node lookup.
    pub fn get_backend(&self, id: WorkerId) -> Option<&Worker> {
        self.snapshot.data_nodes.get(&id)
    }

    pub fn is_data_node_available(&self, id: WorkerId) -> bool {
        self.snapshot.contains(id)
    }

    /// Compute-node pool when it is non-empty, otherwise the data-node pool.
    ///
    /// NOTE: deliberately ignores `prefer_compute_node`; callers relying on
    /// the preference must use [`Self::get_all_available_nodes`].
    pub fn get_all_workers(&self) -> Vec<&Worker> {
        if self.snapshot.compute_nodes.is_empty() {
            self.snapshot.data_nodes.values().collect()
        } else {
            self.snapshot.compute_nodes.values().collect()
        }
    }

    /// Ids of the usable pool in policy order: the compute-node window first,
    /// followed by data nodes under [`SchedulingPolicy::AllNodes`].
    pub fn get_all_available_nodes(&self) -> Vec<WorkerId> {
        let compute = self.snapshot.compute_nodes.keys().copied();
        let data = self.snapshot.data_nodes.keys().copied();
        if !self.prefer_compute_node {
            return if self.compute_only {
                compute.collect()
            } else {
                data.collect()
            };
        }
        match self.policy {
            SchedulingPolicy::AllNodes => compute.chain(data).collect(),
            SchedulingPolicy::ComputeNodesOnly if self.snapshot.compute_nodes.is_empty() => {
                data.collect()
            }
            SchedulingPolicy::ComputeNodesOnly => compute.collect(),
        }
    }

    /// Raises the "node not found" error for callers that detect
    /// unavailability outside the selection path.
    pub fn report_data_node_not_found(&self) -> Result<()> {
        Err(self.not_found_error(self.diagnostic_kind()))
    }

    pub fn selected_worker_ids(&self) -> &BTreeSet<WorkerId> {
        &self.selected
    }

    pub fn is_worker_selected(&self, id: WorkerId) -> bool {
        self.selected.contains(&id)
    }

    fn eligible_kind(&self, id: WorkerId) -> Option<WorkerKind> {
        if self.prefer_compute_node || self.compute_only {
            self.snapshot.get(id).map(|w| w.kind)
        } else {
            self.snapshot.data_nodes.get(&id).map(|w| w.kind)
        }
    }

    fn round_robin_kind(&self) -> WorkerKind {
        let prefer_compute =
            self.prefer_compute_node && !self.snapshot.compute_nodes.is_empty();
        if prefer_compute || self.compute_only {
            WorkerKind::ComputeNode
        } else {
            WorkerKind::DataNode
        }
    }

    fn diagnostic_kind(&self) -> WorkerKind {
        if self.compute_only {
            WorkerKind::ComputeNode
        } else {
            WorkerKind::DataNode
        }
    }

    /// Lists every registry node of `kind` (ascending id) with its health.
    fn not_found_error(&self, kind: WorkerKind) -> PdqError {
        let prefix = match kind {
            WorkerKind::DataNode => DATA_NODE_NOT_FOUND,
            WorkerKind::ComputeNode => COMPUTE_NODE_NOT_FOUND,
        };
        let nodes = self
            .listing
            .pool(kind)
            .values()
            .map(Worker::health_summary)
            .collect::<String>();
        warn!(
            kind = %kind,
            resource_scope = %self.scope,
            registry_nodes = self.listing.pool(kind).len(),
            operator = "WorkerProvider",
            "no eligible worker available"
        );
        let err = PdqError::Scheduler(format!("{prefix}{nodes}"));
        global_metrics().inc_selection_failures(err.kind_label());
        err
    }
}

impl fmt::Display for WorkerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let selected = self
            .selected
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        write!(
            f,
            "WorkerProvider(scope={}, policy={}, prefer_compute_node={}, data_nodes={}, compute_nodes={}, selected=[{}])",
            self.scope,
            self.policy,
            self.prefer_compute_node,
            self.snapshot.data_nodes.len(),
            self.snapshot.compute_nodes.len(),
            selected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdq_common::RunMode;

    fn provider(prefer_compute_node: bool) -> WorkerProvider {
        let listing = RegistryListing::from_workers([
            Worker::data_node(0, "host#0", 80),
            Worker::data_node(1, "host#1", 80).with_alive(false),
            Worker::compute_node(10, "host#10", 80),
        ]);
        let snapshot = AvailabilitySnapshot::filter(&listing, ResourceScope::DEFAULT);
        WorkerProvider::new(
            listing,
            snapshot,
            prefer_compute_node,
            SchedulingPolicy::ComputeNodesOnly,
            ResourceScope::DEFAULT,
            Arc::new(RoundRobinCursors::new(RunMode::SharedNothing)),
        )
    }

    #[test]
    fn compute_node_is_not_explicitly_selectable_without_preference() {
        let mut p = provider(false);
        let err = p.select_worker(WorkerId(10)).expect_err("compute node");
        assert!(err.is_non_recoverable());
        p.select_worker(WorkerId(0)).expect("data node");
        assert!(p.is_worker_selected(WorkerId(0)));
    }

    #[test]
    fn backup_worker_hook_is_inert() {
        let p = provider(true);
        assert!(!p.allow_using_backup_node());
        assert_eq!(p.select_backup_worker(WorkerId(0)), None);
        assert_eq!(p.select_backup_worker(WorkerId(10)), None);
    }

    #[test]
    fn cursor_advances_even_when_selection_fails() {
        let listing = RegistryListing::from_workers([
            Worker::data_node(0, "host#0", 80).with_alive(false),
        ]);
        let snapshot = AvailabilitySnapshot::filter(&listing, ResourceScope::DEFAULT);
        let cursors = Arc::new(RoundRobinCursors::default());
        let mut p = WorkerProvider::new(
            listing,
            snapshot,
            false,
            SchedulingPolicy::ComputeNodesOnly,
            ResourceScope::DEFAULT,
            Arc::clone(&cursors),
        );
        assert!(p.select_next_worker().is_err());
        assert!(p.select_next_worker().is_err());
        assert_eq!(cursors.data_node_cursor().current(), 2);
        assert!(p.selected_worker_ids().is_empty());
    }

    #[test]
    fn display_summarises_pools_and_selection() {
        let mut p = provider(true);
        p.select_worker(WorkerId(10)).expect("select");
        let s = p.to_string();
        assert!(s.contains("policy=COMPUTE_NODES_ONLY"));
        assert!(s.contains("data_nodes=1"));
        assert!(s.contains("compute_nodes=1"));
        assert!(s.contains("selected=[10]"));
    }
}
