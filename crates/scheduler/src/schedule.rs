//! Query-level fragment scheduling.
//!
//! Builds one [`WorkerProvider`] per query from the session, decides each
//! fragment's parallelism, and places fragment instances on workers.

use std::sync::Arc;

use pdq_common::{
    FragmentId, QueryId, ResourceScope, Result, SchedulerConfig, SessionVariables, WorkerId,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cursor::RoundRobinCursors;
use crate::parallelism::{FragmentShape, HardwareStats, ParallelismPlan, ParallelismPlanner};
use crate::provider::{WorkerProvider, WorkerProviderFactory};
use crate::registry::WorkerRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// How a fragment's workers are chosen.
pub enum Placement {
    /// Workers named by the plan (e.g. replica locations). Every id must be
    /// eligible.
    Explicit(Vec<WorkerId>),
    /// `workers` round-robin picks; repeated picks of one worker collapse.
    RoundRobin { workers: u32 },
    /// Every compute node of the query's pool, falling back to one
    /// round-robin pick when there is none.
    AllComputeNodes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One fragment to schedule.
pub struct FragmentRequest {
    pub shape: FragmentShape,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Placement and parallelism decided for one fragment.
pub struct FragmentAssignment {
    pub fragment_id: FragmentId,
    pub parallelism: ParallelismPlan,
    /// Distinct workers, in pick order. Each hosts
    /// `parallelism.parallel_exec_instance_num` instances.
    pub workers: Vec<WorkerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Scheduling result for one query.
pub struct QuerySchedule {
    pub query_id: QueryId,
    pub fragments: Vec<FragmentAssignment>,
    /// Every worker the query uses, ascending.
    pub selected_workers: Vec<WorkerId>,
}

/// Entry point used by plan finalization.
#[derive(Clone)]
pub struct QueryScheduler {
    registry: Arc<dyn WorkerRegistry>,
    hardware: Arc<dyn HardwareStats>,
    factory: WorkerProviderFactory,
    planner: ParallelismPlanner,
}

impl QueryScheduler {
    pub fn new(
        config: &SchedulerConfig,
        registry: Arc<dyn WorkerRegistry>,
        hardware: Arc<dyn HardwareStats>,
    ) -> Result<Self> {
        let cursors = Arc::new(RoundRobinCursors::new(config.run_mode));
        Self::with_cursors(config, registry, hardware, cursors)
    }

    /// Same as [`Self::new`] with an externally owned cursor service.
    pub fn with_cursors(
        config: &SchedulerConfig,
        registry: Arc<dyn WorkerRegistry>,
        hardware: Arc<dyn HardwareStats>,
        cursors: Arc<RoundRobinCursors>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            hardware,
            factory: WorkerProviderFactory::new(cursors),
            planner: ParallelismPlanner::new(config.sink_dop_divisors),
        })
    }

    /// Captures a provider for one query according to `session`.
    pub fn capture_workers(
        &self,
        session: &SessionVariables,
        scope: ResourceScope,
    ) -> WorkerProvider {
        self.factory.capture_available_workers(
            self.registry.as_ref(),
            session.prefer_compute_node,
            session.num_used_compute_nodes,
            session.computation_fragment_scheduling_policy,
            scope,
        )
    }

    /// Schedules every fragment of a query against one fresh provider.
    ///
    /// The first failing placement aborts the whole attempt.
    pub fn schedule(
        &self,
        query_id: QueryId,
        session: &SessionVariables,
        scope: ResourceScope,
        fragments: &[FragmentRequest],
    ) -> Result<QuerySchedule> {
        session.validate()?;
        let mut provider = self.capture_workers(session, scope);
        let assignments = fragments
            .iter()
            .map(|f| self.assign_fragment(&mut provider, session, f))
            .collect::<Result<Vec<_>>>()?;

        let schedule = QuerySchedule {
            query_id,
            fragments: assignments,
            selected_workers: provider.selected_worker_ids().iter().copied().collect(),
        };
        info!(
            query_id = %query_id,
            resource_scope = %scope,
            fragments = schedule.fragments.len(),
            workers = schedule.selected_workers.len(),
            provider = %provider,
            operator = "QueryScheduler",
            "query scheduled"
        );
        Ok(schedule)
    }

    fn assign_fragment(
        &self,
        provider: &mut WorkerProvider,
        session: &SessionVariables,
        request: &FragmentRequest,
    ) -> Result<FragmentAssignment> {
        let parallelism = self
            .planner
            .plan(&request.shape, self.hardware.as_ref(), session);
        let workers = match &request.placement {
            Placement::Explicit(ids) => {
                for id in ids {
                    provider.select_worker(*id)?;
                }
                dedup_in_order(ids.iter().copied())
            }
            Placement::RoundRobin { workers } => {
                let picks = (0..(*workers).max(1))
                    .map(|_| provider.select_next_worker())
                    .collect::<Result<Vec<_>>>()?;
                dedup_in_order(picks)
            }
            Placement::AllComputeNodes => {
                let ids = provider.select_all_compute_nodes();
                if ids.is_empty() {
                    vec![provider.select_next_worker()?]
                } else {
                    ids
                }
            }
        };
        Ok(FragmentAssignment {
            fragment_id: request.shape.fragment_id,
            parallelism,
            workers,
        })
    }
}

fn dedup_in_order(ids: impl IntoIterator<Item = WorkerId>) -> Vec<WorkerId> {
    let mut out: Vec<WorkerId> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let ids = [3, 1, 3, 2, 1].map(WorkerId);
        assert_eq!(dedup_in_order(ids), [3, 1, 2].map(WorkerId).to_vec());
    }

    #[test]
    fn fragment_request_decodes_from_json() {
        use crate::parallelism::{OperatorShape, SinkShape, TableSinkKind};

        let raw = r#"{
            "shape": {
                "fragment_id": 4,
                "operators": ["olap_scan", {"join": "BUCKET_SHUFFLE"}],
                "sink": {"table": "insert"}
            },
            "placement": {"round_robin": {"workers": 3}}
        }"#;
        let req: FragmentRequest = serde_json::from_str(raw).expect("decode");
        assert_eq!(req.shape.fragment_id, FragmentId(4));
        assert_eq!(req.shape.operators[0], OperatorShape::OlapScan);
        assert_eq!(req.shape.sink, SinkShape::Table(TableSinkKind::Insert));
        assert_eq!(req.placement, Placement::RoundRobin { workers: 3 });
    }
}
