//! Pipeline parallelism planning.
//!
//! Turns average data-node hardware capacity, fragment shape, and session
//! knobs into a `(parallel_exec_instance_num, pipeline_dop)` pair per
//! fragment. Stateless apart from the configured sink divisors.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use pdq_common::metrics::global_metrics;
use pdq_common::{FragmentId, SchedulerConfig, SessionVariables, SinkDopDivisors, WorkerId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Cluster-wide hardware gauge, refreshed asynchronously by its owner.
pub trait HardwareStats: Send + Sync {
    /// Average hardware cores across data nodes, read as a snapshot.
    fn average_core_count(&self) -> u32;
}

/// Hardware stats pinned to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCores(pub u32);

impl HardwareStats for FixedCores {
    fn average_core_count(&self) -> u32 {
        self.0
    }
}

/// Per-data-node hardware core reports.
#[derive(Debug)]
pub struct BackendResourceStat {
    cores: RwLock<HashMap<WorkerId, u32>>,
    default_cores: u32,
}

impl BackendResourceStat {
    /// `default_cores` is reported while no node has published its cores.
    pub fn new(default_cores: u32) -> Self {
        Self {
            cores: RwLock::new(HashMap::new()),
            default_cores: default_cores.max(1),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.default_hardware_cores)
    }

    pub fn set_num_hardware_cores(&self, worker: WorkerId, cores: u32) {
        self.cores
            .write()
            .expect("hardware stats lock poisoned")
            .insert(worker, cores);
    }

    pub fn remove_worker(&self, worker: WorkerId) {
        self.cores
            .write()
            .expect("hardware stats lock poisoned")
            .remove(&worker);
    }

    pub fn reporting_workers(&self) -> usize {
        self.cores.read().expect("hardware stats lock poisoned").len()
    }
}

impl Default for BackendResourceStat {
    fn default() -> Self {
        Self::new(1)
    }
}

impl HardwareStats for BackendResourceStat {
    fn average_core_count(&self) -> u32 {
        let m = self.cores.read().expect("hardware stats lock poisoned");
        if m.is_empty() {
            return self.default_cores;
        }
        let total = m.values().map(|c| u64::from(*c)).sum::<u64>();
        let avg = total / m.len() as u64;
        u32::try_from(avg).unwrap_or(u32::MAX).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Join distribution strategies.
pub enum JoinDistribution {
    Broadcast,
    Shuffle,
    BucketShuffle,
    Colocate,
    Replicated,
}

impl fmt::Display for JoinDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinDistribution::Broadcast => "BROADCAST",
            JoinDistribution::Shuffle => "PARTITIONED",
            JoinDistribution::BucketShuffle => "BUCKET_SHUFFLE",
            JoinDistribution::Colocate => "COLOCATE",
            JoinDistribution::Replicated => "REPLICATED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Table-mutating sink kinds.
pub enum TableSinkKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Operators that matter to parallelism decisions.
pub enum OperatorShape {
    OlapScan,
    SchemaScan,
    MetaScan,
    Sort,
    TopN,
    Aggregate,
    Join(JoinDistribution),
    Exchange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Where a fragment sends its output.
pub enum SinkShape {
    /// Query result (including `INTO OUTFILE`).
    Result,
    /// Data stream to another fragment.
    Exchange,
    /// Table insert/update/delete.
    Table(TableSinkKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Operator shape of one plan fragment.
pub struct FragmentShape {
    pub fragment_id: FragmentId,
    pub operators: Vec<OperatorShape>,
    pub sink: SinkShape,
}

impl FragmentShape {
    pub fn new(fragment_id: u64, operators: Vec<OperatorShape>, sink: SinkShape) -> Self {
        Self {
            fragment_id: FragmentId(fragment_id),
            operators,
            sink,
        }
    }

    pub fn scan(fragment_id: u64) -> Self {
        Self::new(fragment_id, vec![OperatorShape::OlapScan], SinkShape::Exchange)
    }

    pub fn top_n(fragment_id: u64) -> Self {
        Self::new(
            fragment_id,
            vec![OperatorShape::OlapScan, OperatorShape::TopN],
            SinkShape::Exchange,
        )
    }

    pub fn join(fragment_id: u64, distribution: JoinDistribution) -> Self {
        Self::new(
            fragment_id,
            vec![
                OperatorShape::OlapScan,
                OperatorShape::Join(distribution),
            ],
            SinkShape::Exchange,
        )
    }

    pub fn table_sink(fragment_id: u64, kind: TableSinkKind) -> Self {
        Self::new(
            fragment_id,
            vec![OperatorShape::OlapScan],
            SinkShape::Table(kind),
        )
    }

    pub fn table_sink_kind(&self) -> Option<TableSinkKind> {
        match self.sink {
            SinkShape::Table(kind) => Some(kind),
            SinkShape::Result | SinkShape::Exchange => None,
        }
    }

    /// Coarse label for metrics/logs.
    pub fn kind_label(&self) -> &'static str {
        if self.table_sink_kind().is_some() {
            return "table_sink";
        }
        if self
            .operators
            .iter()
            .any(|op| matches!(op, OperatorShape::Join(_)))
        {
            "join"
        } else if self
            .operators
            .iter()
            .any(|op| matches!(op, OperatorShape::Sort | OperatorShape::TopN))
        {
            "sort"
        } else {
            "scan"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Parallelism decided for one fragment.
pub struct ParallelismPlan {
    /// Fragment instances per worker, >= 1.
    pub parallel_exec_instance_num: u32,
    /// Pipeline lanes per instance, >= 1.
    pub pipeline_dop: u32,
}

/// Per-fragment DOP decision function.
#[derive(Debug, Clone, Default)]
pub struct ParallelismPlanner {
    sink_dop_divisors: SinkDopDivisors,
}

impl ParallelismPlanner {
    pub fn new(sink_dop_divisors: SinkDopDivisors) -> Self {
        Self { sink_dop_divisors }
    }

    /// Decides `(parallel_exec_instance_num, pipeline_dop)` for `shape`.
    ///
    /// - pipeline engine off: `(instance_num, 1)`;
    /// - table sink, adaptive sink DOP off: `(1, instance_num)`;
    /// - table sink, adaptive sink DOP on: `(1, cores / K)` clamped;
    /// - otherwise: `(1, pipeline_dop)` when set, else `(1, cores / 2)` clamped.
    ///
    /// Clamping only applies for a positive `max_pipeline_dop`.
    pub fn plan(
        &self,
        shape: &FragmentShape,
        hardware: &dyn HardwareStats,
        session: &SessionVariables,
    ) -> ParallelismPlan {
        let instance_num = at_least_one(session.parallel_exec_instance_num);
        let plan = if !session.enable_pipeline_engine {
            ParallelismPlan {
                parallel_exec_instance_num: instance_num,
                pipeline_dop: 1,
            }
        } else {
            let cores = hardware.average_core_count();
            let pipeline_dop = match shape.table_sink_kind() {
                Some(_) if !session.enable_adaptive_sink_dop => instance_num,
                Some(kind) => clamp_dop(
                    floor_div(cores, self.sink_divisor(kind)),
                    session.max_pipeline_dop,
                ),
                None if session.pipeline_dop > 0 => at_least_one(session.pipeline_dop),
                None => clamp_dop(floor_div(cores, 2), session.max_pipeline_dop),
            };
            ParallelismPlan {
                parallel_exec_instance_num: 1,
                pipeline_dop,
            }
        };

        global_metrics().observe_pipeline_dop(shape.kind_label(), plan.pipeline_dop);
        debug!(
            fragment_id = %shape.fragment_id,
            fragment_kind = shape.kind_label(),
            parallel_exec_instance_num = plan.parallel_exec_instance_num,
            pipeline_dop = plan.pipeline_dop,
            operator = "ParallelismPlanner",
            "fragment parallelism decided"
        );
        plan
    }

    pub fn sink_divisor(&self, kind: TableSinkKind) -> u32 {
        let d = match kind {
            TableSinkKind::Insert => self.sink_dop_divisors.insert,
            TableSinkKind::Update => self.sink_dop_divisors.update,
            TableSinkKind::Delete => self.sink_dop_divisors.delete,
        };
        d.max(1)
    }
}

fn at_least_one(v: i32) -> u32 {
    v.max(1).unsigned_abs()
}

fn floor_div(cores: u32, divisor: u32) -> u32 {
    (cores / divisor.max(1)).max(1)
}

fn clamp_dop(dop: u32, max_pipeline_dop: i32) -> u32 {
    match u32::try_from(max_pipeline_dop) {
        Ok(max) if max > 0 && max < dop => max,
        _ => dop,
    }
}
