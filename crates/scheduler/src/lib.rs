//! Query-execution scheduling for distributed plan fragments.
//!
//! Architecture role:
//! - filters cluster membership into per-query worker pools
//! - hands out workers by explicit id or shared round robin
//! - decides per-fragment instance count and pipeline DOP
//!
//! Key modules:
//! - [`registry`]: membership seam and in-memory registry
//! - [`availability`]: liveness/deny-list/scope filtering
//! - [`cursor`]: shared round-robin cursors
//! - [`provider`]: per-query worker provider and its factory
//! - [`parallelism`]: pipeline DOP planning
//! - [`schedule`]: query-level fragment placement

pub mod availability;
pub mod cursor;
pub mod parallelism;
pub mod provider;
pub mod registry;
pub mod schedule;
pub mod worker;

pub use availability::{AvailabilitySnapshot, RegistryListing, WorkerMap};
pub use cursor::{RoundRobinCursor, RoundRobinCursors, ScopeCursorSource, WarehouseCursors};
pub use parallelism::{
    BackendResourceStat, FixedCores, FragmentShape, HardwareStats, JoinDistribution,
    OperatorShape, ParallelismPlan, ParallelismPlanner, SinkShape, TableSinkKind,
};
pub use provider::{WorkerProvider, WorkerProviderFactory};
pub use registry::{InMemoryWorkerRegistry, WorkerRegistry};
pub use schedule::{FragmentAssignment, FragmentRequest, Placement, QuerySchedule, QueryScheduler};
pub use worker::{Worker, WorkerKind};
