//! Typed identifiers shared across scheduler components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable query identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cluster node identifier, unique and stable for the process lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct WorkerId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plan fragment identifier within one query.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FragmentId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tenant-scoped slice of the cluster (a warehouse and one of its worker groups).
///
/// Used both to filter membership and to pick the round-robin cursor in
/// multi-tenant deployments.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ResourceScope {
    /// Warehouse the scope belongs to.
    pub warehouse_id: u64,
    /// Worker group inside the warehouse.
    pub group_id: u64,
}

impl ResourceScope {
    /// Always-present scope used by single-tenant deployments.
    pub const DEFAULT: ResourceScope = ResourceScope {
        warehouse_id: 0,
        group_id: 0,
    };

    pub const fn new(warehouse_id: u64, group_id: u64) -> Self {
        Self {
            warehouse_id,
            group_id,
        }
    }
}

impl Default for ResourceScope {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "warehouse={}/group={}", self.warehouse_id, self.group_id)
    }
}
