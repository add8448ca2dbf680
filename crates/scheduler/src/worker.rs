//! Cluster node model shared by registry, availability filter, and provider.

use std::fmt;

use pdq_common::{ResourceScope, WorkerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Node kinds known to the registry.
pub enum WorkerKind {
    /// Node with local persistent storage.
    DataNode,
    /// Storage-less, stateless executor.
    ComputeNode,
}

impl WorkerKind {
    /// Metrics/log label.
    pub fn label(&self) -> &'static str {
        match self {
            WorkerKind::DataNode => "data_node",
            WorkerKind::ComputeNode => "compute_node",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One cluster node as observed at listing time.
///
/// `alive` and `in_deny_list` are owned by external collaborators (failure
/// detector and deny-list); the scheduler only reads them.
pub struct Worker {
    pub id: WorkerId,
    pub kind: WorkerKind,
    pub host: String,
    pub port: u16,
    pub alive: bool,
    pub in_deny_list: bool,
    /// Resource scope this node is assigned to.
    pub scope: ResourceScope,
}

impl Worker {
    pub fn new(id: u64, kind: WorkerKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: WorkerId(id),
            kind,
            host: host.into(),
            port,
            alive: true,
            in_deny_list: false,
            scope: ResourceScope::DEFAULT,
        }
    }

    pub fn data_node(id: u64, host: impl Into<String>, port: u16) -> Self {
        Self::new(id, WorkerKind::DataNode, host, port)
    }

    pub fn compute_node(id: u64, host: impl Into<String>, port: u16) -> Self {
        Self::new(id, WorkerKind::ComputeNode, host, port)
    }

    pub fn with_scope(mut self, scope: ResourceScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_alive(mut self, alive: bool) -> Self {
        self.alive = alive;
        self
    }

    /// Live, not deny-listed, and assigned to `scope`.
    pub fn is_available_in(&self, scope: ResourceScope) -> bool {
        self.alive && !self.in_deny_list && self.scope == scope
    }

    /// Operator-facing health fragment used in "node not found" diagnostics.
    ///
    /// The trailing space is part of the format.
    pub fn health_summary(&self) -> String {
        format!(
            "[{} alive: {} inBlacklist: {}] ",
            self.host, self.alive, self.in_deny_list
        )
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}:{}", self.kind, self.id, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_summary_matches_diagnostic_format() {
        let w = Worker::data_node(2, "host#2", 80).with_alive(false);
        assert_eq!(w.health_summary(), "[host#2 alive: false inBlacklist: false] ");
    }

    #[test]
    fn availability_requires_live_allowed_and_same_scope() {
        let scope = ResourceScope::new(1, 0);
        let w = Worker::compute_node(10, "host#10", 80).with_scope(scope);
        assert!(w.is_available_in(scope));
        assert!(!w.is_available_in(ResourceScope::DEFAULT));

        let mut denied = w.clone();
        denied.in_deny_list = true;
        assert!(!denied.is_available_in(scope));
        assert!(!w.with_alive(false).is_available_in(scope));
    }
}
