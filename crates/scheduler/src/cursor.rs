//! Shared round-robin cursors.
//!
//! Cursors are shared by every query scheduling in the process. Each call to
//! `next_*` observes a value no concurrent call observes; there is no other
//! ordering guarantee. Counters wrap to zero on overflow.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use pdq_common::{ResourceScope, RunMode};

/// One lock-free read-and-increment counter.
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    next: AtomicUsize,
}

impl RoundRobinCursor {
    pub fn new(start: usize) -> Self {
        Self {
            next: AtomicUsize::new(start),
        }
    }

    /// Returns the pre-increment value and advances by one.
    pub fn next_index(&self) -> usize {
        // fetch_add wraps on overflow.
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn current(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }

    /// Repositions the cursor.
    pub fn store(&self, value: usize) {
        self.next.store(value, Ordering::Relaxed);
    }
}

/// Source of per-resource-scope cursors in multi-tenant deployments.
///
/// This is the seam owned by the warehouse/resource manager.
pub trait ScopeCursorSource: Send + Sync + fmt::Debug {
    fn cursor_for(&self, scope: ResourceScope) -> Arc<RoundRobinCursor>;
}

/// Default scope cursor source: one lazily created cursor per scope.
#[derive(Debug, Default)]
pub struct WarehouseCursors {
    cursors: RwLock<HashMap<ResourceScope, Arc<RoundRobinCursor>>>,
}

impl WarehouseCursors {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScopeCursorSource for WarehouseCursors {
    fn cursor_for(&self, scope: ResourceScope) -> Arc<RoundRobinCursor> {
        if let Some(c) = self
            .cursors
            .read()
            .expect("scope cursor lock poisoned")
            .get(&scope)
        {
            return Arc::clone(c);
        }
        let mut cursors = self.cursors.write().expect("scope cursor lock poisoned");
        Arc::clone(cursors.entry(scope).or_default())
    }
}

/// Cursor service injected into worker providers.
///
/// Holds the process-wide compute-node and data-node cursors plus the
/// per-scope source used in shared-data mode.
#[derive(Debug)]
pub struct RoundRobinCursors {
    run_mode: RunMode,
    compute_nodes: RoundRobinCursor,
    data_nodes: RoundRobinCursor,
    scoped: Arc<dyn ScopeCursorSource>,
}

impl RoundRobinCursors {
    pub fn new(run_mode: RunMode) -> Self {
        Self::with_scope_source(run_mode, Arc::new(WarehouseCursors::new()))
    }

    pub fn with_scope_source(run_mode: RunMode, scoped: Arc<dyn ScopeCursorSource>) -> Self {
        Self {
            run_mode,
            compute_nodes: RoundRobinCursor::default(),
            data_nodes: RoundRobinCursor::default(),
            scoped,
        }
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    /// Next compute-node rotation value for `scope`.
    ///
    /// Uses the scope's cursor in multi-tenant mode, the global one otherwise.
    pub fn next_compute_node_index(&self, scope: ResourceScope) -> usize {
        if self.run_mode.is_multi_tenant() {
            self.scoped.cursor_for(scope).next_index()
        } else {
            self.compute_nodes.next_index()
        }
    }

    pub fn next_data_node_index(&self) -> usize {
        self.data_nodes.next_index()
    }

    /// Process-wide compute-node cursor (single-tenant family).
    pub fn global_compute_node_cursor(&self) -> &RoundRobinCursor {
        &self.compute_nodes
    }

    pub fn data_node_cursor(&self) -> &RoundRobinCursor {
        &self.data_nodes
    }

    pub fn scoped_compute_node_cursor(&self, scope: ResourceScope) -> Arc<RoundRobinCursor> {
        self.scoped.cursor_for(scope)
    }
}

impl Default for RoundRobinCursors {
    fn default() -> Self {
        Self::new(RunMode::SharedNothing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn shared_nothing_uses_global_cursor() {
        let cursors = RoundRobinCursors::new(RunMode::SharedNothing);
        let initial = cursors.global_compute_node_cursor().current();
        let got = cursors.next_compute_node_index(ResourceScope::new(3, 1));
        assert_eq!(got, initial);
        assert_eq!(cursors.global_compute_node_cursor().current(), initial + 1);
        assert_eq!(
            cursors
                .scoped_compute_node_cursor(ResourceScope::new(3, 1))
                .current(),
            0
        );
    }

    #[test]
    fn shared_data_uses_scope_cursor() {
        let cursors = RoundRobinCursors::new(RunMode::SharedData);
        let scope = ResourceScope::new(7, 0);
        cursors.scoped_compute_node_cursor(scope).store(5);

        assert_eq!(cursors.next_compute_node_index(scope), 5);
        assert_eq!(cursors.scoped_compute_node_cursor(scope).current(), 6);
        assert_eq!(cursors.global_compute_node_cursor().current(), 0);
        assert_eq!(cursors.next_compute_node_index(ResourceScope::DEFAULT), 0);
    }

    #[test]
    fn cursor_wraps_to_zero_on_overflow() {
        let c = RoundRobinCursor::new(usize::MAX);
        assert_eq!(c.next_index(), usize::MAX);
        assert_eq!(c.next_index(), 0);
        assert_eq!(c.next_index(), 1);
    }

    #[test]
    #[should_panic(expected = "scope cursor lock poisoned")]
    fn poisoned_scope_map_fails_loudly() {
        let source = Arc::new(WarehouseCursors::new());
        let poisoner = Arc::clone(&source);
        let _ = thread::spawn(move || {
            let _guard = poisoner.cursors.write().expect("lock");
            panic!("poison scope cursor map");
        })
        .join();
        source.cursor_for(ResourceScope::DEFAULT);
    }

    #[test]
    fn concurrent_callers_never_observe_the_same_value() {
        let cursors = Arc::new(RoundRobinCursors::new(RunMode::SharedData));
        let scope = ResourceScope::new(1, 1);
        let seen = thread::scope(|s| {
            let handles = (0..8)
                .map(|_| {
                    let cursors = Arc::clone(&cursors);
                    s.spawn(move || {
                        (0..1000)
                            .map(|_| cursors.next_compute_node_index(scope))
                            .collect::<Vec<_>>()
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .flat_map(|h| h.join().expect("join"))
                .collect::<Vec<_>>()
        });
        let unique = seen.iter().copied().collect::<HashSet<_>>();
        assert_eq!(unique.len(), 8000);
        assert_eq!(cursors.scoped_compute_node_cursor(scope).current(), 8000);
    }
}
