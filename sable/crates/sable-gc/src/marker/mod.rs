//! Marker Module - Reachability Passes
//!
//! Both tracing passes of a collection start from the same roots and walk
//! the graph through each object's [`Class::trace`](crate::object::Class::trace):
//!
//! - **Unflag** (step 3): every traced edge bumps the target's count and
//!   clears its garbage flag; a target is expanded only the first time, so
//!   cycles terminate.
//! - **Count** (step 6): counts start from zero and every traced edge adds
//!   one, giving the exact number of references from roots and reachable
//!   objects.
//!
//! Roots:
//! - every symbol handle in the symbol table, in table order
//! - every protected handle, in pin order
//!
//! The walk uses an explicit stack, so deep lists do not recurse.

pub mod roots;

pub use roots::ProtectedRoots;

use crate::assert_context;
use crate::heap::Heap;
use crate::object::Handle;

/// Which tracing pass is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPass {
    Unflag,
    Count,
}

/// Work done by one tracing pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MarkStats {
    /// Root references visited
    pub roots: usize,
    /// Distinct handles reached
    pub reached: usize,
    /// Edges traced between objects
    pub edges: usize,
}

impl Heap {
    /// Current roots: symbol handles, then protected handles
    pub(crate) fn root_handles(&self) -> Vec<Handle> {
        let mut roots: Vec<Handle> = self.symbols.handles().collect();
        roots.extend(self.roots.iter());
        roots
    }

    /// Run one tracing pass from `roots`
    pub(crate) fn mark_from(&mut self, roots: &[Handle], pass: MarkPass) -> MarkStats {
        let mut stats = MarkStats::default();
        let mut stack: Vec<Handle> = Vec::new();

        for &root in roots {
            stats.roots += 1;
            if self.visit(root, pass) {
                stats.reached += 1;
                stack.push(root);
            }
        }

        let mut children: Vec<Handle> = Vec::new();
        while let Some(handle) = stack.pop() {
            let Some(object) = self.handles.get(handle.cell()) else {
                continue;
            };
            let class = object.class.clone();

            children.clear();
            class.trace(self, handle, &mut |child| children.push(child));

            for &child in &children {
                stats.edges += 1;
                if self.visit(child, pass) {
                    stats.reached += 1;
                    stack.push(child);
                }
            }
        }

        stats
    }

    /// Record one edge into `handle`; true when it must be expanded
    ///
    /// Stale targets are skipped; they have no cell to count in.
    fn visit(&mut self, handle: Handle, pass: MarkPass) -> bool {
        let Some(object) = self.handles.get_mut(handle.cell()) else {
            log::trace!("skipping stale reference to {}", handle);
            return false;
        };
        match pass {
            MarkPass::Unflag => object.header.unflag(),
            MarkPass::Count => object.header.count_reference(),
        }
    }

    /// Recompute exact reference counts from the current roots
    ///
    /// Outside a collection this is the same pass `collect` runs as its
    /// sixth step; running it twice without mutation yields the same counts.
    pub fn recount(&mut self) -> MarkStats {
        assert_context!(
            self.state.is_idle(),
            "recount during collection ({:?})",
            self.state
        );
        self.reset_counts();
        let roots = self.root_handles();
        self.mark_from(&roots, MarkPass::Count)
    }

    /// Zero every live handle's count and transient flags
    pub(crate) fn reset_counts(&mut self) {
        for id in self.handles.live_ids() {
            if let Some(object) = self.handles.get_mut(id) {
                object.header.reset_for_count();
            }
        }
    }
}
