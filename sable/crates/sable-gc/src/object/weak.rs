//! Weak Notifiers - callbacks fired once when a watched address goes away
//!
//! A notifier is a weak reference: it never keeps its target alive. Entries
//! are keyed by raw [`Address`] rather than by handle, so a subsystem can
//! watch any address it hands out. When the address belongs to a live handle,
//! registering also sets the watched bit on the handle's arena cell; the
//! collector, out-of-band disposal and plain deallocation all check that bit
//! and drain the notifiers exactly once.
//!
//! Use Cases:
//! - Caches keyed by object identity
//! - Native wrappers that must drop their side of a binding
//! - Subsystem shutdown (bulk removal by context)

use crate::allocator::{ArenaStats, BucketEntry, BucketTable, CellId};
use crate::error::Result;
use crate::heap::Heap;
use crate::logging::GcEvent;
use crate::object::{Address, Handle};
use crate::runtime::Token;

/// Notifier callback: receives the heap, the watched address and the context
pub type NotifyFn = fn(&mut Heap, Address, Token);

pub(crate) struct NotifierEntry {
    target: Address,
    callback: NotifyFn,
    context: Token,
    next: Option<CellId>,
}

impl BucketEntry for NotifierEntry {
    fn key(&self) -> Address {
        self.target
    }

    fn next(&self) -> Option<CellId> {
        self.next
    }

    fn set_next(&mut self, next: Option<CellId>) {
        self.next = next;
    }

    fn same_as(&self, other: &Self) -> bool {
        self.callback as usize == other.callback as usize && self.context == other.context
    }
}

/// NotifierRegistry - address-keyed weak notifier table
pub struct NotifierRegistry {
    table: BucketTable<NotifierEntry>,
}

impl NotifierRegistry {
    pub(crate) fn new(table: BucketTable<NotifierEntry>) -> Self {
        Self { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Whether any notifier watches `target`
    pub fn watches(&self, target: Address) -> bool {
        self.table.contains_key(target)
    }

    /// Notifiers registered with `context`, across all targets
    pub fn count_with_context(&self, context: Token) -> usize {
        self.table
            .iter()
            .filter(|entry| entry.context == context)
            .count()
    }

    pub fn stats(&self) -> ArenaStats {
        self.table.stats()
    }
}

impl Heap {
    /// Call `callback(target, context)` once when `target` is reclaimed
    ///
    /// Identical `(callback, context)` pairs on one target are kept once.
    /// Returns whether a new entry was added.
    #[track_caller]
    pub fn add_notifier(
        &mut self,
        target: Address,
        callback: NotifyFn,
        context: Token,
    ) -> Result<bool> {
        let inserted = self.notifiers.table.insert_unique(NotifierEntry {
            target,
            callback,
            context,
            next: None,
        })?;

        self.handles
            .set_watched(Handle::from_addr(target).cell(), true);
        Ok(inserted)
    }

    /// Run and remove every notifier watching `target`
    ///
    /// Drains the bucket before invoking anything. Returns the number of
    /// callbacks run.
    #[track_caller]
    pub fn run_notifiers(&mut self, target: Address) -> usize {
        let entries = self.notifiers.table.take_key(target);
        self.handles
            .set_watched(Handle::from_addr(target).cell(), false);

        let ran = entries.len();
        for entry in entries {
            (entry.callback)(self, target, entry.context);
        }

        if ran > 0 {
            self.stats.record_notifiers(ran);
            self.logger.log(GcEvent::NotifiersRun { target, count: ran });
        }
        ran
    }

    /// Remove, without running, every notifier registered with `context`
    #[track_caller]
    pub fn del_notifiers_with_context(&mut self, context: Token) -> usize {
        let removed = self
            .notifiers
            .table
            .take_all(|entry| entry.context == context);

        for entry in &removed {
            if !self.notifiers.table.contains_key(entry.target) {
                self.handles
                    .set_watched(Handle::from_addr(entry.target).cell(), false);
            }
        }

        if !removed.is_empty() {
            log::debug!(
                "removed {} notifiers for context {:?}",
                removed.len(),
                context
            );
        }
        removed.len()
    }

    /// Remove, without running, every notifier watching `target`
    #[track_caller]
    pub fn del_notifiers_for_target(&mut self, target: Address) -> usize {
        let removed = self.notifiers.table.take_key(target).len();
        self.handles
            .set_watched(Handle::from_addr(target).cell(), false);
        removed
    }

    /// Whether the cell behind `handle` carries the watched bit
    pub fn is_watched(&self, handle: Handle) -> bool {
        self.handles.is_watched(handle.cell())
    }

    pub fn notifiers(&self) -> &NotifierRegistry {
        &self.notifiers
    }
}
