//! Finalizer - one-shot callbacks fired when a handle is disposed
//!
//! Entries are filed under the target's address in a bucket table backed by
//! the heap's finalizer record arena. The target's `FINALIZER` flag caches
//! whether any entry exists, so the common case costs one bit test.
//!
//! Running finalizers unlinks every entry for the target before the first
//! callback runs. A callback may therefore register new finalizers (even on
//! the same target) without disturbing the drain.

use crate::allocator::{BucketEntry, BucketTable, CellId};
use crate::error::{Result, SgcError};
use crate::heap::Heap;
use crate::logging::GcEvent;
use crate::object::{Address, Handle};
use crate::runtime::Token;

/// Finalizer callback: receives the heap, the target and the registration token
pub type FinalizerFn = fn(&mut Heap, Handle, Token);

pub(crate) struct FinalizerEntry {
    target: Address,
    func: FinalizerFn,
    arg: Token,
    next: Option<CellId>,
}

impl BucketEntry for FinalizerEntry {
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
        self.func as usize == other.func as usize && self.arg == other.arg
    }
}

/// FinalizerRegistry - address-keyed finalizer table
pub struct FinalizerRegistry {
    table: BucketTable<FinalizerEntry>,
}

impl FinalizerRegistry {
    pub(crate) fn new(table: BucketTable<FinalizerEntry>) -> Self {
        Self { table }
    }

    /// Total registered entries
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn contains(&self, target: Handle) -> bool {
        self.table.contains_key(target.addr())
    }

    /// Entries registered for `target`
    pub fn count_for(&self, target: Handle) -> usize {
        self.table.count_key(target.addr())
    }

    pub fn stats(&self) -> crate::allocator::ArenaStats {
        self.table.stats()
    }

    /// Drop every entry for `target` without running it
    #[track_caller]
    pub(crate) fn discard(&mut self, target: Handle) -> usize {
        self.table.take_key(target.addr()).len()
    }
}

impl Heap {
    /// Attach `func(target, arg)` to run when `target` is disposed
    ///
    /// Nil targets are ignored. Registering an identical `(func, arg)` twice
    /// on the same target keeps one entry. Returns whether a new entry was
    /// added.
    #[track_caller]
    pub fn add_finalizer(
        &mut self,
        target: Option<Handle>,
        func: FinalizerFn,
        arg: Token,
    ) -> Result<bool> {
        let Some(target) = target else {
            return Ok(false);
        };

        if self.object(target)?.is_zombie() {
            return Err(SgcError::WrongKind {
                handle: target,
                expected: "live object",
                actual: "zombie".to_string(),
            });
        }

        let inserted = self.finalizers.table.insert_unique(FinalizerEntry {
            target: target.addr(),
            func,
            arg,
            next: None,
        })?;

        if inserted {
            self.object_mut(target)?.header.set_finalizer(true);
        }
        Ok(inserted)
    }

    /// Run and remove every finalizer attached to `target`
    ///
    /// Entries are unlinked and the `FINALIZER` flag cleared before any
    /// callback is invoked. A stale target is still passed to its callbacks.
    /// Returns the number of callbacks run.
    #[track_caller]
    pub fn run_finalizers(&mut self, target: Handle) -> usize {
        let entries = self.finalizers.table.take_key(target.addr());
        if let Some(object) = self.handles.get_mut(target.cell()) {
            object.header.set_finalizer(false);
        }

        let ran = entries.len();
        for entry in entries {
            (entry.func)(self, target, entry.arg);
        }

        if ran > 0 {
            self.stats.record_finalizers(ran);
            self.logger.log(GcEvent::FinalizersRun {
                target: target.addr(),
                count: ran,
            });
        }
        ran
    }

    /// Remove, without running, every finalizer registered with `arg`
    ///
    /// Targets left with no entries lose their `FINALIZER` flag. Returns the
    /// number of entries removed.
    #[track_caller]
    pub fn del_finalizers(&mut self, arg: Token) -> usize {
        let removed = self.finalizers.table.take_all(|entry| entry.arg == arg);

        for entry in &removed {
            if self.finalizers.table.contains_key(entry.target) {
                continue;
            }
            let target = Handle::from_addr(entry.target);
            if let Some(object) = self.handles.get_mut(target.cell()) {
                object.header.set_finalizer(false);
            }
        }

        if !removed.is_empty() {
            log::debug!("removed {} finalizers for token {:?}", removed.len(), arg);
        }
        removed.len()
    }

    /// Whether `target` currently has finalizers attached
    pub fn has_finalizers(&self, target: Handle) -> bool {
        self.handles
            .get(target.cell())
            .map_or(false, |object| object.header.flags().has_finalizer())
    }

    pub fn finalizers(&self) -> &FinalizerRegistry {
        &self.finalizers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    thread_local! {
        static FIRED: RefCell<Vec<(Handle, u64)>> = RefCell::new(Vec::new());
    }

    fn record(_heap: &mut Heap, target: Handle, arg: Token) {
        FIRED.with(|fired| fired.borrow_mut().push((target, arg.0)));
    }

    fn reregister(heap: &mut Heap, target: Handle, arg: Token) {
        record(heap, target, arg);
        heap.add_finalizer(Some(target), record, Token(arg.0 + 100))
            .unwrap();
    }

    fn fired() -> Vec<(Handle, u64)> {
        FIRED.with(|fired| fired.borrow_mut().drain(..).collect())
    }

    #[test]
    fn test_nil_target_is_ignored() {
        let mut heap = Heap::with_defaults();
        assert!(!heap.add_finalizer(None, record, Token(1)).unwrap());
        assert!(heap.finalizers().is_empty());
    }

    #[test]
    fn test_duplicate_registration_runs_once() {
        let mut heap = Heap::with_defaults();
        let p = heap.make_pair(None, None).unwrap();

        assert!(heap.add_finalizer(Some(p), record, Token(7)).unwrap());
        assert!(!heap.add_finalizer(Some(p), record, Token(7)).unwrap());
        assert!(heap.has_finalizers(p));

        assert_eq!(heap.run_finalizers(p), 1);
        assert!(!heap.has_finalizers(p));
        assert_eq!(fired(), vec![(p, 7)]);
        assert_eq!(heap.run_finalizers(p), 0);
    }

    #[test]
    fn test_callback_may_register_during_drain() {
        let mut heap = Heap::with_defaults();
        let p = heap.make_pair(None, None).unwrap();
        heap.add_finalizer(Some(p), reregister, Token(1)).unwrap();

        assert_eq!(heap.run_finalizers(p), 1);
        assert_eq!(fired(), vec![(p, 1)]);
        assert!(heap.has_finalizers(p));
        assert_eq!(heap.finalizers().count_for(p), 1);

        assert_eq!(heap.run_finalizers(p), 1);
        assert_eq!(fired(), vec![(p, 101)]);
    }

    #[test]
    fn test_del_finalizers_by_token() {
        let mut heap = Heap::with_defaults();
        let a = heap.make_pair(None, None).unwrap();
        let b = heap.make_pair(None, None).unwrap();
        heap.add_finalizer(Some(a), record, Token(1)).unwrap();
        heap.add_finalizer(Some(b), record, Token(1)).unwrap();
        heap.add_finalizer(Some(b), record, Token(2)).unwrap();

        assert_eq!(heap.del_finalizers(Token(1)), 2);
        assert!(!heap.has_finalizers(a));
        assert!(heap.has_finalizers(b));
        assert_eq!(heap.finalizers().len(), 1);
        assert!(fired().is_empty());
    }
}
