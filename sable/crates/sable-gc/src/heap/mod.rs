//! Heap Module - the single owning context
//!
//! A [`Heap`] owns every piece of collector state: the handle arena, the
//! finalizer and notifier record arenas, the protected roots, the symbol
//! table, statistics and the event log. Every boundary entry point is a
//! method on it; there are no process-wide singletons.
//!
//! ```text
//! ┌──────────────────────────── Heap ─────────────────────────────┐
//! │  handles: Arena<Object>      symbols: SymbolTable (roots)      │
//! │  finalizers: BucketTable     roots: ProtectedRoots (roots)     │
//! │  notifiers:  BucketTable     state / stats / logger / trace    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The heap is single-threaded (`!Send`): class hooks, finalizers and
//! notifiers receive `&mut Heap` and may call back into it, except that
//! starting another collection from inside one is fatal.

use crate::allocator::{AllocationTrace, Arena, ArenaStats, BucketTable};
use crate::assert_context;
use crate::config::HeapConfig;
use crate::error::{Result, SgcError};
use crate::fatal;
use crate::gc::GcState;
use crate::logging::{self, GcEvent, GcLogger};
use crate::marker::ProtectedRoots;
use crate::object::{
    Class, ClassDescriptor, ClassKind, Handle, MetaClass, NotifierRegistry, Object, ObjectFlags,
    PairClass, Payload, ZombieClass,
};
use crate::runtime::{FinalizerRegistry, InterruptGuard};
use crate::stats::GcStats;
use crate::symbol::{SymbolClass, SymbolTable};
use std::any::{type_name, Any};
use std::cmp::Ordering;
use std::path::Path;
use std::rc::Rc;

/// Heap - handles, registries and roots of one runtime
pub struct Heap {
    pub(crate) config: HeapConfig,
    pub(crate) handles: Arena<Object>,
    pub(crate) finalizers: FinalizerRegistry,
    pub(crate) notifiers: NotifierRegistry,
    pub(crate) roots: ProtectedRoots,
    pub(crate) symbols: SymbolTable,
    pub(crate) state: GcState,
    pub(crate) cycle: u64,
    pub(crate) stats: GcStats,
    pub(crate) logger: GcLogger,
    trace: AllocationTrace,
    pair_class: Rc<dyn Class>,
    pub(crate) zombie_class: Rc<dyn Class>,
    meta_class: Rc<dyn Class>,
    pub(crate) symbol_class: Rc<dyn Class>,
}

impl Heap {
    /// Create a heap from a validated configuration
    ///
    /// Opens the allocation trace when the configuration names one.
    pub fn new(config: HeapConfig) -> Result<Self> {
        config.validate()?;
        let trace_path = config.allocation_trace.clone();
        let heap = Self::build(config);
        if let Some(path) = trace_path {
            heap.trace.set_path(Some(&path))?;
        }
        Ok(heap)
    }

    /// Create a heap with the default configuration
    pub fn with_defaults() -> Self {
        Self::build(HeapConfig::default())
    }

    fn build(config: HeapConfig) -> Self {
        let trace = AllocationTrace::default();

        let mut logger_config = logging::default_config();
        logger_config.console |= config.verbose;

        let finalizers = FinalizerRegistry::new(BucketTable::new(
            "finalizers",
            config.record_chunk_cells,
            config.max_chunks,
            config.poison_on_free,
            trace.clone(),
        ));
        let notifiers = NotifierRegistry::new(BucketTable::new(
            "notifiers",
            config.record_chunk_cells,
            config.max_chunks,
            config.poison_on_free,
            trace.clone(),
        ));

        let handles = Arena::new(
            "handles",
            config.handle_chunk_cells,
            config.max_chunks,
            config.poison_on_free,
            trace.clone(),
        );

        log::debug!(
            "heap created: {} cells per handle chunk, poison={}",
            config.handle_chunk_cells,
            config.poison_on_free
        );

        Self {
            config,
            handles,
            finalizers,
            notifiers,
            roots: ProtectedRoots::new(),
            symbols: SymbolTable::default(),
            state: GcState::Idle,
            cycle: 0,
            stats: GcStats::new(),
            logger: GcLogger::new(logger_config),
            trace,
            pair_class: Rc::new(PairClass),
            zombie_class: Rc::new(ZombieClass),
            meta_class: Rc::new(MetaClass),
            symbol_class: Rc::new(SymbolClass),
        }
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    #[track_caller]
    fn allocate(&mut self, object: Object) -> Result<Handle> {
        let chunks = self.handles.chunk_count();

        match self.handles.allocate(object) {
            Ok(id) => {
                if self.handles.chunk_count() != chunks {
                    self.logger.log(GcEvent::ChunkGrown {
                        arena: self.handles.name(),
                        chunks: self.handles.chunk_count(),
                        capacity: self.handles.capacity(),
                    });
                }
                Ok(Handle::from_cell(id))
            },
            Err(e) => {
                if let SgcError::OutOfMemory { arena, cells } = &e {
                    self.logger.log(GcEvent::AllocationFailure {
                        arena: *arena,
                        cells: *cells,
                    });
                }
                Err(e)
            },
        }
    }

    /// Allocate a pair; `None` is nil
    #[track_caller]
    pub fn make_pair(&mut self, car: Option<Handle>, cdr: Option<Handle>) -> Result<Handle> {
        let class = Rc::clone(&self.pair_class);
        self.allocate(Object::new(class, Payload::Pair { car, cdr }))
    }

    /// Allocate an external object owning `value`
    #[track_caller]
    pub fn make_external<T: Any>(&mut self, class: Rc<dyn Class>, value: T) -> Result<Handle> {
        self.allocate(Object::new(class, Payload::External(Box::new(value))))
    }

    /// Allocate a class descriptor object for `class`
    ///
    /// Descriptors are the only objects a teardown keeps.
    #[track_caller]
    pub fn make_class(&mut self, class: Rc<dyn Class>) -> Result<Handle> {
        let meta = Rc::clone(&self.meta_class);
        self.make_external(meta, ClassDescriptor { class })
    }

    /// Return a handle's cell to the arena immediately
    ///
    /// Runs the handle's notifiers if it is watched and drops its
    /// finalizers unrun. Nothing is disposed; callers that own native
    /// resources should use [`Heap::dispose`] first.
    #[track_caller]
    pub fn deallocate(&mut self, handle: Handle) -> Result<()> {
        if !self.handles.contains(handle.cell()) {
            return Err(self.stale(handle));
        }
        self.reclaim(handle);
        Ok(())
    }

    #[track_caller]
    pub(crate) fn reclaim(&mut self, handle: Handle) {
        let (object, watched) = self.handles.deallocate(handle.cell());
        if object.header.flags().has_finalizer() {
            self.finalizers.discard(handle);
        }
        drop(object);

        if watched {
            self.run_notifiers(handle.addr());
        }
    }

    // ========================================================================
    // Zombification and disposal
    // ========================================================================

    /// Turn `handle` into a zombie in place
    ///
    /// The payload is dropped without calling the class's dispose hook, and
    /// finalizers still attached are discarded since their target no longer
    /// has anything to finalize. Idempotent; returns whether the handle
    /// changed.
    #[track_caller]
    pub fn zombify(&mut self, handle: Handle) -> Result<bool> {
        if self.object(handle)?.is_zombie() {
            return Ok(false);
        }
        if self.finalizers.discard(handle) > 0 {
            self.object_mut(handle)?.header.set_finalizer(false);
        }
        Ok(self.zombify_in_place(handle))
    }

    pub(crate) fn zombify_in_place(&mut self, handle: Handle) -> bool {
        let zombie = Rc::clone(&self.zombie_class);
        match self.handles.get_mut(handle.cell()) {
            Some(object) => object.zombify(&zombie),
            None => false,
        }
    }

    /// Dispose `handle` now, outside a collection
    ///
    /// Runs the destructor of a structured object, the class's dispose hook,
    /// then zombifies the handle and drains its finalizers and notifiers.
    /// Disposing a zombie is fatal.
    ///
    /// Pairs own nothing to dispose and are never zombified: disposing one
    /// only drains its finalizers and notifiers, it stays a pair, and
    /// disposing it again is allowed and finds nothing left to run.
    #[track_caller]
    pub fn dispose(&mut self, handle: Handle) -> Result<()> {
        let object = self.object(handle)?;
        if object.is_zombie() {
            fatal!("dispose of zombie {}", handle);
        }
        let class = Rc::clone(&object.class);

        let _interrupts = InterruptGuard::new(self.config.mask_interrupts);
        if class.kind() == ClassKind::Structured {
            class.destruct(self, handle);
        }
        self.release(handle, true);
        Ok(())
    }

    /// Dispose, zombify and drain one handle
    ///
    /// With `run_finalizers` false, finalizers are dropped unrun. Returns
    /// whether the handle was zombified.
    #[track_caller]
    pub(crate) fn release(&mut self, handle: Handle, run_finalizers: bool) -> bool {
        let Some(object) = self.handles.get(handle.cell()) else {
            return false;
        };
        let class = Rc::clone(&object.class);

        let mut zombified = false;
        if class.kind().is_disposable() {
            class.dispose(self, handle);
            zombified = self.zombify_in_place(handle);
        }

        if self.finalizers.contains(handle) {
            if run_finalizers {
                self.run_finalizers(handle);
            } else {
                self.finalizers.discard(handle);
                if let Some(object) = self.handles.get_mut(handle.cell()) {
                    object.header.set_finalizer(false);
                }
            }
        }

        if self.handles.is_watched(handle.cell()) {
            self.run_notifiers(handle.addr());
        }

        zombified
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub(crate) fn stale(&self, handle: Handle) -> SgcError {
        SgcError::StaleHandle {
            handle,
            freed_at: self.handles.freed_at(handle.cell()),
        }
    }

    pub(crate) fn object(&self, handle: Handle) -> Result<&Object> {
        self.handles
            .get(handle.cell())
            .ok_or_else(|| self.stale(handle))
    }

    pub(crate) fn object_mut(&mut self, handle: Handle) -> Result<&mut Object> {
        if !self.handles.contains(handle.cell()) {
            return Err(self.stale(handle));
        }
        match self.handles.get_mut(handle.cell()) {
            Some(object) => Ok(object),
            None => fatal!("handle {} vanished between checks", handle),
        }
    }

    fn wrong_kind(handle: Handle, expected: &'static str, object: &Object) -> SgcError {
        SgcError::WrongKind {
            handle,
            expected,
            actual: object.class.name().to_string(),
        }
    }

    /// Whether `handle` still names a live cell
    pub fn is_live(&self, handle: Handle) -> bool {
        self.handles.contains(handle.cell())
    }

    /// Whether `handle` is a zombie; a reclaimed handle answers as one
    pub fn is_zombie(&self, handle: Handle) -> bool {
        self.handles
            .get(handle.cell())
            .map_or(true, |object| object.is_zombie())
    }

    pub fn is_pair(&self, handle: Handle) -> bool {
        self.handles
            .get(handle.cell())
            .map_or(false, |object| matches!(object.payload, Payload::Pair { .. }))
    }

    /// Both fields of a live pair
    pub fn pair_fields(&self, handle: Handle) -> Option<(Option<Handle>, Option<Handle>)> {
        match self.handles.get(handle.cell())?.payload {
            Payload::Pair { car, cdr } => Some((car, cdr)),
            _ => None,
        }
    }

    pub fn car(&self, handle: Handle) -> Result<Option<Handle>> {
        let object = self.object(handle)?;
        match object.payload {
            Payload::Pair { car, .. } => Ok(car),
            _ => Err(Self::wrong_kind(handle, "pair", object)),
        }
    }

    pub fn cdr(&self, handle: Handle) -> Result<Option<Handle>> {
        let object = self.object(handle)?;
        match object.payload {
            Payload::Pair { cdr, .. } => Ok(cdr),
            _ => Err(Self::wrong_kind(handle, "pair", object)),
        }
    }

    pub fn set_car(&mut self, handle: Handle, value: Option<Handle>) -> Result<()> {
        let object = self.object_mut(handle)?;
        if let Payload::Pair { car, .. } = &mut object.payload {
            *car = value;
            return Ok(());
        }
        Err(Self::wrong_kind(handle, "pair", object))
    }

    pub fn set_cdr(&mut self, handle: Handle, value: Option<Handle>) -> Result<()> {
        let object = self.object_mut(handle)?;
        if let Payload::Pair { cdr, .. } = &mut object.payload {
            *cdr = value;
            return Ok(());
        }
        Err(Self::wrong_kind(handle, "pair", object))
    }

    /// Borrow the external payload of `handle` as a `T`
    pub fn external<T: Any>(&self, handle: Handle) -> Result<&T> {
        let object = self.object(handle)?;
        if let Payload::External(boxed) = &object.payload {
            if let Some(value) = boxed.downcast_ref::<T>() {
                return Ok(value);
            }
        }
        Err(Self::wrong_kind(handle, type_name::<T>(), object))
    }

    pub fn external_mut<T: Any>(&mut self, handle: Handle) -> Result<&mut T> {
        let object = self.object_mut(handle)?;
        if let Payload::External(boxed) = &mut object.payload {
            if let Some(value) = boxed.downcast_mut::<T>() {
                return Ok(value);
            }
        }
        Err(SgcError::WrongKind {
            handle,
            expected: type_name::<T>(),
            actual: object.class.name().to_string(),
        })
    }

    pub fn class_of(&self, handle: Handle) -> Result<Rc<dyn Class>> {
        Ok(Rc::clone(&self.object(handle)?.class))
    }

    /// Class name, `"zombie"` for reclaimed handles
    pub fn class_name(&self, handle: Handle) -> String {
        self.dispatch_class(handle).name().to_string()
    }

    pub fn kind_of(&self, handle: Handle) -> ClassKind {
        self.dispatch_class(handle).kind()
    }

    pub fn flags(&self, handle: Handle) -> Result<ObjectFlags> {
        Ok(self.object(handle)?.header.flags())
    }

    /// Reference count computed by the last collection or recount
    pub fn count(&self, handle: Handle) -> Result<u32> {
        Ok(self.object(handle)?.header.count())
    }

    // ========================================================================
    // Class dispatch
    // ========================================================================

    /// Class answering for `handle`; the zombie class once it is reclaimed
    fn dispatch_class(&self, handle: Handle) -> Rc<dyn Class> {
        match self.handles.get(handle.cell()) {
            Some(object) => Rc::clone(&object.class),
            None => Rc::clone(&self.zombie_class),
        }
    }

    pub fn display(&self, handle: Handle) -> String {
        self.dispatch_class(handle).display(self, handle)
    }

    pub fn eval(&mut self, handle: Handle) -> Result<Option<Handle>> {
        self.dispatch_class(handle).eval(self, handle)
    }

    pub fn apply(&mut self, handle: Handle, args: &[Option<Handle>]) -> Result<Option<Handle>> {
        self.dispatch_class(handle).apply(self, handle, args)
    }

    /// Order `a` against `b` using `a`'s class
    pub fn compare(&self, a: Handle, b: Handle) -> Ordering {
        self.dispatch_class(a).compare(self, a, b)
    }

    pub fn hash_of(&self, handle: Handle) -> u64 {
        self.dispatch_class(handle).hash(self, handle)
    }

    pub fn serialize(&self, handle: Handle) -> serde_json::Value {
        self.dispatch_class(handle).serialize(self, handle)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Every live handle, in arena order
    pub fn live_handles(&self) -> Vec<Handle> {
        self.handles
            .live_ids()
            .into_iter()
            .map(Handle::from_cell)
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.handles.live_count()
    }

    pub fn handle_arena_stats(&self) -> ArenaStats {
        self.handles.stats()
    }

    /// Stats of the handle, finalizer and notifier arenas
    pub fn arena_stats(&self) -> Vec<ArenaStats> {
        vec![
            self.handles.stats(),
            self.finalizers.stats(),
            self.notifiers.stats(),
        ]
    }

    pub fn gc_stats(&self) -> &GcStats {
        &self.stats
    }

    pub fn logger(&self) -> &GcLogger {
        &self.logger
    }

    pub fn gc_state(&self) -> GcState {
        self.state
    }

    /// Start appending raw allocate/free events to `path`, or stop with `None`
    pub fn set_allocation_trace(&mut self, path: Option<&Path>) -> Result<()> {
        self.trace.set_path(path)?;
        self.config.allocation_trace = path.map(Path::to_path_buf);
        Ok(())
    }

    pub fn flush_allocation_trace(&self) -> Result<()> {
        self.trace.flush()
    }

    /// Check heap invariants, aborting on the first violation
    ///
    /// Returns the number of handles checked.
    pub fn verify(&self) -> usize {
        assert_context!(
            self.state.is_idle(),
            "verify during collection ({:?})",
            self.state
        );
        self.audit("verify", false)
    }

    pub(crate) fn audit(&self, phase: &str, in_cycle: bool) -> usize {
        self.handles.verify_free_list();

        let mut checked = 0;
        for (id, object) in self.handles.iter() {
            let handle = Handle::from_cell(id);
            let flags = object.header.flags();

            assert_context!(
                !(object.is_zombie() && flags.has_finalizer()),
                "{}: zombie {} still carries finalizers",
                phase,
                handle
            );
            assert_context!(
                flags.has_finalizer() == self.finalizers.contains(handle),
                "{}: finalizer flag of {} disagrees with the registry",
                phase,
                handle
            );
            if !in_cycle {
                assert_context!(
                    !flags.is_garbage(),
                    "{}: {} still flagged as garbage",
                    phase,
                    handle
                );
                if let Payload::Pair { car, cdr } = object.payload {
                    for child in [car, cdr].into_iter().flatten() {
                        assert_context!(
                            self.handles.contains(child.cell()),
                            "{}: pair {} references reclaimed {}",
                            phase,
                            handle,
                            child
                        );
                    }
                }
            }
            checked += 1;
        }
        checked
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blob;

    impl Class for Blob {
        fn name(&self) -> &str {
            "blob"
        }
    }

    #[test]
    fn test_pair_accessors() {
        let mut heap = Heap::with_defaults();
        let a = heap.make_pair(None, None).unwrap();
        let p = heap.make_pair(Some(a), None).unwrap();

        assert!(heap.is_pair(p));
        assert_eq!(heap.car(p).unwrap(), Some(a));
        assert_eq!(heap.cdr(p).unwrap(), None);

        heap.set_cdr(p, Some(a)).unwrap();
        assert_eq!(heap.pair_fields(p), Some((Some(a), Some(a))));
        assert_eq!(heap.count(p).unwrap(), 0);
        assert_eq!(heap.flags(p).unwrap(), ObjectFlags::empty());
    }

    #[test]
    fn test_external_downcast() {
        let mut heap = Heap::with_defaults();
        let blob = heap.make_external(Rc::new(Blob), 41u32).unwrap();

        *heap.external_mut::<u32>(blob).unwrap() += 1;
        assert_eq!(*heap.external::<u32>(blob).unwrap(), 42);

        let err = heap.external::<String>(blob).unwrap_err();
        assert!(matches!(err, SgcError::WrongKind { ref actual, .. } if actual == "blob"));
        assert!(matches!(heap.car(blob), Err(SgcError::WrongKind { .. })));
    }

    #[test]
    fn test_stale_handle_reports_free_site() {
        let mut heap = Heap::new(HeapConfig {
            poison_on_free: true,
            ..Default::default()
        })
        .unwrap();
        let p = heap.make_pair(None, None).unwrap();
        heap.deallocate(p).unwrap();

        match heap.car(p) {
            Err(SgcError::StaleHandle { handle, freed_at }) => {
                assert_eq!(handle, p);
                assert!(freed_at.unwrap().contains("heap"));
            },
            other => panic!("expected stale handle, got {:?}", other),
        }
        assert!(matches!(heap.deallocate(p), Err(SgcError::StaleHandle { .. })));
    }

    #[test]
    fn test_stale_handle_dispatches_as_zombie() {
        let mut heap = Heap::with_defaults();
        let p = heap.make_pair(None, None).unwrap();
        heap.deallocate(p).unwrap();

        assert!(heap.is_zombie(p));
        assert_eq!(heap.display(p), "#<zombie>");
        assert_eq!(heap.class_name(p), "zombie");
        assert_eq!(heap.eval(p).unwrap(), Some(p));
        assert!(matches!(heap.apply(p, &[]), Err(SgcError::NotCallable { .. })));
        assert_eq!(heap.serialize(p), serde_json::Value::Null);
    }

    #[test]
    fn test_zombify_drops_payload() {
        let mut heap = Heap::with_defaults();
        let blob = heap.make_external(Rc::new(Blob), vec![1u8, 2, 3]).unwrap();

        assert!(heap.zombify(blob).unwrap());
        assert!(heap.is_zombie(blob));
        assert!(heap.is_live(blob));
        assert!(heap.external::<Vec<u8>>(blob).is_err());
        assert!(!heap.zombify(blob).unwrap());
    }

    #[test]
    fn test_class_descriptor() {
        let mut heap = Heap::with_defaults();
        let class = heap.make_class(Rc::new(Blob)).unwrap();
        assert_eq!(heap.kind_of(class), ClassKind::Descriptor);
        assert_eq!(heap.display(class), "#<class blob>");
    }

    #[test]
    #[should_panic(expected = "dispose of zombie")]
    fn test_dispose_zombie_is_fatal() {
        let mut heap = Heap::with_defaults();
        let blob = heap.make_external(Rc::new(Blob), ()).unwrap();
        heap.dispose(blob).unwrap();
        let _ = heap.dispose(blob);
    }

    #[test]
    fn test_chunk_growth_is_logged() {
        let mut heap = Heap::new(HeapConfig {
            handle_chunk_cells: 2,
            ..Default::default()
        })
        .unwrap();
        for _ in 0..3 {
            heap.make_pair(None, None).unwrap();
        }

        let grown = heap
            .logger()
            .events()
            .into_iter()
            .filter(|event| matches!(event, GcEvent::ChunkGrown { .. }))
            .count();
        assert_eq!(grown, 2);
        assert_eq!(heap.handle_arena_stats().chunks, 2);
    }

    #[test]
    fn test_verify_fresh_heap() {
        let mut heap = Heap::with_defaults();
        let a = heap.make_pair(None, None).unwrap();
        heap.make_pair(Some(a), Some(a)).unwrap();
        assert_eq!(heap.verify(), 2);
    }
}
