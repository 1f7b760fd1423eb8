//! Test Utilities for the Sable GC Test Suite
//!
//! Provides a heap fixture, two recording classes and callbacks that log
//! into a thread-local event list, so each test can assert exactly which
//! hooks ran and in what order.
//!
//! ============================================================================
//! Tests run on separate threads; the event log is per thread and
//! `HeapFixture` clears it on construction.
//! ============================================================================

#![allow(dead_code)]

use sable_gc::{
    Address, Class, ClassKind, CollectMode, CycleReport, Handle, Heap, HeapConfig, Token,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Small growth quantum so tests cross chunk boundaries quickly
pub const SMALL_CHUNK_CELLS: usize = 4;

/// ============================================================================
/// EVENT LOG
/// ============================================================================

/// Something a hook did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Structured destructor ran; `intact_refs` counts referenced objects
    /// that were not yet zombies at that moment
    Destruct { handle: Handle, intact_refs: usize },
    Dispose(Handle),
    Finalized(Handle, Token),
    Notified(Address, Token),
}

thread_local! {
    static EVENTS: RefCell<Vec<Event>> = RefCell::new(Vec::new());
}

pub fn record(event: Event) {
    EVENTS.with(|events| events.borrow_mut().push(event));
}

/// Drain the event log
pub fn take_events() -> Vec<Event> {
    EVENTS.with(|events| std::mem::take(&mut *events.borrow_mut()))
}

/// Finalizer that only records its invocation
pub fn record_finalizer(_heap: &mut Heap, target: Handle, arg: Token) {
    record(Event::Finalized(target, arg));
}

/// Notifier that only records its invocation
pub fn record_notifier(_heap: &mut Heap, target: Address, context: Token) {
    record(Event::Notified(target, context));
}

/// ============================================================================
/// RECORDING CLASSES
/// ============================================================================

fn trace_refs(heap: &Heap, handle: Handle, visit: &mut dyn FnMut(Handle)) {
    if let Ok(refs) = heap.external::<Vec<Handle>>(handle) {
        for &child in refs {
            visit(child);
        }
    }
}

/// External kind holding a list of handles; logs dispose
pub struct ResourceClass;

impl Class for ResourceClass {
    fn name(&self) -> &str {
        "resource"
    }

    fn trace(&self, heap: &Heap, handle: Handle, visit: &mut dyn FnMut(Handle)) {
        trace_refs(heap, handle, visit);
    }

    fn dispose(&self, _heap: &mut Heap, handle: Handle) {
        record(Event::Dispose(handle));
    }
}

/// Structured kind holding a list of handles; logs destruct and dispose
pub struct RecordClass;

impl Class for RecordClass {
    fn name(&self) -> &str {
        "record"
    }

    fn kind(&self) -> ClassKind {
        ClassKind::Structured
    }

    fn trace(&self, heap: &Heap, handle: Handle, visit: &mut dyn FnMut(Handle)) {
        trace_refs(heap, handle, visit);
    }

    fn destruct(&self, heap: &mut Heap, handle: Handle) {
        let heap: &Heap = heap;
        let intact_refs = heap
            .external::<Vec<Handle>>(handle)
            .map(|refs| refs.iter().filter(|&&child| !heap.is_zombie(child)).count())
            .unwrap_or(0);
        record(Event::Destruct {
            handle,
            intact_refs,
        });
    }

    fn dispose(&self, _heap: &mut Heap, handle: Handle) {
        record(Event::Dispose(handle));
    }
}

/// ============================================================================
/// HEAP FIXTURE
/// ============================================================================

/// Test fixture owning one heap plus the recording classes
pub struct HeapFixture {
    pub heap: Heap,
    pub resource_class: Rc<dyn Class>,
    pub record_class: Rc<dyn Class>,
}

impl HeapFixture {
    /// Create fixture with default configuration
    pub fn with_defaults() -> Self {
        Self::with_config(HeapConfig::default())
    }

    /// Create fixture whose arenas grow `SMALL_CHUNK_CELLS` cells at a time
    pub fn with_small_chunks() -> Self {
        Self::with_config(HeapConfig {
            handle_chunk_cells: SMALL_CHUNK_CELLS,
            record_chunk_cells: SMALL_CHUNK_CELLS,
            ..Default::default()
        })
    }

    pub fn with_config(config: HeapConfig) -> Self {
        take_events();
        let heap = Heap::new(config).expect("heap config should be valid");
        Self {
            heap,
            resource_class: Rc::new(ResourceClass),
            record_class: Rc::new(RecordClass),
        }
    }

    pub fn pair(&mut self, car: Option<Handle>, cdr: Option<Handle>) -> Handle {
        self.heap
            .make_pair(car, cdr)
            .unwrap_or_else(|e| panic!("pair allocation failed: {}", e))
    }

    /// External object referencing `refs`
    pub fn resource(&mut self, refs: Vec<Handle>) -> Handle {
        let class = Rc::clone(&self.resource_class);
        self.heap
            .make_external(class, refs)
            .unwrap_or_else(|e| panic!("resource allocation failed: {}", e))
    }

    /// Structured object referencing `refs`
    pub fn record(&mut self, refs: Vec<Handle>) -> Handle {
        let class = Rc::clone(&self.record_class);
        self.heap
            .make_external(class, refs)
            .unwrap_or_else(|e| panic!("record allocation failed: {}", e))
    }

    /// Proper list of `len` pairs; returns the head and every cell
    pub fn list(&mut self, len: usize) -> (Option<Handle>, Vec<Handle>) {
        let mut head = None;
        let mut cells = Vec::with_capacity(len);
        for _ in 0..len {
            let cell = self.pair(None, head);
            cells.push(cell);
            head = Some(cell);
        }
        (head, cells)
    }

    pub fn purge(&mut self) -> CycleReport {
        self.heap.collect(CollectMode::Purge)
    }

    pub fn teardown(&mut self) -> CycleReport {
        self.heap.collect(CollectMode::Teardown)
    }
}

/// ============================================================================
/// ASSERTIONS
/// ============================================================================

pub fn assert_all_live(heap: &Heap, handles: &[Handle], context: &str) {
    for &handle in handles {
        assert!(
            heap.is_live(handle),
            "{}: {} was reclaimed while reachable",
            context,
            handle
        );
    }
}

pub fn assert_all_reclaimed(heap: &Heap, handles: &[Handle], context: &str) {
    for &handle in handles {
        assert!(
            !heap.is_live(handle),
            "{}: {} survived although unreachable",
            context,
            handle
        );
    }
}
