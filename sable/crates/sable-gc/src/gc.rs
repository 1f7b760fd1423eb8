//! GC Core Module - Mark-Sweep Collection Cycle
//!
//! `collect` is synchronous and stop-the-world. It never runs on its own;
//! the embedding runtime calls it from its top level or error recovery.
//!
//! ### Purge cycle
//!
//! 1. **Pre-flag** every live handle as garbage, lifting its count past
//!    [`MARK_OFFSET`](crate::object::MARK_OFFSET).
//! 2. **Unwind** dynamic bindings down to each symbol's base binding.
//! 3. **Unflag** everything reachable from the symbol table and the
//!    protected roots.
//! 4. **Destruct** unreachable structured objects (user-level destructors)
//!    and run their finalizers.
//! 5. **Dispose** the remaining unreachable objects: dispose hook, zombify,
//!    finalizers, notifiers.
//! 6. **Recount** exact reference counts from the same roots.
//! 7. **Reclaim** every pair or zombie left with a count of zero, first
//!    running finalizers a callback attached to it after step 5.
//! 8. **Purge** symbol names nothing else refers to.
//!
//! ### Teardown cycle
//!
//! Used once at shutdown. Skips steps 2-4 and 8, disposes every external
//! except class descriptors without running finalizers, and keeps only the
//! descriptors alive.
//!
//! A live external that ends a cycle with a count of zero without having
//! been disposed (it became unreachable only while callbacks ran) is left
//! for the next cycle, so nothing is reclaimed without its dispose hook.

use crate::allocator::CellId;
use crate::fatal;
use crate::heap::Heap;
use crate::logging::GcEvent;
use crate::marker::MarkPass;
use crate::object::{ClassKind, Handle};
use crate::runtime::InterruptGuard;
use crate::stats::GcTimer;
use crate::symbol::SymbolData;
use std::time::Duration;

/// Collection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectMode {
    /// Keep everything reachable, destroy the rest
    #[default]
    Purge,
    /// Destroy everything but class descriptors
    Teardown,
}

/// GC cycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcState {
    /// No collection in progress
    Idle,
    /// Inside `collect`
    Collecting(CollectMode),
}

impl GcState {
    pub fn is_idle(self) -> bool {
        self == GcState::Idle
    }

    pub fn is_collecting(self) -> bool {
        !self.is_idle()
    }
}

/// What one collection did
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct CycleReport {
    pub mode: CollectMode,
    /// 1-based cycle number on this heap
    pub cycle: u64,
    pub live_before: usize,
    pub live_after: usize,
    /// Dynamic bindings popped
    pub unwound: usize,
    /// Handles reached by the unflag pass
    pub reached: usize,
    /// Structured objects whose destructor ran
    pub destructed: usize,
    /// Objects whose dispose hook ran
    pub disposed: usize,
    pub zombified: usize,
    pub reclaimed: usize,
    pub names_purged: usize,
    pub finalizers_run: usize,
    pub notifiers_run: usize,
    pub duration: Duration,
}

impl Heap {
    /// Run a full collection
    ///
    /// Calling this from inside a running collection (from a dispose hook,
    /// destructor, finalizer or notifier) is fatal.
    pub fn collect(&mut self, mode: CollectMode) -> CycleReport {
        if let GcState::Collecting(active) = self.state {
            fatal!("reentrant collect ({:?}) during a {:?} cycle", mode, active);
        }

        let _interrupts = InterruptGuard::new(self.config.mask_interrupts);
        self.state = GcState::Collecting(mode);
        self.cycle += 1;

        let cycle = self.cycle;
        let total = GcTimer::new();
        let mut phase = GcTimer::new();
        let finalizers_before = self.stats.finalizers_run();
        let notifiers_before = self.stats.notifiers_run();

        let mut report = CycleReport {
            mode,
            cycle,
            live_before: self.handles.live_count(),
            ..Default::default()
        };

        self.logger.log(GcEvent::CycleStart { cycle, mode });
        log::debug!(
            "gc cycle {} ({:?}) starting with {} live handles",
            cycle,
            mode,
            report.live_before
        );

        let snapshot = self.pre_flag();
        self.phase_end(cycle, "pre-flag", &mut phase);

        if mode == CollectMode::Purge {
            report.unwound = self.unwind_bindings();
            self.phase_end(cycle, "unwind", &mut phase);

            let roots = self.root_handles();
            report.reached = self.mark_from(&roots, MarkPass::Unflag).reached;
            self.phase_end(cycle, "unflag", &mut phase);

            report.destructed = self.destruct_unreachable(&snapshot);
            self.phase_end(cycle, "destruct", &mut phase);
        }

        let (disposed, zombified) = self.dispose_unreachable(&snapshot, mode);
        report.disposed = disposed;
        report.zombified = zombified;
        self.phase_end(cycle, "dispose", &mut phase);

        if cfg!(debug_assertions) {
            self.audit("dispose", true);
        }

        self.reset_counts();
        let roots = match mode {
            CollectMode::Purge => self.root_handles(),
            CollectMode::Teardown => self.descriptor_handles(),
        };
        self.mark_from(&roots, MarkPass::Count);
        self.phase_end(cycle, "recount", &mut phase);

        report.reclaimed = self.sweep(mode);
        self.phase_end(cycle, "reclaim", &mut phase);

        match mode {
            CollectMode::Purge => {
                report.names_purged = self.purge_names();
                self.phase_end(cycle, "purge-names", &mut phase);
            },
            CollectMode::Teardown => {
                // Everything the roots pointed at is gone.
                self.symbols.clear();
                self.roots.clear();
            },
        }

        self.state = GcState::Idle;

        if cfg!(debug_assertions) {
            self.audit("collect", false);
        }

        report.live_after = self.handles.live_count();
        report.finalizers_run = (self.stats.finalizers_run() - finalizers_before) as usize;
        report.notifiers_run = (self.stats.notifiers_run() - notifiers_before) as usize;
        report.duration = total.elapsed();

        self.stats.record_cycle(&report);
        self.logger.log(GcEvent::CycleEnd {
            cycle,
            duration_ms: report.duration.as_secs_f64() * 1000.0,
            reclaimed: report.reclaimed,
            live: report.live_after,
        });

        report
    }

    pub fn is_collecting(&self) -> bool {
        self.state.is_collecting()
    }

    /// Number of collections run on this heap
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    fn phase_end(&self, cycle: u64, phase: &'static str, timer: &mut GcTimer) {
        let duration_ms = timer.lap().as_secs_f64() * 1000.0;
        log::debug!("gc cycle {}: {} done in {:.3}ms", cycle, phase, duration_ms);
        self.logger.log(GcEvent::PhaseEnd {
            cycle,
            phase,
            duration_ms,
        });
    }

    /// Step 1: flag every live handle as garbage; returns the flagged cells
    fn pre_flag(&mut self) -> Vec<CellId> {
        let snapshot = self.handles.live_ids();
        for &id in &snapshot {
            if let Some(object) = self.handles.get_mut(id) {
                object.header.flag_garbage();
            }
        }
        snapshot
    }

    /// Step 4: run destructors of unreachable structured objects
    fn destruct_unreachable(&mut self, snapshot: &[CellId]) -> usize {
        let mut destructed = 0;

        for &id in snapshot {
            let handle = Handle::from_cell(id);
            let Some(object) = self.handles.get(id) else {
                continue;
            };
            if !object.header.flags().is_garbage() || object.kind() != ClassKind::Structured {
                continue;
            }
            let class = object.class.clone();

            class.destruct(self, handle);
            destructed += 1;

            let attached = self.finalizers.contains(handle);
            if let Some(object) = self.handles.get_mut(id) {
                object.header.reset_to_garbage();
            }
            if attached {
                self.run_finalizers(handle);
            }
        }

        destructed
    }

    /// Step 5: dispose and zombify what is still flagged
    ///
    /// Returns (disposed, zombified).
    fn dispose_unreachable(&mut self, snapshot: &[CellId], mode: CollectMode) -> (usize, usize) {
        let mut disposed = 0;
        let mut zombified = 0;

        for &id in snapshot {
            let handle = Handle::from_cell(id);
            let Some(object) = self.handles.get(id) else {
                continue;
            };
            if !object.header.flags().is_garbage() {
                continue;
            }
            let kind = object.kind();

            let run_finalizers = match mode {
                CollectMode::Purge => true,
                CollectMode::Teardown if kind == ClassKind::Descriptor => continue,
                CollectMode::Teardown => false,
            };

            if kind.is_disposable() {
                disposed += 1;
            }
            if self.release(handle, run_finalizers) {
                zombified += 1;
            }
        }

        (disposed, zombified)
    }

    /// Live class descriptor objects; the only roots of a teardown
    fn descriptor_handles(&self) -> Vec<Handle> {
        self.handles
            .iter()
            .filter(|(_, object)| object.kind() == ClassKind::Descriptor)
            .map(|(id, _)| Handle::from_cell(id))
            .collect()
    }

    /// Step 7: reclaim unreferenced pairs and zombies
    ///
    /// A purge runs finalizers attached after step 5 passed the handle;
    /// a teardown drops them unrun.
    fn sweep(&mut self, mode: CollectMode) -> usize {
        let mut reclaimed = 0;
        let mut deferred = 0;

        for id in self.handles.live_ids() {
            let Some(object) = self.handles.get(id) else {
                continue;
            };
            if object.header.count() != 0 {
                continue;
            }
            let attached = mode == CollectMode::Purge && object.header.flags().has_finalizer();
            match object.kind() {
                ClassKind::Pair | ClassKind::Zombie => {
                    let handle = Handle::from_cell(id);
                    if attached {
                        while self.finalizers.contains(handle) {
                            self.run_finalizers(handle);
                        }
                        if !self.handles.contains(id) {
                            continue;
                        }
                    }
                    self.reclaim(handle);
                    reclaimed += 1;
                },
                _ => deferred += 1,
            }
        }

        if deferred > 0 {
            log::debug!("{} unreferenced externals deferred to the next cycle", deferred);
        }
        reclaimed
    }

    /// Step 8: drop names whose symbol nothing else uses
    fn purge_names(&mut self) -> usize {
        let entries: Vec<(String, Handle)> = self
            .symbols
            .iter()
            .map(|(name, symbol)| (name.to_string(), symbol))
            .collect();

        let mut purged = 0;
        for (name, symbol) in entries {
            if self.is_dead_name(symbol) {
                self.symbols.remove(&name);
                purged += 1;
                log::trace!("purged name '{}'", name);
            }
        }
        purged
    }

    fn is_dead_name(&self, symbol: Handle) -> bool {
        let Some(object) = self.handles.get(symbol.cell()) else {
            return true;
        };
        if object.is_zombie() {
            return true;
        }
        let Ok(data) = self.external::<SymbolData>(symbol) else {
            return false;
        };

        object.header.count() == 1
            && !data.no_purge()
            && !object.header.flags().has_finalizer()
            && data.value().map_or(true, |value| self.is_zombie(value))
    }
}
