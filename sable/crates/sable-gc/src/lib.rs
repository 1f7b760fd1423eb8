//! # Sable GC - Slab Allocator and Mark-Sweep Collector
//!
//! Memory core of the Sable Lisp runtime: chunked slab arenas, the universal
//! [`Handle`], finalizers, weak notifiers, protected roots and a synchronous
//! mark-sweep collector that reclaims cyclic graphs of pairs and external
//! objects.
//!
//! ## Overview
//!
//! - **Slab arenas**: fixed-size cells in growable chunks with a LIFO free list
//! - **Generation-checked handles**: a reclaimed cell can never alias a live one
//! - **Class dispatch**: every object kind plugs in through the [`Class`] trait
//! - **Zombies**: disposed objects answer every operation with inert defaults
//! - **Finalizers and notifiers**: one-shot callbacks, deduplicated, bulk-removable
//!
//! ## Quick Start
//!
//! ```rust
//! use sable_gc::{CollectMode, Heap, HeapConfig};
//!
//! fn main() -> Result<(), sable_gc::SgcError> {
//!     let mut heap = Heap::new(HeapConfig::default())?;
//!
//!     // (1 . 2)-shaped list rooted through a global name
//!     let tail = heap.make_pair(None, None)?;
//!     let list = heap.make_pair(Some(tail), None)?;
//!     heap.define("xs", Some(list))?;
//!
//!     // Unreachable garbage
//!     let garbage = heap.make_pair(None, None)?;
//!
//!     let report = heap.collect(CollectMode::Purge);
//!     assert_eq!(report.reclaimed, 1);
//!     assert!(heap.is_live(list));
//!     assert!(!heap.is_live(garbage));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── Heap ─────────────────────────────┐
//! │                                                               │
//! │  symbols ─┐                        ┌── finalizers (by addr)   │
//! │           ├─▶ roots ─▶ mark ─▶ dispose ─▶ notifiers (by addr) │
//! │  protect ─┘                        └── zombify                │
//! │                                             │                 │
//! │              recount ─▶ reclaim ─▶ handle arena free list     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Single-threaded by construction: `Heap` is `!Send`, class hooks receive
//! `&mut Heap`, and `collect` runs to completion before returning. Reentrant
//! collection is a fatal error. Asynchronous interrupts (SIGINT, SIGQUIT) are
//! masked while a collection or an out-of-band dispose mutates the heap.
//!
//! ## Modules
//!
//! - [`allocator`]: Slab arenas, address-keyed record tables, allocation trace
//! - [`config`]: Heap configuration and validation
//! - [`error`]: Error types and the fatal-invariant macros
//! - [`gc`]: The collection cycle
//! - [`heap`]: The owning context and every boundary entry point
//! - [`logging`]: Structured GC events
//! - [`marker`]: Reachability passes and protected roots
//! - [`object`]: Handles, object layout, classes, weak notifiers
//! - [`runtime`]: Finalizers and interrupt masking
//! - [`stats`]: Cumulative statistics
//! - [`symbol`]: Symbol table boundary

// Core GC modules
pub mod config;
pub mod error;
pub mod gc;

// Memory management subsystems
pub mod allocator;
pub mod heap;
pub mod object;

// GC algorithm components
pub mod marker;
pub mod symbol;

// Runtime and monitoring
pub mod logging;
pub mod runtime;
pub mod stats;

// Re-export main types for convenience
pub use config::{ConfigError, HeapConfig};
pub use error::{Result, SgcError};
pub use gc::{CollectMode, CycleReport, GcState};
pub use heap::Heap;
pub use object::{Address, Class, ClassKind, Handle, NotifyFn, ObjectFlags};
pub use runtime::{FinalizerFn, Token};

#[doc(hidden)]
pub use log as __log;

/// Sable GC version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create a heap configured from `SGC_*` environment variables
///
/// # Examples
///
/// ```rust
/// let heap = sable_gc::init()?;
/// assert_eq!(heap.live_count(), 0);
/// # Ok::<(), sable_gc::SgcError>(())
/// ```
pub fn init() -> Result<Heap> {
    init_with_config(HeapConfig::from_env())
}

/// Create a heap with a custom configuration
///
/// # Examples
///
/// ```rust
/// use sable_gc::HeapConfig;
///
/// let config = HeapConfig {
///     handle_chunk_cells: 256,
///     max_chunks: Some(64),
///     ..Default::default()
/// };
///
/// let heap = sable_gc::init_with_config(config)?;
/// # Ok::<(), sable_gc::SgcError>(())
/// ```
pub fn init_with_config(config: HeapConfig) -> Result<Heap> {
    Heap::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_default_config() {
        let heap = init_with_config(HeapConfig::default()).unwrap();
        assert!(heap.gc_state().is_idle());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = HeapConfig {
            handle_chunk_cells: 0,
            ..Default::default()
        };
        assert!(matches!(
            init_with_config(config),
            Err(SgcError::Configuration(_))
        ));
    }

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
