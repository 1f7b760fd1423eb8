//! Allocator Module - Slab Allocation
//!
//! Every fixed-size record the runtime creates on its hot paths comes out of
//! an [`Arena`]: one for object handles, and one each for finalizer and
//! notifier records.
//!
//! ## Allocation Flow
//!
//! 1. Pop the free-list head
//! 2. Free list empty -> grow by one chunk of `quantum` cells
//! 3. Growth refused -> OutOfMemory, arena unchanged
//!
//! Freed cells are pushed back onto the free list; chunks are kept until the
//! heap is dropped.

pub mod arena;
pub mod buckets;
pub mod trace;

pub use arena::{Arena, ArenaStats, CellId, Chunk};
pub use buckets::{BucketEntry, BucketTable, BUCKET_COUNT};
pub use trace::{AllocationTrace, TraceOp};
