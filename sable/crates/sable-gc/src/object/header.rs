//! Object Header - per-handle collector metadata
//!
//! Header Layout:
//! ┌─────────────────────────────────────────┐
//! │         Flags (1 byte)                  │
//! │  - Bit 0: Garbage (not yet reached)     │
//! │  - Bit 1: Visited (counting pass)       │
//! │  - Bit 2: Multiple (> 1 referrer)       │
//! │  - Bit 3: Finalizer attached            │
//! ├─────────────────────────────────────────┤
//! │         Count (4 bytes)                 │
//! └─────────────────────────────────────────┘
//!
//! Outside a collection the count is unused. During one it is first a mark
//! counter (every traced edge into the handle adds one, on top of
//! [`MARK_OFFSET`]) and afterwards the exact number of references from the
//! roots and from other reachable handles. Zero after the recount means the
//! handle is reclaimable.

/// Flag bit positions
pub const GARBAGE_BIT: u8 = 0;
pub const VISITED_BIT: u8 = 1;
pub const MULTIPLE_BIT: u8 = 2;
pub const FINALIZER_BIT: u8 = 3;

/// Masks for flag fields
pub const GARBAGE_MASK: u8 = 1 << GARBAGE_BIT;
pub const VISITED_MASK: u8 = 1 << VISITED_BIT;
pub const MULTIPLE_MASK: u8 = 1 << MULTIPLE_BIT;
pub const FINALIZER_MASK: u8 = 1 << FINALIZER_BIT;

/// Flags that only have meaning while a collection runs
pub const TRANSIENT_MASK: u8 = GARBAGE_MASK | VISITED_MASK | MULTIPLE_MASK;

/// Added to the count when a handle is pre-flagged as garbage, so a count
/// still at or above it is distinguishable from any count the unflag pass
/// can reach on its own.
pub const MARK_OFFSET: u32 = 1 << 24;

/// Snapshot of a handle's flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectFlags(u8);

impl ObjectFlags {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn is_garbage(self) -> bool {
        self.0 & GARBAGE_MASK != 0
    }

    #[inline]
    pub fn is_visited(self) -> bool {
        self.0 & VISITED_MASK != 0
    }

    #[inline]
    pub fn has_multiple_referrers(self) -> bool {
        self.0 & MULTIPLE_MASK != 0
    }

    #[inline]
    pub fn has_finalizer(self) -> bool {
        self.0 & FINALIZER_MASK != 0
    }
}

/// ObjectHeader - flags and count carried by every handle
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectHeader {
    flags: u8,
    count: u32,
}

impl ObjectHeader {
    pub const fn new() -> Self {
        Self { flags: 0, count: 0 }
    }

    #[inline]
    pub fn flags(&self) -> ObjectFlags {
        ObjectFlags(self.flags)
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    // === Collection phases ===

    /// Pre-flag as garbage and lift the count past the mark offset
    #[inline]
    pub fn flag_garbage(&mut self) {
        self.flags |= GARBAGE_MASK;
        self.count = self.count.saturating_add(MARK_OFFSET);
    }

    /// Record one traced edge during the unflag pass
    ///
    /// Returns true the first time, when the garbage flag is cleared.
    #[inline]
    pub fn unflag(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        let was_garbage = self.flags & GARBAGE_MASK != 0;
        self.flags &= !GARBAGE_MASK;
        was_garbage
    }

    /// Keep only the garbage flag; used once a structured object's
    /// destructor has run
    #[inline]
    pub fn reset_to_garbage(&mut self) {
        self.flags = GARBAGE_MASK;
    }

    /// Clear the count and every transient flag before the recount
    #[inline]
    pub fn reset_for_count(&mut self) {
        self.flags &= !TRANSIENT_MASK;
        self.count = 0;
    }

    /// Record one reference during the recount
    ///
    /// Returns true the first time the handle is reached.
    #[inline]
    pub fn count_reference(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        if self.count > 1 {
            self.flags |= MULTIPLE_MASK;
        }
        let first = self.flags & VISITED_MASK == 0;
        self.flags |= VISITED_MASK;
        first
    }

    // === Finalizer cache ===

    #[inline]
    pub fn set_finalizer(&mut self, attached: bool) {
        if attached {
            self.flags |= FINALIZER_MASK;
        } else {
            self.flags &= !FINALIZER_MASK;
        }
    }
}
