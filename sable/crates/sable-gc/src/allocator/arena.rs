//! Allocator Submodule - Chunked Slab Arena
//!
//! An arena hands out fixed-size cells from chunks obtained from the system
//! allocator. Freed cells go onto a LIFO free list and are reused before the
//! arena grows again. Chunks are never released individually; the chunk list
//! is what the collector walks to enumerate every live cell.
//!
//! Cells are addressed by [`CellId`], an index plus a generation. The
//! generation is bumped every time a cell is freed, so an id kept past its
//! cell's reclamation can never alias the next occupant.
//!
//! ```text
//! chunk 0                      chunk 1
//! ┌──────┬──────┬──────┬──────┐┌──────┬──────┬──────┬──────┐
//! │ used │ free │ used │ free ││ free │ used │ free │ free │
//! └──────┴──┬───┴──────┴──▲───┘└──┬───┴──────┴──────┴──────┘
//!           │             │       │
//! free_head ┘             └───────┘   (LIFO, order irrelevant)
//! ```

use crate::allocator::trace::{AllocationTrace, TraceOp};
use crate::assert_context;
use crate::error::{Result, SgcError};
use crate::fatal;
use std::panic::Location;

/// Generation-checked cell address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    index: u32,
    generation: u32,
}

impl CellId {
    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Position of the cell across all chunks of its arena
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Number of times the cell had been freed when this id was issued
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

enum CellState<T> {
    Free {
        next: Option<u32>,
    },
    /// Free, remembering who released it
    Poisoned {
        next: Option<u32>,
        freed_at: &'static Location<'static>,
    },
    Used(T),
}

struct Cell<T> {
    generation: u32,
    watched: bool,
    state: CellState<T>,
}

/// One block of cells obtained from the system allocator
pub struct Chunk<T> {
    base: u32,
    cells: Vec<Cell<T>>,
}

impl<T> Chunk<T> {
    /// Index of the first cell in this chunk
    pub fn first_index(&self) -> u32 {
        self.base
    }

    /// Index of the last cell in this chunk
    pub fn last_index(&self) -> u32 {
        self.base + self.cells.len() as u32 - 1
    }
}

/// Occupancy snapshot of one arena
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArenaStats {
    pub name: &'static str,
    pub chunks: usize,
    pub capacity: usize,
    pub free: usize,
    pub live: usize,
}

/// Arena - pool of same-sized cells backed by growable chunks
pub struct Arena<T> {
    name: &'static str,
    /// Cells per chunk
    quantum: usize,
    max_chunks: Option<usize>,
    poison: bool,
    chunks: Vec<Chunk<T>>,
    free_head: Option<u32>,
    free_len: usize,
    live: usize,
    trace: AllocationTrace,
}

impl<T> Arena<T> {
    /// Create an empty arena
    ///
    /// No memory is requested until the first allocation.
    pub fn new(
        name: &'static str,
        quantum: usize,
        max_chunks: Option<usize>,
        poison: bool,
        trace: AllocationTrace,
    ) -> Self {
        assert_context!(quantum > 0, "arena '{}' needs a growth quantum", name);
        Self {
            name,
            quantum,
            max_chunks,
            poison,
            chunks: Vec::new(),
            free_head: None,
            free_len: 0,
            live: 0,
            trace,
        }
    }

    /// Arena name used in errors and trace records
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cells added per growth step
    pub fn quantum(&self) -> usize {
        self.quantum
    }

    /// Add one chunk and thread its cells onto the free list
    ///
    /// Must only be called with an empty free list. On failure the arena is
    /// left untouched.
    pub fn grow(&mut self) -> Result<()> {
        assert_context!(
            self.free_head.is_none(),
            "grow on arena '{}' with a non-empty free list ({} free cells)",
            self.name,
            self.free_len
        );

        let oom = SgcError::OutOfMemory {
            arena: self.name,
            cells: self.quantum,
        };

        if let Some(max) = self.max_chunks {
            if self.chunks.len() >= max {
                return Err(oom);
            }
        }

        let base = self.chunks.len() * self.quantum;
        if base + self.quantum > u32::MAX as usize {
            return Err(oom);
        }
        let base = base as u32;

        let mut cells = Vec::new();
        if cells.try_reserve_exact(self.quantum).is_err() || self.chunks.try_reserve(1).is_err() {
            return Err(oom);
        }

        let last = self.quantum as u32 - 1;
        for offset in 0..=last {
            let next = if offset < last {
                Some(base + offset + 1)
            } else {
                None
            };
            cells.push(Cell {
                generation: 0,
                watched: false,
                state: CellState::Free { next },
            });
        }

        self.chunks.push(Chunk { base, cells });
        self.free_head = Some(base);
        self.free_len += self.quantum;

        log::trace!(
            "arena '{}' grew to {} chunks ({} cells)",
            self.name,
            self.chunks.len(),
            self.capacity()
        );

        Ok(())
    }

    /// Pop a cell off the free list and store `value` in it
    ///
    /// Grows the arena first when the free list is empty.
    #[track_caller]
    pub fn allocate(&mut self, value: T) -> Result<CellId> {
        let site = Location::caller();

        if self.free_head.is_none() {
            self.grow()?;
        }

        let index = match self.free_head {
            Some(index) => index,
            None => fatal!("arena '{}' grew but has no free cell", self.name),
        };

        let name = self.name;
        let cell = self.cell_mut(index);
        let next = match cell.state {
            CellState::Free { next } | CellState::Poisoned { next, .. } => next,
            CellState::Used(_) => fatal!("free list of '{}' links used cell {}", name, index),
        };

        cell.state = CellState::Used(value);
        cell.watched = false;
        let id = CellId::new(index, cell.generation);

        self.free_head = next;
        self.free_len -= 1;
        self.live += 1;

        self.trace.record(TraceOp::Alloc, self.name, id, site);
        Ok(id)
    }

    /// Return a cell to the free list, handing back its contents
    ///
    /// Freeing a cell that is not live is a double link of the free list and
    /// aborts. Returns the payload and whether the cell was being watched.
    #[track_caller]
    pub fn deallocate(&mut self, id: CellId) -> (T, bool) {
        let site = Location::caller();

        if !self.contains(id) {
            fatal!(
                "double free of cell {}:{} in arena '{}'",
                id.index,
                id.generation,
                self.name
            );
        }

        let next = self.free_head;
        let poison = self.poison;
        let cell = self.cell_mut(id.index);

        let free_state = if poison {
            CellState::Poisoned {
                next,
                freed_at: site,
            }
        } else {
            CellState::Free { next }
        };

        let old = std::mem::replace(&mut cell.state, free_state);
        let watched = std::mem::take(&mut cell.watched);
        cell.generation = cell.generation.wrapping_add(1);

        self.free_head = Some(id.index);
        self.free_len += 1;
        self.live -= 1;

        self.trace.record(TraceOp::Free, self.name, id, site);

        match old {
            CellState::Used(value) => (value, watched),
            _ => fatal!("cell {} of '{}' changed state while freeing", id.index, self.name),
        }
    }

    /// Check that `id` names a live cell of the current generation
    #[inline]
    pub fn contains(&self, id: CellId) -> bool {
        self.get(id).is_some()
    }

    #[inline]
    pub fn get(&self, id: CellId) -> Option<&T> {
        let cell = self.cell(id.index)?;
        if cell.generation != id.generation {
            return None;
        }
        match &cell.state {
            CellState::Used(value) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, id: CellId) -> Option<&mut T> {
        let (chunk, offset) = self.locate(id.index);
        let cell = self.chunks.get_mut(chunk)?.cells.get_mut(offset)?;
        if cell.generation != id.generation {
            return None;
        }
        match &mut cell.state {
            CellState::Used(value) => Some(value),
            _ => None,
        }
    }

    /// Call site that freed a poisoned cell, as `file:line`
    pub fn freed_at(&self, id: CellId) -> Option<String> {
        match self.cell(id.index)?.state {
            CellState::Poisoned { freed_at, .. } => {
                Some(format!("{}:{}", freed_at.file(), freed_at.line()))
            },
            _ => None,
        }
    }

    /// Mark or unmark a live cell as watched by a notifier
    ///
    /// Returns false when `id` is not live.
    pub fn set_watched(&mut self, id: CellId, watched: bool) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.cell_mut(id.index).watched = watched;
        true
    }

    pub fn is_watched(&self, id: CellId) -> bool {
        self.contains(id) && self.cell(id.index).map_or(false, |cell| cell.watched)
    }

    /// Ids of every live cell, in chunk order
    pub fn live_ids(&self) -> Vec<CellId> {
        let mut ids = Vec::with_capacity(self.live);
        for chunk in &self.chunks {
            for (offset, cell) in chunk.cells.iter().enumerate() {
                if let CellState::Used(_) = cell.state {
                    ids.push(CellId::new(chunk.base + offset as u32, cell.generation));
                }
            }
        }
        ids
    }

    /// Iterate over live cells
    pub fn iter(&self) -> impl Iterator<Item = (CellId, &T)> + '_ {
        self.chunks.iter().flat_map(|chunk| {
            chunk
                .cells
                .iter()
                .enumerate()
                .filter_map(move |(offset, cell)| match &cell.state {
                    CellState::Used(value) => Some((
                        CellId::new(chunk.base + offset as u32, cell.generation),
                        value,
                    )),
                    _ => None,
                })
        })
    }

    /// Chunks obtained so far
    pub fn chunks(&self) -> &[Chunk<T>] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn capacity(&self) -> usize {
        self.chunks.len() * self.quantum
    }

    pub fn free_len(&self) -> usize {
        self.free_len
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            name: self.name,
            chunks: self.chunk_count(),
            capacity: self.capacity(),
            free: self.free_len,
            live: self.live,
        }
    }

    /// Walk the free list and check it against the counters
    ///
    /// Aborts on a cycle, a used cell on the list, or a length mismatch.
    pub fn verify_free_list(&self) {
        let mut seen = 0usize;
        let mut cursor = self.free_head;
        while let Some(index) = cursor {
            seen += 1;
            assert_context!(
                seen <= self.capacity(),
                "free list of '{}' is cyclic",
                self.name
            );
            cursor = match self.cell(index).map(|cell| &cell.state) {
                Some(CellState::Free { next }) | Some(CellState::Poisoned { next, .. }) => *next,
                _ => fatal!("free list of '{}' links non-free cell {}", self.name, index),
            };
        }
        assert_context!(
            seen == self.free_len && seen + self.live == self.capacity(),
            "free list of '{}' has {} cells, counters say {} free / {} live / {} total",
            self.name,
            seen,
            self.free_len,
            self.live,
            self.capacity()
        );
    }

    #[inline]
    fn locate(&self, index: u32) -> (usize, usize) {
        let index = index as usize;
        (index / self.quantum, index % self.quantum)
    }

    #[inline]
    fn cell(&self, index: u32) -> Option<&Cell<T>> {
        let (chunk, offset) = self.locate(index);
        self.chunks.get(chunk)?.cells.get(offset)
    }

    /// Callers have already checked that `index` lies inside a chunk
    #[inline]
    fn cell_mut(&mut self, index: u32) -> &mut Cell<T> {
        let (chunk, offset) = self.locate(index);
        &mut self.chunks[chunk].cells[offset]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(quantum: usize) -> Arena<u64> {
        Arena::new("test", quantum, None, false, AllocationTrace::default())
    }

    #[test]
    fn test_first_allocation_grows() {
        let mut arena = arena(4);
        assert_eq!(arena.chunk_count(), 0);

        let id = arena.allocate(7).unwrap();
        assert_eq!(arena.chunk_count(), 1);
        assert_eq!(arena.get(id), Some(&7));
        assert_eq!(arena.free_len(), 3);
        arena.verify_free_list();
    }

    #[test]
    fn test_quantum_plus_one_makes_two_chunks() {
        let mut arena = arena(8);
        for i in 0..9 {
            arena.allocate(i).unwrap();
        }
        assert_eq!(arena.chunk_count(), 2);
        assert_eq!(arena.chunks()[1].first_index(), 8);
        assert_eq!(arena.chunks()[1].last_index(), 15);
    }

    #[test]
    fn test_round_trip_keeps_chunks() {
        let mut arena = arena(5);
        let before = arena.free_len();
        let ids: Vec<_> = (0..23).map(|i| arena.allocate(i).unwrap()).collect();
        let chunks = arena.chunk_count();

        for id in ids {
            arena.deallocate(id);
        }

        assert!(arena.free_len() >= before);
        assert_eq!(arena.chunk_count(), chunks);
        assert_eq!(arena.live_count(), 0);
        arena.verify_free_list();
    }

    #[test]
    fn test_freed_cell_is_reused_with_new_generation() {
        let mut arena = arena(4);
        let a = arena.allocate(1).unwrap();
        let (value, watched) = arena.deallocate(a);
        assert_eq!(value, 1);
        assert!(!watched);

        let b = arena.allocate(2).unwrap();
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&2));
    }

    #[test]
    fn test_chunk_limit_is_out_of_memory() {
        let mut arena = Arena::new("tiny", 2, Some(1), false, AllocationTrace::default());
        arena.allocate(1u8).unwrap();
        arena.allocate(2u8).unwrap();

        let err = arena.allocate(3u8).unwrap_err();
        assert!(matches!(err, SgcError::OutOfMemory { arena: "tiny", cells: 2 }));
        assert_eq!(arena.chunk_count(), 1);
        assert_eq!(arena.live_count(), 2);
        arena.verify_free_list();
    }

    #[test]
    fn test_poisoned_cell_remembers_free_site() {
        let mut arena = Arena::new("poison", 4, None, true, AllocationTrace::default());
        let id = arena.allocate(1u32).unwrap();
        arena.deallocate(id);

        let site = arena.freed_at(id).unwrap();
        assert!(site.contains("arena.rs"));
    }

    #[test]
    fn test_watched_bit_reported_on_free() {
        let mut arena = arena(4);
        let id = arena.allocate(1).unwrap();
        assert!(arena.set_watched(id, true));
        assert!(arena.is_watched(id));

        let (_, watched) = arena.deallocate(id);
        assert!(watched);
        assert!(!arena.set_watched(id, true));
    }

    #[test]
    fn test_live_ids_skip_free_cells() {
        let mut arena = arena(4);
        let a = arena.allocate(1).unwrap();
        let b = arena.allocate(2).unwrap();
        let c = arena.allocate(3).unwrap();
        arena.deallocate(b);

        assert_eq!(arena.live_ids(), vec![a, c]);
        assert_eq!(arena.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn test_double_free_is_fatal() {
        let mut arena = arena(4);
        let id = arena.allocate(1).unwrap();
        arena.deallocate(id);
        arena.deallocate(id);
    }

    #[test]
    #[should_panic(expected = "non-empty free list")]
    fn test_grow_with_free_cells_is_fatal() {
        let mut arena = arena(4);
        arena.allocate(1).unwrap();
        arena.grow().unwrap();
    }
}
