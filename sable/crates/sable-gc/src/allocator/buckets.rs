//! Address-keyed bucket table over an arena
//!
//! Finalizer and notifier records both live in hash buckets keyed by a target
//! address, with each bucket a singly-linked chain of cells in a record arena.
//! This module holds the chain manipulation; the registries decide what a
//! record carries and when duplicates count as identical.

use crate::allocator::arena::{Arena, ArenaStats, CellId};
use crate::allocator::trace::AllocationTrace;
use crate::error::Result;
use crate::object::Address;

/// Number of hash buckets; a power of two so the hash is a mask.
pub const BUCKET_COUNT: usize = 1024;

/// A record that can be chained into a [`BucketTable`]
pub trait BucketEntry {
    /// Address the record is filed under
    fn key(&self) -> Address;

    fn next(&self) -> Option<CellId>;

    fn set_next(&mut self, next: Option<CellId>);

    /// Whether `other` would be a duplicate of this record
    fn same_as(&self, other: &Self) -> bool;
}

pub struct BucketTable<E> {
    records: Arena<E>,
    heads: Vec<Option<CellId>>,
    len: usize,
}

#[inline]
fn bucket_of(key: Address) -> usize {
    // Cell indices are dense; fold the generation in so reused cells spread.
    let mixed = key ^ (key >> 32) ^ (key >> 17);
    (mixed as usize) & (BUCKET_COUNT - 1)
}

impl<E: BucketEntry> BucketTable<E> {
    pub fn new(
        name: &'static str,
        quantum: usize,
        max_chunks: Option<usize>,
        poison: bool,
        trace: AllocationTrace,
    ) -> Self {
        Self {
            records: Arena::new(name, quantum, max_chunks, poison, trace),
            heads: vec![None; BUCKET_COUNT],
            len: 0,
        }
    }

    /// File `entry` unless an identical record is already present
    ///
    /// Returns whether the entry was inserted.
    #[track_caller]
    pub fn insert_unique(&mut self, mut entry: E) -> Result<bool> {
        let bucket = bucket_of(entry.key());

        let mut cursor = self.heads[bucket];
        while let Some(id) = cursor {
            let Some(existing) = self.records.get(id) else {
                break;
            };
            if existing.key() == entry.key() && existing.same_as(&entry) {
                return Ok(false);
            }
            cursor = existing.next();
        }

        entry.set_next(self.heads[bucket]);
        let id = self.records.allocate(entry)?;
        self.heads[bucket] = Some(id);
        self.len += 1;
        Ok(true)
    }

    /// Unlink and return every record filed under `key`, oldest first
    #[track_caller]
    pub fn take_key(&mut self, key: Address) -> Vec<E> {
        self.take_where(Some(bucket_of(key)), |entry| entry.key() == key)
    }

    /// Unlink and return every record matching `pred`, across all buckets
    #[track_caller]
    pub fn take_all(&mut self, pred: impl FnMut(&E) -> bool) -> Vec<E> {
        self.take_where(None, pred)
    }

    pub fn contains_key(&self, key: Address) -> bool {
        let mut cursor = self.heads[bucket_of(key)];
        while let Some(id) = cursor {
            let Some(entry) = self.records.get(id) else {
                break;
            };
            if entry.key() == key {
                return true;
            }
            cursor = entry.next();
        }
        false
    }

    /// Number of records filed under `key`
    pub fn count_key(&self, key: Address) -> usize {
        self.iter().filter(|entry| entry.key() == key).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> + '_ {
        self.records.iter().map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn stats(&self) -> ArenaStats {
        self.records.stats()
    }

    #[track_caller]
    fn take_where(&mut self, only: Option<usize>, mut pred: impl FnMut(&E) -> bool) -> Vec<E> {
        let mut taken = Vec::new();
        let buckets = match only {
            Some(bucket) => bucket..bucket + 1,
            None => 0..BUCKET_COUNT,
        };

        for bucket in buckets {
            let mut prev: Option<CellId> = None;
            let mut cursor = self.heads[bucket];

            while let Some(id) = cursor {
                let Some(entry) = self.records.get(id) else {
                    break;
                };
                let next = entry.next();

                if pred(entry) {
                    match prev {
                        Some(p) => {
                            if let Some(prev_entry) = self.records.get_mut(p) {
                                prev_entry.set_next(next);
                            }
                        },
                        None => self.heads[bucket] = next,
                    }
                    let (entry, _) = self.records.deallocate(id);
                    self.len -= 1;
                    taken.push(entry);
                } else {
                    prev = Some(id);
                }

                cursor = next;
            }
        }

        // Chains are newest-first; reversed, one key drains in registration order.
        taken.reverse();
        taken
    }
}
