//! Protected Roots - handles pinned by native code
//!
//! Native frames that hold handles across calls that may collect pin them
//! here. The set is small and ordered; protecting twice is a no-op and
//! unprotecting removes the single entry.
//!
//! # Root Types
//!
//! 1. **Symbol roots** - every interned symbol (see [`crate::symbol`])
//! 2. **Protected roots** - this set

use crate::heap::Heap;
use crate::object::Handle;

/// ProtectedRoots - ordered, duplicate-free pin list
#[derive(Debug, Default)]
pub struct ProtectedRoots {
    handles: Vec<Handle>,
}

impl ProtectedRoots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handle` unless already present
    ///
    /// Returns whether it was added.
    pub fn push(&mut self, handle: Handle) -> bool {
        if self.handles.contains(&handle) {
            return false;
        }
        self.handles.push(handle);
        true
    }

    /// Remove the first occurrence of `handle`
    pub fn remove(&mut self, handle: Handle) -> bool {
        match self.handles.iter().position(|&h| h == handle) {
            Some(pos) => {
                self.handles.remove(pos);
                true
            },
            None => false,
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.handles.contains(&handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = Handle> + '_ {
        self.handles.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.handles.clear();
    }
}

impl Heap {
    /// Pin `handle` as an extra root
    pub fn protect(&mut self, handle: Handle) {
        if self.roots.push(handle) {
            log::trace!("protected {}", handle);
        }
    }

    /// Unpin `handle`
    pub fn unprotect(&mut self, handle: Handle) {
        if !self.roots.remove(handle) {
            log::warn!("unprotect of {} which was never protected", handle);
        }
    }

    pub fn protected_roots(&self) -> &ProtectedRoots {
        &self.roots
    }
}
