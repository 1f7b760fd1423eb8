//! Object Module - Universal Handle and Object Layout
//!
//! Every runtime value the collector manages is an [`Object`] living in a cell
//! of the heap's handle arena and addressed by a [`Handle`]. An object is
//! either a pair of (possibly nil) handles or an opaque external payload, plus
//! the class that gives it behaviour and the header the collector works on.
//!
//! ```text
//! ┌──────────────┬───────────────────────┬──────────────────────────┐
//! │ header       │ class                 │ payload                  │
//! │ flags, count │ Rc<dyn Class> vtable  │ (car, cdr) | Box<dyn Any>│
//! └──────────────┴───────────────────────┴──────────────────────────┘
//! ```
//!
//! Zombification rewrites the class to the zombie sentinel and drops the
//! payload in place; the cell itself stays allocated until the next recount
//! proves nothing refers to it.

pub mod class;
pub mod header;
pub mod weak;

pub use class::{Class, ClassDescriptor, ClassKind, MetaClass, PairClass, ZombieClass};
pub use header::{ObjectFlags, ObjectHeader, MARK_OFFSET};
pub use weak::{NotifierRegistry, NotifyFn};

use crate::allocator::CellId;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Raw address used to key finalizers and notifiers
///
/// For a handle this is its generation in the high half and its cell index in
/// the low half, so two handles never share an address even when one reuses
/// the other's cell.
pub type Address = u64;

/// Handle - generation-checked reference to an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(CellId);

impl Handle {
    #[inline]
    pub(crate) fn from_cell(id: CellId) -> Self {
        Handle(id)
    }

    #[inline]
    pub(crate) fn cell(self) -> CellId {
        self.0
    }

    /// Unique address of this handle
    #[inline]
    pub fn addr(self) -> Address {
        ((self.0.generation() as u64) << 32) | self.0.index() as u64
    }

    /// Rebuild a handle from its address
    ///
    /// The result may be stale; every heap accessor checks.
    #[inline]
    pub fn from_addr(addr: Address) -> Self {
        Handle(CellId::new(addr as u32, (addr >> 32) as u32))
    }

    pub fn index(self) -> u32 {
        self.0.index()
    }

    pub fn generation(self) -> u32 {
        self.0.generation()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.0.index(), self.0.generation())
    }
}

/// Object payload
pub enum Payload {
    /// A cons cell; `None` is nil
    Pair {
        car: Option<Handle>,
        cdr: Option<Handle>,
    },
    /// Opaque value owned by an external class
    External(Box<dyn Any>),
    /// Cleared by zombification
    Empty,
}

impl Payload {
    pub fn describe(&self) -> &'static str {
        match self {
            Payload::Pair { .. } => "pair",
            Payload::External(_) => "external",
            Payload::Empty => "empty",
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Pair { car, cdr } => f
                .debug_struct("Pair")
                .field("car", car)
                .field("cdr", cdr)
                .finish(),
            Payload::External(_) => f.write_str("External(..)"),
            Payload::Empty => f.write_str("Empty"),
        }
    }
}

/// Object - contents of one handle cell
pub struct Object {
    pub(crate) header: ObjectHeader,
    pub(crate) class: Rc<dyn Class>,
    pub(crate) payload: Payload,
}

impl Object {
    pub(crate) fn new(class: Rc<dyn Class>, payload: Payload) -> Self {
        Self {
            header: ObjectHeader::new(),
            class,
            payload,
        }
    }

    pub fn header(&self) -> &ObjectHeader {
        &self.header
    }

    pub fn class(&self) -> &Rc<dyn Class> {
        &self.class
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[inline]
    pub fn kind(&self) -> ClassKind {
        self.class.kind()
    }

    #[inline]
    pub fn is_zombie(&self) -> bool {
        self.class.kind() == ClassKind::Zombie
    }

    /// Swap in the zombie class and drop the payload
    ///
    /// Returns false when the object already was a zombie.
    pub(crate) fn zombify(&mut self, zombie: &Rc<dyn Class>) -> bool {
        if self.is_zombie() {
            return false;
        }
        self.class = Rc::clone(zombie);
        self.payload = Payload::Empty;
        true
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class.name())
            .field("flags", &self.header.flags())
            .field("count", &self.header.count())
            .field("payload", &self.payload)
            .finish()
    }
}
