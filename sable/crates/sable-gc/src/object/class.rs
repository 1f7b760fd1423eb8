//! Class - per-kind behaviour table
//!
//! Every object carries an `Rc<dyn Class>`. The collector only needs
//! [`Class::trace`] and the two release hooks; the remaining methods are the
//! runtime's display/eval/apply/compare/hash/serialize dispatch and all have
//! defaults, so an external kind usually implements `name` and `trace` and
//! little else.
//!
//! Hooks that may touch the heap receive it explicitly. The heap clones the
//! class `Rc` out of the cell before calling, so a hook is free to allocate,
//! register finalizers or rewrite other objects.

use crate::error::{Result, SgcError};
use crate::heap::Heap;
use crate::object::Handle;
use std::cmp::Ordering;
use std::rc::Rc;

/// What role a class plays during collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ClassKind {
    /// Cons cells; never disposed or zombified
    Pair,
    /// Plain external value
    External,
    /// User-level object whose destructor runs before any native dispose
    Structured,
    /// Class descriptor object; survives teardown
    Descriptor,
    /// Sentinel installed by zombification
    Zombie,
}

impl ClassKind {
    /// Whether objects of this kind go through dispose and zombification
    pub fn is_disposable(self) -> bool {
        matches!(
            self,
            ClassKind::External | ClassKind::Structured | ClassKind::Descriptor
        )
    }
}

/// Behaviour shared by all objects of one kind
pub trait Class {
    /// Display name of the class
    fn name(&self) -> &str;

    fn kind(&self) -> ClassKind {
        ClassKind::External
    }

    /// Report every handle directly reachable from `handle`
    ///
    /// Anything not reported here is invisible to the collector and will be
    /// reclaimed once nothing else reaches it.
    fn trace(&self, _heap: &Heap, _handle: Handle, _visit: &mut dyn FnMut(Handle)) {}

    /// User-level destructor, run in the first dispose pass
    ///
    /// Only called for [`ClassKind::Structured`] classes. Other objects are
    /// still intact when this runs.
    fn destruct(&self, _heap: &mut Heap, _handle: Handle) {}

    /// Release native resources held by the payload
    ///
    /// The payload is dropped right after this returns.
    fn dispose(&self, _heap: &mut Heap, _handle: Handle) {}

    fn display(&self, _heap: &Heap, handle: Handle) -> String {
        format!("#<{} {}>", self.name(), handle)
    }

    /// Evaluate the object; self-evaluating by default
    fn eval(&self, _heap: &mut Heap, handle: Handle) -> Result<Option<Handle>> {
        Ok(Some(handle))
    }

    fn apply(
        &self,
        _heap: &mut Heap,
        _handle: Handle,
        _args: &[Option<Handle>],
    ) -> Result<Option<Handle>> {
        Err(SgcError::NotCallable {
            class: self.name().to_string(),
        })
    }

    /// Identity order by default
    fn compare(&self, _heap: &Heap, a: Handle, b: Handle) -> Ordering {
        a.addr().cmp(&b.addr())
    }

    fn hash(&self, _heap: &Heap, handle: Handle) -> u64 {
        handle.addr()
    }

    fn serialize(&self, _heap: &Heap, _handle: Handle) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Built-in class of cons cells
#[derive(Debug, Default)]
pub struct PairClass;

impl Class for PairClass {
    fn name(&self) -> &str {
        "pair"
    }

    fn kind(&self) -> ClassKind {
        ClassKind::Pair
    }

    fn trace(&self, heap: &Heap, handle: Handle, visit: &mut dyn FnMut(Handle)) {
        if let Some((car, cdr)) = heap.pair_fields(handle) {
            if let Some(car) = car {
                visit(car);
            }
            if let Some(cdr) = cdr {
                visit(cdr);
            }
        }
    }

    fn display(&self, heap: &Heap, handle: Handle) -> String {
        let show = |field: Option<Handle>| field.map_or_else(|| "()".to_string(), |h| h.to_string());
        match heap.pair_fields(handle) {
            Some((car, cdr)) => format!("({} . {})", show(car), show(cdr)),
            None => "#<zombie>".to_string(),
        }
    }

    fn serialize(&self, heap: &Heap, handle: Handle) -> serde_json::Value {
        match heap.pair_fields(handle) {
            Some((car, cdr)) => serde_json::json!({
                "car": car.map(Handle::addr),
                "cdr": cdr.map(Handle::addr),
            }),
            None => serde_json::Value::Null,
        }
    }
}

/// Sentinel class of zombified objects
///
/// Answers every operation with an inert default and never touches the
/// payload, which is gone.
#[derive(Debug, Default)]
pub struct ZombieClass;

impl Class for ZombieClass {
    fn name(&self) -> &str {
        "zombie"
    }

    fn kind(&self) -> ClassKind {
        ClassKind::Zombie
    }

    fn display(&self, _heap: &Heap, _handle: Handle) -> String {
        "#<zombie>".to_string()
    }
}

/// Payload of a class descriptor object
pub struct ClassDescriptor {
    pub class: Rc<dyn Class>,
}

/// Class of class descriptor objects
#[derive(Debug, Default)]
pub struct MetaClass;

impl Class for MetaClass {
    fn name(&self) -> &str {
        "class"
    }

    fn kind(&self) -> ClassKind {
        ClassKind::Descriptor
    }

    fn display(&self, heap: &Heap, handle: Handle) -> String {
        match heap.external::<ClassDescriptor>(handle) {
            Ok(descriptor) => format!("#<class {}>", descriptor.class.name()),
            Err(_) => "#<class ?>".to_string(),
        }
    }

    fn serialize(&self, heap: &Heap, handle: Handle) -> serde_json::Value {
        match heap.external::<ClassDescriptor>(handle) {
            Ok(descriptor) => serde_json::json!({ "class": descriptor.class.name() }),
            Err(_) => serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposable_kinds() {
        assert!(ClassKind::External.is_disposable());
        assert!(ClassKind::Structured.is_disposable());
        assert!(ClassKind::Descriptor.is_disposable());
        assert!(!ClassKind::Pair.is_disposable());
        assert!(!ClassKind::Zombie.is_disposable());
    }

    #[test]
    fn test_builtin_kinds() {
        assert_eq!(PairClass.kind(), ClassKind::Pair);
        assert_eq!(ZombieClass.kind(), ClassKind::Zombie);
        assert_eq!(MetaClass.kind(), ClassKind::Descriptor);
    }
}
