//! Runtime Module - Hooks the rest of the runtime registers with the heap
//!
//! Manages:
//! - Finalizers attached to handles
//! - Interrupt masking around collection
//!
//! Weak notifiers live next to the object model in [`crate::object::weak`].

pub mod finalizer;
pub mod interrupt;

pub use finalizer::{FinalizerFn, FinalizerRegistry};
pub use interrupt::InterruptGuard;

use crate::object::Handle;

/// Opaque closure argument passed back to finalizer and notifier callbacks
///
/// Registrations are deduplicated and bulk-removed by comparing tokens, so a
/// subsystem typically uses one token per owning context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
pub struct Token(pub u64);

impl From<Handle> for Token {
    fn from(handle: Handle) -> Self {
        Token(handle.addr())
    }
}

impl From<u64> for Token {
    fn from(value: u64) -> Self {
        Token(value)
    }
}
