//! Error Module - Sable GC Error Types
//!
//! Defines all error types used by the allocator and collector.
//!
//! # Error Categories
//!
//! ## Memory Errors
//! - `OutOfMemory` - an arena could not obtain another chunk
//! - `StaleHandle` - a handle whose cell has been reclaimed
//!
//! ## Object Errors
//! - `WrongKind` - a pair operation on an external or vice versa
//! - `NotCallable` - `apply` on a class without an apply hook
//!
//! ## Configuration Errors
//! - `Configuration` - invalid configuration
//! - `InvalidArgument` - invalid function argument
//! - `Io` - allocation trace file could not be opened or written
//!
//! Invariant violations are not represented here. They mean the object graph
//! is already corrupt, so they go through [`fatal!`](crate::fatal) instead.

use crate::object::Handle;
use thiserror::Error;

/// Main error type for all Sable GC operations
///
/// # Examples
///
/// ```rust
/// use sable_gc::SgcError;
///
/// fn handle_error(err: SgcError) {
///     match err {
///         SgcError::OutOfMemory { arena, cells } => {
///             eprintln!("OOM in {}: could not grow by {} cells", arena, cells);
///         }
///         _ => {
///             eprintln!("Other error: {}", err);
///         }
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum SgcError {
    /// Out of memory - arena growth failed
    ///
    /// **When returned:** The system allocator refused a chunk, or the arena
    /// already holds `max_chunks` chunks.
    ///
    /// **Recovery strategy:** Abort the current operation, run `collect`, retry.
    /// The arena is left exactly as it was before the failed growth.
    #[error("Out of memory: arena '{arena}' could not grow by {cells} cells")]
    OutOfMemory { arena: &'static str, cells: usize },

    /// Handle refers to a reclaimed cell
    ///
    /// **When returned:** The cell generation no longer matches the handle.
    ///
    /// **Recovery strategy:** Drop the handle. `freed_at` names the call site
    /// that released the cell when poison-on-free is enabled.
    #[error("Stale handle {handle}{}", freed_suffix(.freed_at))]
    StaleHandle {
        handle: Handle,
        freed_at: Option<String>,
    },

    /// Operation applied to the wrong kind of object
    #[error("Handle {handle} is {actual}, expected {expected}")]
    WrongKind {
        handle: Handle,
        expected: &'static str,
        actual: String,
    },

    /// Class has no apply hook
    #[error("Objects of class '{class}' cannot be applied")]
    NotCallable { class: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid argument
    ///
    /// **Example scenarios:**
    /// - Growth quantum of zero
    /// - Binding pop on a symbol with only its base binding
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation trace I/O failure
    #[error("Allocation trace I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SgcError {
    /// Check if this error is recoverable
    ///
    /// Recoverable errors abort the current operation but leave the runtime
    /// usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SgcError::OutOfMemory { .. }
                | SgcError::StaleHandle { .. }
                | SgcError::WrongKind { .. }
                | SgcError::NotCallable { .. }
                | SgcError::InvalidArgument(_)
        )
    }

    /// Check if this error indicates a bug in the caller
    pub fn is_bug(&self) -> bool {
        matches!(self, SgcError::StaleHandle { .. } | SgcError::WrongKind { .. })
    }
}

impl From<crate::config::ConfigError> for SgcError {
    fn from(err: crate::config::ConfigError) -> Self {
        SgcError::Configuration(err.to_string())
    }
}

fn freed_suffix(freed_at: &Option<String>) -> String {
    match freed_at {
        Some(site) => format!(" (freed at {})", site),
        None => String::new(),
    }
}

/// Result type alias for Sable GC operations
pub type Result<T> = std::result::Result<T, SgcError>;

/// Abort on an invariant violation
///
/// The heap cannot be trusted after one of these, so this logs and panics
/// rather than returning an error.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::__log::error!("invariant violated: {}", msg);
        panic!("[sable-gc] invariant violated: {}", msg);
    }};
}

/// Assert an invariant, aborting through [`fatal!`] when it does not hold
#[macro_export]
macro_rules! assert_context {
    ($cond:expr, $context:expr) => {
        if !$cond {
            $crate::fatal!("{} ({})", $context, stringify!($cond));
        }
    };
    ($cond:expr, $context:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::fatal!("{} ({})", format!($context, $($arg)*), stringify!($cond));
        }
    };
}
