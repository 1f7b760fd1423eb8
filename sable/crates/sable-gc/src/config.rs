//! Configuration Module - Heap Tuning Parameters
//!
//! Manages all configuration parameters for the slab heap and collector.
//! Most parameters have sensible defaults; `from_env` lets a host override
//! them without recompiling.

use std::path::PathBuf;

/// Main configuration for the Sable heap
///
/// # Examples
///
/// ```rust
/// use sable_gc::HeapConfig;
///
/// // Use default configuration
/// let config = HeapConfig::default();
///
/// // Small chunks and poisoning for debugging the collector
/// let config = HeapConfig {
///     handle_chunk_cells: 16,
///     poison_on_free: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, serde::Serialize)]
pub struct HeapConfig {
    /// Growth quantum of the handle arena (cells per chunk)
    ///
    /// Handle allocation is the hot path, so chunks are large.
    /// Default: 4096
    pub handle_chunk_cells: usize,

    /// Growth quantum of the finalizer and notifier record arenas
    ///
    /// Default: 256
    pub record_chunk_cells: usize,

    /// Upper bound on chunks per arena
    ///
    /// Growth beyond this raises OutOfMemory exactly as a refused system
    /// allocation would. `None` means only the system allocator limits growth.
    ///
    /// Default: None
    pub max_chunks: Option<usize>,

    /// Poison freed cells
    ///
    /// A poisoned cell remembers the call site that freed it so a stale
    /// handle reports where its object went.
    ///
    /// Default: true in debug builds
    pub poison_on_free: bool,

    /// Block SIGINT/SIGQUIT while `collect` runs
    ///
    /// Default: true
    pub mask_interrupts: bool,

    /// Echo GC events to the console
    ///
    /// Default: false
    pub verbose: bool,

    /// Append every raw allocate/free to this file as JSON lines
    ///
    /// Default: None
    pub allocation_trace: Option<PathBuf>,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            handle_chunk_cells: DEFAULT_HANDLE_CHUNK_CELLS,
            record_chunk_cells: DEFAULT_RECORD_CHUNK_CELLS,
            max_chunks: None,
            poison_on_free: cfg!(debug_assertions),
            mask_interrupts: true,
            verbose: false,
            allocation_trace: None,
        }
    }
}

impl HeapConfig {
    /// Validate configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sable_gc::HeapConfig;
    ///
    /// let config = HeapConfig {
    ///     handle_chunk_cells: 0,  // Invalid!
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handle_chunk_cells == 0 || self.record_chunk_cells == 0 {
            return Err(ConfigError::InvalidChunkSize(
                "chunk cell counts must be > 0".to_string(),
            ));
        }

        if self.handle_chunk_cells > MAX_CHUNK_CELLS || self.record_chunk_cells > MAX_CHUNK_CELLS {
            return Err(ConfigError::InvalidChunkSize(format!(
                "chunk cell counts must be <= {}",
                MAX_CHUNK_CELLS
            )));
        }

        if self.max_chunks == Some(0) {
            return Err(ConfigError::InvalidChunkLimit(
                "max_chunks must be > 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - SGC_HANDLE_CHUNK_CELLS
    /// - SGC_RECORD_CHUNK_CELLS
    /// - SGC_MAX_CHUNKS
    /// - SGC_POISON
    /// - SGC_VERBOSE
    /// - SGC_ALLOC_TRACE
    ///
    /// ```bash
    /// export SGC_HANDLE_CHUNK_CELLS=1024
    /// export SGC_ALLOC_TRACE=/tmp/sable-alloc.jsonl
    /// ```
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SGC_HANDLE_CHUNK_CELLS") {
            if let Ok(cells) = val.parse::<usize>() {
                config.handle_chunk_cells = cells;
            }
        }

        if let Ok(val) = std::env::var("SGC_RECORD_CHUNK_CELLS") {
            if let Ok(cells) = val.parse::<usize>() {
                config.record_chunk_cells = cells;
            }
        }

        if let Ok(val) = std::env::var("SGC_MAX_CHUNKS") {
            if let Ok(chunks) = val.parse::<usize>() {
                config.max_chunks = Some(chunks);
            }
        }

        if let Ok(val) = std::env::var("SGC_POISON") {
            config.poison_on_free = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("SGC_VERBOSE") {
            config.verbose = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("SGC_ALLOC_TRACE") {
            if !val.is_empty() {
                config.allocation_trace = Some(PathBuf::from(val));
            }
        }

        config
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Invalid chunk limit: {0}")]
    InvalidChunkLimit(String),
}

// ============================================================================
// CONSTANTS & HELPERS
// ============================================================================

const DEFAULT_HANDLE_CHUNK_CELLS: usize = 4096;
const DEFAULT_RECORD_CHUNK_CELLS: usize = 256;

/// Cell indices are `u32`; keep one chunk well inside that range.
const MAX_CHUNK_CELLS: usize = 1 << 20;

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HeapConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.mask_interrupts);
        assert_eq!(config.handle_chunk_cells, 4096);
    }

    #[test]
    fn test_invalid_chunk_size() {
        let config = HeapConfig {
            record_chunk_cells: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HeapConfig {
            handle_chunk_cells: MAX_CHUNK_CELLS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_chunk_limit() {
        let config = HeapConfig {
            max_chunks: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidChunkLimit(_))
        ));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("yes"));
    }
}
