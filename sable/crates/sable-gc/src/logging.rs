//! GC Logging and Tracing
//!
//! Structured events for collections and arena growth, useful for:
//! - Pause analysis
//! - Debugging finalizer and notifier ordering
//! - Tests that assert on what a cycle did
//!
//! Every heap owns a [`GcLogger`]. Events at or above the configured level
//! are kept in a bounded in-memory ring, forwarded to the `log` facade and,
//! when console output is on, printed in human or JSON form.
//!
//! Log Levels:
//! - ERROR: Allocation failures
//! - INFO: Cycle start/end
//! - DEBUG: Phases, chunk growth
//! - TRACE: Finalizer and notifier batches

use crate::gc::CollectMode;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Log level for GC operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// GC event types
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GcEvent {
    /// Collection started
    CycleStart { cycle: u64, mode: CollectMode },

    /// Collection phase completed
    PhaseEnd {
        cycle: u64,
        phase: &'static str,
        duration_ms: f64,
    },

    /// Collection completed
    CycleEnd {
        cycle: u64,
        duration_ms: f64,
        reclaimed: usize,
        live: usize,
    },

    /// An arena obtained a new chunk
    ChunkGrown {
        arena: &'static str,
        chunks: usize,
        capacity: usize,
    },

    /// An arena could not grow
    AllocationFailure { arena: &'static str, cells: usize },

    /// Finalizers drained for one target
    FinalizersRun { target: u64, count: usize },

    /// Notifiers drained for one address
    NotifiersRun { target: u64, count: usize },
}

impl GcEvent {
    /// Level the event is logged at
    pub fn level(&self) -> LogLevel {
        match self {
            GcEvent::AllocationFailure { .. } => LogLevel::Error,
            GcEvent::CycleStart { .. } | GcEvent::CycleEnd { .. } => LogLevel::Info,
            GcEvent::PhaseEnd { .. } | GcEvent::ChunkGrown { .. } => LogLevel::Debug,
            GcEvent::FinalizersRun { .. } | GcEvent::NotifiersRun { .. } => LogLevel::Trace,
        }
    }

    /// One-line human-readable form
    pub fn describe(&self) -> String {
        match self {
            GcEvent::CycleStart { cycle, mode } => {
                format!("[GC] Cycle {} started ({:?})", cycle, mode)
            },
            GcEvent::PhaseEnd {
                cycle,
                phase,
                duration_ms,
            } => format!(
                "[GC] Cycle {}: {} phase completed ({:.3}ms)",
                cycle, phase, duration_ms
            ),
            GcEvent::CycleEnd {
                cycle,
                duration_ms,
                reclaimed,
                live,
            } => format!(
                "[GC] Cycle {} completed ({:.3}ms, reclaimed {} handles, {} live)",
                cycle, duration_ms, reclaimed, live
            ),
            GcEvent::ChunkGrown {
                arena,
                chunks,
                capacity,
            } => format!(
                "[GC] Arena '{}' grew to {} chunks ({} cells)",
                arena, chunks, capacity
            ),
            GcEvent::AllocationFailure { arena, cells } => format!(
                "[GC] Allocation failure: arena '{}' could not grow by {} cells",
                arena, cells
            ),
            GcEvent::FinalizersRun { target, count } => {
                format!("[GC] Ran {} finalizers for {:#x}", count, target)
            },
            GcEvent::NotifiersRun { target, count } => {
                format!("[GC] Ran {} notifiers for {:#x}", count, target)
            },
        }
    }
}

/// GC Logger configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GcLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Print events to stdout/stderr
    pub console: bool,

    /// Print JSON instead of text
    pub json: bool,

    /// Prefix console lines with a local timestamp
    pub timestamps: bool,

    /// Events kept in memory; the oldest are dropped first
    pub max_events: usize,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Debug,
            console: false,
            json: false,
            timestamps: true,
            max_events: 4096,
        }
    }
}

/// A recorded event with its wall-clock time
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoggedEvent {
    pub at: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub event: GcEvent,
}

/// GC Logger - per-heap event log
pub struct GcLogger {
    config: GcLoggerConfig,
    events: RefCell<VecDeque<LoggedEvent>>,
    enabled: Cell<bool>,
}

impl GcLogger {
    pub fn new(config: GcLoggerConfig) -> Self {
        Self {
            config,
            events: RefCell::new(VecDeque::new()),
            enabled: Cell::new(true),
        }
    }

    pub fn config(&self) -> &GcLoggerConfig {
        &self.config
    }

    pub fn enable(&self) {
        self.enabled.set(true);
    }

    pub fn disable(&self) {
        self.enabled.set(false);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Log a GC event
    pub fn log(&self, event: GcEvent) {
        if !self.is_enabled() {
            return;
        }

        let level = event.level();
        if level > self.config.level {
            return;
        }

        log::log!(level.into(), "{}", event.describe());

        let logged = LoggedEvent {
            at: chrono::Utc::now(),
            event,
        };

        if self.config.console {
            self.output_console(&logged);
        }

        let mut events = self.events.borrow_mut();
        if self.config.max_events > 0 && events.len() >= self.config.max_events {
            events.pop_front();
        }
        events.push_back(logged);
    }

    fn output_console(&self, logged: &LoggedEvent) {
        let line = if self.config.json {
            match serde_json::to_string(logged) {
                Ok(json) => json,
                Err(e) => {
                    log::warn!("could not encode GC event: {}", e);
                    return;
                },
            }
        } else if self.config.timestamps {
            let local = logged.at.with_timezone(&chrono::Local);
            format!(
                "[{}] {}",
                local.format("%Y-%m-%d %H:%M:%S%.3f"),
                logged.event.describe()
            )
        } else {
            logged.event.describe()
        };

        if logged.event.level() == LogLevel::Error {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    /// Recorded events, oldest first
    pub fn events(&self) -> Vec<GcEvent> {
        self.events
            .borrow()
            .iter()
            .map(|logged| logged.event.clone())
            .collect()
    }

    /// Recorded events with timestamps, as JSON lines
    pub fn to_json_lines(&self) -> String {
        let mut out = String::new();
        for logged in self.events.borrow().iter() {
            if let Ok(json) = serde_json::to_string(logged) {
                out.push_str(&json);
                out.push('\n');
            }
        }
        out
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.borrow().len()
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        Self::new(default_config())
    }
}

lazy_static::lazy_static! {
    /// Configuration new heaps start their logger with
    static ref DEFAULT_CONFIG: Mutex<GcLoggerConfig> = Mutex::new(GcLoggerConfig::default());
}

/// Set the logger configuration used by heaps created from now on
pub fn configure_logger(config: GcLoggerConfig) {
    match DEFAULT_CONFIG.lock() {
        Ok(mut current) => *current = config,
        Err(poisoned) => *poisoned.into_inner() = config,
    }
}

/// Logger configuration new heaps start with
pub fn default_config() -> GcLoggerConfig {
    match DEFAULT_CONFIG.lock() {
        Ok(config) => config.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}
