//! Stats Module - GC Performance Monitoring
//!
//! Cumulative counters for one heap, for:
//! - Pause tuning
//! - Leak hunting (handles disposed vs reclaimed)
//! - Finalizer and notifier accounting
//!
//! Per-cycle numbers are in [`CycleReport`](crate::gc::CycleReport); this
//! module folds them into running totals.

pub mod timer;

pub use timer::GcTimer;

use crate::gc::{CollectMode, CycleReport};
use std::time::{Duration, Instant};

/// GcStats - running totals across collections
#[derive(Debug)]
pub struct GcStats {
    purge_cycles: u64,
    teardown_cycles: u64,
    handles_disposed: u64,
    handles_reclaimed: u64,
    names_purged: u64,
    finalizers_run: u64,
    notifiers_run: u64,
    last_pause: Duration,
    max_pause: Duration,
    total_pause: Duration,
    start_time: Instant,
}

impl GcStats {
    pub fn new() -> Self {
        Self {
            purge_cycles: 0,
            teardown_cycles: 0,
            handles_disposed: 0,
            handles_reclaimed: 0,
            names_purged: 0,
            finalizers_run: 0,
            notifiers_run: 0,
            last_pause: Duration::ZERO,
            max_pause: Duration::ZERO,
            total_pause: Duration::ZERO,
            start_time: Instant::now(),
        }
    }

    /// Fold a finished cycle into the totals
    pub fn record_cycle(&mut self, report: &CycleReport) {
        match report.mode {
            CollectMode::Purge => self.purge_cycles += 1,
            CollectMode::Teardown => self.teardown_cycles += 1,
        }

        self.handles_disposed += report.disposed as u64;
        self.handles_reclaimed += report.reclaimed as u64;
        self.names_purged += report.names_purged as u64;

        self.last_pause = report.duration;
        self.max_pause = self.max_pause.max(report.duration);
        self.total_pause += report.duration;
    }

    pub fn record_finalizers(&mut self, count: usize) {
        self.finalizers_run += count as u64;
    }

    pub fn record_notifiers(&mut self, count: usize) {
        self.notifiers_run += count as u64;
    }

    pub fn total_cycles(&self) -> u64 {
        self.purge_cycles + self.teardown_cycles
    }

    pub fn finalizers_run(&self) -> u64 {
        self.finalizers_run
    }

    pub fn notifiers_run(&self) -> u64 {
        self.notifiers_run
    }

    pub fn summary(&self) -> GcSummary {
        let cycles = self.total_cycles();
        let avg_pause_ms = if cycles == 0 {
            0.0
        } else {
            self.total_pause.as_secs_f64() * 1000.0 / cycles as f64
        };

        GcSummary {
            total_cycles: cycles,
            purge_cycles: self.purge_cycles,
            teardown_cycles: self.teardown_cycles,
            handles_disposed: self.handles_disposed,
            handles_reclaimed: self.handles_reclaimed,
            names_purged: self.names_purged,
            finalizers_run: self.finalizers_run,
            notifiers_run: self.notifiers_run,
            last_pause_ms: self.last_pause.as_secs_f64() * 1000.0,
            max_pause_ms: self.max_pause.as_secs_f64() * 1000.0,
            avg_pause_ms,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self {
            start_time: self.start_time,
            ..Self::new()
        };
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary statistics
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct GcSummary {
    pub total_cycles: u64,
    pub purge_cycles: u64,
    pub teardown_cycles: u64,
    pub handles_disposed: u64,
    pub handles_reclaimed: u64,
    pub names_purged: u64,
    pub finalizers_run: u64,
    pub notifiers_run: u64,
    /// Pause of the most recent cycle (ms)
    pub last_pause_ms: f64,
    pub max_pause_ms: f64,
    pub avg_pause_ms: f64,
    pub uptime_secs: u64,
}
