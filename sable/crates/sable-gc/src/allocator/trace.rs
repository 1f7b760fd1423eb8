//! Allocation Trace - raw allocate/free log
//!
//! When enabled, every arena appends one JSON line per allocate or free:
//!
//! ```text
//! {"ts":"2026-01-02T10:11:12.131Z","op":"alloc","arena":"handles","index":3,"generation":0,"file":"src/main.rs","line":42}
//! ```
//!
//! The sink is shared by all arenas of a heap. It is purely diagnostic: a
//! write failure disables the trace and logs a warning rather than failing the
//! allocation that triggered it.

use crate::allocator::arena::CellId;
use crate::error::Result;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::panic::Location;
use std::path::Path;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOp {
    Alloc,
    Free,
}

#[derive(serde::Serialize)]
struct TraceRecord<'a> {
    ts: String,
    op: TraceOp,
    arena: &'a str,
    index: u32,
    generation: u32,
    file: &'a str,
    line: u32,
}

/// Shared, optional allocation trace file
#[derive(Clone, Default)]
pub struct AllocationTrace {
    sink: Rc<RefCell<Option<BufWriter<File>>>>,
}

impl AllocationTrace {
    /// Start appending to `path`, or stop tracing with `None`
    ///
    /// Any previously open trace is flushed and closed first.
    pub fn set_path(&self, path: Option<&Path>) -> Result<()> {
        let previous = self.sink.borrow_mut().take();
        if let Some(mut writer) = previous {
            writer.flush()?;
        }

        if let Some(path) = path {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            *self.sink.borrow_mut() = Some(BufWriter::new(file));
            log::debug!("allocation trace enabled: {}", path.display());
        }

        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.borrow().is_some()
    }

    pub(crate) fn record(
        &self,
        op: TraceOp,
        arena: &str,
        id: CellId,
        site: &'static Location<'static>,
    ) {
        let mut sink = self.sink.borrow_mut();
        let Some(writer) = sink.as_mut() else {
            return;
        };

        let record = TraceRecord {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            op,
            arena,
            index: id.index(),
            generation: id.generation(),
            file: site.file(),
            line: site.line(),
        };

        let written = serde_json::to_writer(&mut *writer, &record)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"));

        if let Err(e) = written {
            log::warn!("allocation trace disabled after write failure: {}", e);
            *sink = None;
        }
    }

    /// Flush buffered records to disk
    pub fn flush(&self) -> Result<()> {
        if let Some(writer) = self.sink.borrow_mut().as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_default() {
        let trace = AllocationTrace::default();
        assert!(!trace.is_enabled());
        trace.record(TraceOp::Alloc, "handles", CellId::new(0, 0), Location::caller());
    }

    #[test]
    fn test_records_are_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alloc.jsonl");

        let trace = AllocationTrace::default();
        trace.set_path(Some(&path)).unwrap();
        trace.record(TraceOp::Alloc, "handles", CellId::new(3, 1), Location::caller());
        trace.record(TraceOp::Free, "handles", CellId::new(3, 1), Location::caller());
        trace.set_path(None).unwrap();
        assert!(!trace.is_enabled());

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["op"], "alloc");
        assert_eq!(lines[1]["op"], "free");
        assert_eq!(lines[0]["index"], 3);
        assert!(lines[0]["file"].as_str().unwrap().ends_with("trace.rs"));
    }
}
