//! Point snapshots taken while a step waits
//!
//! The engine hands snapshots to a [`SnapshotSink`] and never depends on
//! where they end up.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::common::{Error, Result};
use crate::points::PointValue;

/// All point values at one instant, keyed by alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Wall clock, milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Seconds since the run started
    pub elapsed_secs: f64,
    pub step: usize,
    pub values: BTreeMap<String, PointValue>,
}

impl Snapshot {
    pub fn now(step: usize, elapsed_secs: f64, values: BTreeMap<String, PointValue>) -> Self {
        let timestamp_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            timestamp_ms,
            elapsed_secs,
            step,
            values,
        }
    }
}

/// Consumer of snapshots
pub trait SnapshotSink: Send {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes snapshots to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl SnapshotSink for LogSink {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()> {
        let values = serde_json::to_string(&snapshot.values)?;
        tracing::info!(
            step = snapshot.step,
            elapsed_secs = snapshot.elapsed_secs,
            %values,
            "Point snapshot"
        );
        Ok(())
    }
}

/// Appends one JSON object per snapshot to a file
pub struct JsonLinesSink {
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl SnapshotSink for JsonLinesSink {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()> {
        serde_json::to_writer(&mut self.writer, snapshot)?;
        self.writer.write_all(b"\n")?;
        // A run may be killed at any point; keep the file complete
        self.writer.flush().map_err(Error::Io)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(Error::Io)
    }
}

/// Sends every snapshot to several sinks
#[derive(Default)]
pub struct FanOutSink {
    sinks: Vec<Box<dyn SnapshotSink>>,
}

impl FanOutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl SnapshotSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl SnapshotSink for FanOutSink {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()> {
        for sink in &mut self.sinks {
            sink.record(snapshot)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

/// Keeps snapshots in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    snapshots: Arc<Mutex<Vec<Snapshot>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SnapshotSink for MemorySink {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(step: usize) -> Snapshot {
        Snapshot::now(
            step,
            61.0,
            BTreeMap::from([
                ("SupplyTemp".to_string(), PointValue::Number(55.2)),
                ("Fan".to_string(), PointValue::active()),
            ]),
        )
    }

    #[test]
    fn test_json_lines_appends_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("ahu.jsonl");

        let mut sink = JsonLinesSink::create(&path).unwrap();
        sink.record(&sample(1)).unwrap();
        sink.record(&sample(2)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: Snapshot = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.step, 2);
        assert_eq!(parsed.values["Fan"], PointValue::active());
    }

    #[test]
    fn test_fan_out_reaches_every_sink() {
        let first = MemorySink::new();
        let second = MemorySink::new();
        let mut sink = FanOutSink::new()
            .with(first.clone())
            .with(second.clone())
            .with(LogSink);

        sink.record(&sample(3)).unwrap();
        assert_eq!(first.snapshots().len(), 1);
        assert_eq!(second.snapshots()[0].step, 3);
    }
}
