//! Mutable state of one test run

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::generator::DynamicValueDriver;
use super::step::StepOutputHistory;
use crate::common::config::RunConfig;
use crate::common::{Error, Result};
use crate::device::Device;
use crate::points::{PointTable, PointValue};
use crate::snapshot::{Snapshot, SnapshotSink};

/// Knobs of the execution engine
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Sleep between two polls of the wait loop
    pub poll_interval: Duration,
    pub snapshot_interval_secs: u64,
    /// Abort instead of logging when the device rejects a write
    pub fatal_write_errors: bool,
    pub default_period_secs: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for RunOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            snapshot_interval_secs: config.snapshot_interval_secs,
            fatal_write_errors: config.fatal_write_errors,
            default_period_secs: config.default_period_secs,
        }
    }
}

/// Everything the engine components share during a run
///
/// Passed explicitly to every component call. The generator registry is
/// replaced wholesale when a step starts.
pub struct RunContext {
    pub points: Arc<PointTable>,
    pub device: Box<dyn Device>,
    pub sink: Box<dyn SnapshotSink>,
    pub options: RunOptions,
    /// Index of the step being executed, 0 before the first one
    pub current_step: usize,
    pub driver: DynamicValueDriver,
    pub history: StepOutputHistory,
    pub started: Instant,
}

impl RunContext {
    pub fn new(
        points: Arc<PointTable>,
        device: Box<dyn Device>,
        sink: Box<dyn SnapshotSink>,
        options: RunOptions,
    ) -> Self {
        Self {
            points,
            device,
            sink,
            options,
            current_step: 0,
            driver: DynamicValueDriver::default(),
            history: StepOutputHistory::default(),
            started: Instant::now(),
        }
    }

    /// Time since the run started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Read a point and convert it to script units (percent points scaled)
    pub async fn read_scaled(&mut self, device_name: &str) -> Result<f64> {
        let value = self.device.read(device_name).await?;
        let number = value.as_number().ok_or_else(|| {
            Error::device_read(device_name, format!("non-numeric value '{}'", value))
        })?;
        Ok(self.points.units(device_name).scale(number))
    }

    /// Write a value, applying the configured write-failure policy
    pub async fn write(&mut self, device_name: &str, value: &PointValue) -> Result<()> {
        match self.device.write(device_name, value).await {
            Ok(()) => Ok(()),
            Err(e) if self.options.fatal_write_errors || !e.is_device_io() => Err(e),
            Err(e) => {
                tracing::warn!(
                    step = self.current_step,
                    point = device_name,
                    error = %e,
                    "Write rejected, continuing"
                );
                Ok(())
            }
        }
    }

    /// Read every mapped point, keyed by alias
    ///
    /// Points that fail to read are left out and logged.
    pub async fn read_all(&mut self) -> BTreeMap<String, PointValue> {
        let points = Arc::clone(&self.points);
        let mut values = BTreeMap::new();
        for point in points.iter() {
            match self.device.read(&point.device_name).await {
                Ok(value) => {
                    values.insert(point.alias.clone(), value);
                }
                Err(e) => {
                    tracing::warn!(point = %point.device_name, error = %e, "Snapshot read failed");
                }
            }
        }
        values
    }

    /// Snapshot all points and hand them to the sink
    pub async fn snapshot(&mut self) {
        let values = self.read_all().await;
        let snapshot = Snapshot::now(self.current_step, self.elapsed().as_secs_f64(), values);
        if let Err(e) = self.sink.record(&snapshot) {
            tracing::warn!(error = %e, "Failed to record snapshot");
        }
    }
}
