//! In-memory controller used for dry runs and tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::Device;
use crate::common::{Error, Result};
use crate::points::PointValue;

#[derive(Debug, Default)]
struct SimState {
    values: HashMap<String, PointValue>,
    /// Writing the key also sets every listed point (a trivial control loop)
    links: HashMap<String, Vec<String>>,
    read_only: HashSet<String>,
    writes: Vec<(String, PointValue)>,
}

/// Simulated controller
///
/// Cloning yields another handle to the same points, so a test can keep a
/// handle while the engine owns the device.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a point with an initial value (builder style)
    pub fn with_point(self, point: &str, value: impl Into<PointValue>) -> Self {
        self.set(point, value);
        self
    }

    /// Mirror every write to `input` onto `output`
    pub fn with_link(self, input: &str, output: &str) -> Self {
        self.state()
            .links
            .entry(input.to_string())
            .or_default()
            .push(output.to_string());
        self
    }

    /// Reject writes to `point`
    pub fn with_read_only(self, point: &str) -> Self {
        self.state().read_only.insert(point.to_string());
        self
    }

    /// Set a point value directly, bypassing write bookkeeping
    pub fn set(&self, point: &str, value: impl Into<PointValue>) {
        self.state().values.insert(point.to_string(), value.into());
    }

    /// Current value of a point
    pub fn get(&self, point: &str) -> Option<PointValue> {
        self.state().values.get(point).cloned()
    }

    /// Accepted writes to a single point, in order
    pub fn writes_to(&self, point: &str) -> Vec<PointValue> {
        self.state()
            .writes
            .iter()
            .filter(|(p, _)| p == point)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[async_trait]
impl Device for SimulatedDevice {
    async fn read(&mut self, point: &str) -> Result<PointValue> {
        self.state()
            .values
            .get(point)
            .cloned()
            .ok_or_else(|| Error::device_read(point, "unknown point"))
    }

    async fn write(&mut self, point: &str, value: &PointValue) -> Result<()> {
        let mut state = self.state();
        if state.read_only.contains(point) {
            return Err(Error::device_write(point, "write access denied"));
        }

        state.values.insert(point.to_string(), value.clone());
        state.writes.push((point.to_string(), value.clone()));

        let linked = state.links.get(point).cloned().unwrap_or_default();
        for output in linked {
            state.values.insert(output, value.clone());
        }
        Ok(())
    }
}
