//! Ramp and periodic value generators
//!
//! Generators belong to a single step. They are installed after the step's
//! immediate values have been written and dropped when the next step starts.

use super::expression::{evaluate_live, Expression};
use crate::common::{round2, Result};
use crate::device::Device;
use crate::points::{PointTable, PointValue};

/// Linear move from `start` to `end`
#[derive(Debug, Clone, PartialEq)]
pub struct RampSpec {
    pub start: f64,
    pub end: f64,
    pub rate_per_sec: f64,
    pub period_secs: u64,
}

impl RampSpec {
    /// Nothing to move when start and end coincide
    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }

    /// Target value `seconds` after the step started
    ///
    /// Progress is quantized to whole periods and never overshoots `end`.
    pub fn value_at(&self, seconds: u64) -> f64 {
        if self.is_degenerate() {
            return self.start;
        }

        let period = self.period_secs.max(1);
        let elapsed = (seconds / period * period) as f64;
        let delta = self.rate_per_sec.abs() * elapsed;

        if self.end > self.start {
            (self.start + delta).min(self.end)
        } else {
            (self.start - delta).max(self.end)
        }
    }
}

/// Expression re-evaluated on a fixed cadence
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicSpec {
    pub expression: Expression,
    pub period_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Generator {
    Ramp(RampSpec),
    Periodic(PeriodicSpec),
}

impl Generator {
    pub fn period_secs(&self) -> u64 {
        match self {
            Self::Ramp(ramp) => ramp.period_secs,
            Self::Periodic(periodic) => periodic.period_secs,
        }
        .max(1)
    }
}

/// A generator bound to the point it drives
#[derive(Debug, Clone)]
struct ActiveGenerator {
    point: String,
    generator: Generator,
    /// Last period boundary (in seconds since step start) already handled
    last_boundary: u64,
}

/// Advances every generator of the current step
#[derive(Debug, Default)]
pub struct DynamicValueDriver {
    active: Vec<ActiveGenerator>,
    /// Step the generators belong to
    step: usize,
}

impl DynamicValueDriver {
    /// Drop every generator of the previous step
    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Install the generators of a new step, replacing all previous ones
    pub fn replace(&mut self, step: usize, generators: Vec<(String, Generator)>) {
        self.step = step;
        self.active = generators
            .into_iter()
            .map(|(point, generator)| ActiveGenerator {
                point,
                generator,
                // Second 0 is covered by the immediate write
                last_boundary: 0,
            })
            .collect();
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Points driven by a generator in this step
    pub fn points(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(|g| g.point.as_str())
    }

    /// Handle second `seconds` of the wait phase
    ///
    /// Each generator fires on every multiple of its period, once per
    /// boundary even when polls are sparser than a second. Device I/O
    /// failures are logged; expression errors abort, and so do rejected
    /// writes when `fatal_write_errors` is set.
    pub async fn tick(
        &mut self,
        seconds: u64,
        points: &PointTable,
        device: &mut dyn Device,
        fatal_write_errors: bool,
    ) -> Result<()> {
        for i in 0..self.active.len() {
            let period = self.active[i].generator.period_secs();
            let boundary = seconds / period * period;
            if boundary == 0 || boundary <= self.active[i].last_boundary {
                continue;
            }
            self.active[i].last_boundary = boundary;

            let point = self.active[i].point.clone();
            let target = match &self.active[i].generator {
                Generator::Ramp(ramp) => ramp.value_at(boundary),
                Generator::Periodic(periodic) => {
                    match evaluate_live(&periodic.expression, points, device).await {
                        Ok(value) => value,
                        Err(e) if e.is_device_io() => {
                            tracing::warn!(point = %point, error = %e, "Periodic evaluation skipped");
                            continue;
                        }
                        Err(e) => return Err(e.in_step(self.step, &point)),
                    }
                }
            };

            self.write_if_changed(&point, target, device, fatal_write_errors)
                .await?;
        }
        Ok(())
    }

    async fn write_if_changed(
        &self,
        point: &str,
        target: f64,
        device: &mut dyn Device,
        fatal_write_errors: bool,
    ) -> Result<()> {
        match device.read(point).await {
            Ok(current) => {
                if current.as_number().map(round2) == Some(round2(target)) {
                    return Ok(());
                }
            }
            Err(e) => {
                tracing::debug!(point, error = %e, "Current value unknown, writing anyway");
            }
        }

        tracing::debug!(point, value = target, "Generator write");
        match device.write(point, &PointValue::Number(target)).await {
            Ok(()) => Ok(()),
            Err(e) if fatal_write_errors => Err(e.in_step(self.step, point)),
            Err(e) => {
                tracing::warn!(point, error = %e, "Generator write rejected");
                Ok(())
            }
        }
    }
}
