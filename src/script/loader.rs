//! Test script loading and validation
//!
//! Every cell is classified here, once. A script that loads is guaranteed to
//! reference only mapped points and to have a tolerance for every expected
//! output.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::config::{PointEntry, ScriptFile, SimulationFile, StepFile, WaitTime};
use crate::common::{paths, parse_clock_time, Error, Result};
use crate::device::SimulatedDevice;
use crate::engine::directive::{CellDirective, Expectation, WakeClause};
use crate::engine::step::{AcceptableBounds, Condition, Step};
use crate::points::{PointProperty, PointTable, PointValue};

/// A validated, ready to run test script
#[derive(Debug, Clone)]
pub struct TestScript {
    pub name: String,
    pub description: Option<String>,
    pub points: Arc<PointTable>,
    pub steps: Vec<Step>,
    /// Tolerance per output device point
    pub bounds: AcceptableBounds,
    /// Initial simulated values per device point
    pub initial: BTreeMap<String, PointValue>,
    /// Simulated links, input device point to output device point
    pub links: Vec<(String, String)>,
}

impl TestScript {
    /// Device points captured after every step
    pub fn output_points(&self) -> impl Iterator<Item = &str> {
        self.bounds.keys().map(String::as_str)
    }

    pub fn step(&self, index: usize) -> Result<&Step> {
        index
            .checked_sub(1)
            .and_then(|i| self.steps.get(i))
            .ok_or(Error::StepNotFound {
                step: index,
                last: self.steps.len(),
            })
    }

    /// In-memory device seeded from the script's simulation section
    pub fn simulated_device(&self) -> SimulatedDevice {
        let mut device = SimulatedDevice::new();
        for point in self.points.iter() {
            let value = self
                .initial
                .get(&point.device_name)
                .cloned()
                .unwrap_or(PointValue::Number(0.0));
            device = device.with_point(&point.device_name, value);
        }
        for (input, output) in &self.links {
            device = device.with_link(input, output);
        }
        device
    }
}

/// Load a test script, resolving its point map relative to the script
pub fn load_script(path: &Path) -> Result<TestScript> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;

    let file: ScriptFile = serde_yaml::from_str(&content).map_err(|e| {
        Error::Script(format!(
            "Failed to parse test script '{}': {}",
            path.display(),
            e
        ))
    })?;

    let mut entries = BTreeMap::new();
    if let Some(map) = &file.point_map {
        let map_path = paths::resolve_relative(path, map);
        let json = std::fs::read_to_string(&map_path).map_err(|e| Error::FileRead {
            path: map_path.display().to_string(),
            error: e.to_string(),
        })?;
        entries = parse_point_map(&json)?;
    }

    build(file, entries)
}

/// Parse a script from strings, for callers that do not read files
pub fn parse_script(yaml: &str, point_map_json: Option<&str>) -> Result<TestScript> {
    let file: ScriptFile = serde_yaml::from_str(yaml)
        .map_err(|e| Error::Script(format!("Failed to parse test script: {}", e)))?;
    let entries = point_map_json
        .map(parse_point_map)
        .transpose()?
        .unwrap_or_default();
    build(file, entries)
}

fn parse_point_map(json: &str) -> Result<BTreeMap<String, PointEntry>> {
    serde_json::from_str(json).map_err(|e| Error::Script(format!("Invalid point map: {}", e)))
}

fn build(file: ScriptFile, mut entries: BTreeMap<String, PointEntry>) -> Result<TestScript> {
    entries.extend(file.points);
    let points = point_table(entries)?;

    if file.steps.is_empty() {
        return Err(Error::Script(format!("'{}' has no steps", file.name)));
    }

    let mut bounds = AcceptableBounds::new();
    for (alias, tolerance) in &file.outputs {
        if !tolerance.is_finite() || *tolerance < 0.0 {
            return Err(Error::Script(format!(
                "tolerance of '{}' must be a non-negative number",
                alias
            )));
        }
        bounds.insert(device_name(&points, alias, "outputs")?, *tolerance);
    }

    let steps = file
        .steps
        .into_iter()
        .enumerate()
        .map(|(i, step)| build_step(i + 1, step, &points, &bounds))
        .collect::<Result<Vec<_>>>()?;

    let (initial, links) = build_simulation(file.simulation, &points)?;

    Ok(TestScript {
        name: file.name,
        description: file.description,
        points: Arc::new(points),
        steps,
        bounds,
        initial,
        links,
    })
}

fn point_table(entries: BTreeMap<String, PointEntry>) -> Result<PointTable> {
    let mut seen = BTreeMap::new();
    let mut points = Vec::with_capacity(entries.len());

    for (alias, entry) in entries {
        let point = match entry {
            PointEntry::Name(device_name) => PointProperty {
                device_name,
                alias,
                units: Default::default(),
                object_type: None,
                address: None,
            },
            PointEntry::Detailed {
                device,
                units,
                object_type,
                address,
            } => PointProperty {
                device_name: device,
                alias,
                units,
                object_type,
                address,
            },
        };

        if let Some(other) = seen.insert(point.device_name.clone(), point.alias.clone()) {
            return Err(Error::Script(format!(
                "device point '{}' is mapped by both '{}' and '{}'",
                point.device_name, other, point.alias
            )));
        }
        points.push(point);
    }

    Ok(PointTable::new(points))
}

fn device_name(points: &PointTable, alias: &str, context: &str) -> Result<String> {
    points
        .by_alias(alias)
        .map(|p| p.device_name.clone())
        .ok_or_else(|| Error::Script(format!("{}: '{}' is not in the point map", context, alias)))
}

fn build_step(
    index: usize,
    step: StepFile,
    points: &PointTable,
    bounds: &AcceptableBounds,
) -> Result<Step> {
    let context = format!("step {}", index);

    let mut inputs = BTreeMap::new();
    for (alias, cell) in &step.inputs {
        let device = device_name(points, alias, &context)?;
        let directive = CellDirective::classify(cell).map_err(|e| e.in_step(index, alias))?;
        inputs.insert(device, directive);
    }

    let wait_secs = match &step.wait {
        WaitTime::Seconds(secs) => Some(*secs),
        WaitTime::Clock(text) => parse_clock_time(text),
    }
    .ok_or_else(|| {
        Error::Script(format!(
            "{}: wait must be seconds or HH:MM:SS, got {:?}",
            context, step.wait
        ))
    })?;

    let wake = step
        .wake
        .as_ref()
        .map(|wake| {
            let device = device_name(points, &wake.variable, &context)?;
            WakeClause::parse(&device, &wake.value).map_err(|e| e.in_step(index, &wake.variable))
        })
        .transpose()?;

    let mut expected = BTreeMap::new();
    for (alias, cell) in &step.expect {
        let device = device_name(points, alias, &context)?;
        if !bounds.contains_key(&device) {
            return Err(Error::Script(format!(
                "{}: expected output '{}' has no tolerance under 'outputs'",
                context, alias
            )));
        }
        let expectation = Expectation::classify(cell).map_err(|e| e.in_step(index, alias))?;
        expected.insert(device, expectation);
    }

    Ok(Step {
        index,
        name: step.name,
        inputs,
        condition: Condition { wait_secs, wake },
        expected,
    })
}

#[allow(clippy::type_complexity)]
fn build_simulation(
    simulation: SimulationFile,
    points: &PointTable,
) -> Result<(BTreeMap<String, PointValue>, Vec<(String, String)>)> {
    let mut initial = BTreeMap::new();
    for (alias, cell) in &simulation.initial {
        let device = device_name(points, alias, "simulation")?;
        let value = match CellDirective::classify(cell)? {
            CellDirective::Literal(value) => value,
            CellDirective::Binary(on) => PointValue::binary(on),
            _ => {
                return Err(Error::Script(format!(
                    "simulation: initial value of '{}' must be a constant",
                    alias
                )))
            }
        };
        initial.insert(device, value);
    }

    let links = simulation
        .links
        .iter()
        .map(|(input, output)| {
            Ok((
                device_name(points, input, "simulation")?,
                device_name(points, output, "simulation")?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((initial, links))
}
